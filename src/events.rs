//! State-transition events
//!
//! Each real state transition of a [`JitterBuffer`](crate::JitterBuffer)
//! posts one event to the optional event sink configured at construction.
//! Repeated no-op transitions post nothing.
//!
//! Delivery is best-effort: the post uses a short bounded timeout and a
//! failed or lagging receiver loses the event with a warning log. Events are
//! always posted after the buffer mutex has been released, so a slow
//! receiver can never stall producers or the consumer tick.

use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::warn;

/// How long a post may block before the event is dropped
const EVENT_POST_TIMEOUT: Duration = Duration::from_millis(100);

/// State transitions observable from outside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterEvent {
    /// Accumulating pre-roll; output is withheld until the high water mark
    Buffering,

    /// Pre-roll reached, steady-state output running
    Playing,

    /// Buffer drained below the low water mark; output withheld while refilling
    Underrun,
}

impl std::fmt::Display for JitterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JitterEvent::Buffering => write!(f, "Buffering"),
            JitterEvent::Playing => write!(f, "Playing"),
            JitterEvent::Underrun => write!(f, "Underrun"),
        }
    }
}

/// Post one event to the sink, best-effort.
///
/// Must be called with the buffer mutex released.
pub(crate) fn post_event(sink: Option<&Sender<JitterEvent>>, event: JitterEvent) {
    let Some(sink) = sink else {
        return;
    };
    if let Err(e) = sink.send_timeout(event, EVENT_POST_TIMEOUT) {
        warn!("Jitter buffer event post failed ({}): {}", event, e);
    }
}
