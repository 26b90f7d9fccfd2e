//! Playback state machine
//!
//! Tracks IDLE / BUFFERING / PLAYING / UNDERRUN from the complete-frame
//! count measured against the high and low water marks.
//!
//! The refill check (BUFFERING or UNDERRUN to PLAYING at `high_water`) runs
//! on both the producer and consumer paths, so playback resumes on the very
//! write that fills the buffer instead of one tick later. The drain check
//! (PLAYING to UNDERRUN below `low_water`) runs only on the consumer path:
//! a producer burst that momentarily crosses `low_water` must not fake an
//! underrun. With `low_water <= high_water` the two thresholds form a
//! hysteresis band that prevents flapping.

use crate::events::JitterEvent;

/// Externally observable buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterState {
    /// Before the first start, or after stop
    Idle,

    /// Accumulating pre-roll up to the high water mark
    Buffering,

    /// Steady-state output
    Playing,

    /// Drained below the low water mark; reaccumulating
    Underrun,
}

impl std::fmt::Display for JitterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JitterState::Idle => write!(f, "Idle"),
            JitterState::Buffering => write!(f, "Buffering"),
            JitterState::Playing => write!(f, "Playing"),
            JitterState::Underrun => write!(f, "Underrun"),
        }
    }
}

/// State plus the thresholds that drive its transitions.
///
/// Transition methods return the event to post for a real state change and
/// `None` for a no-op, so callers under the mutex can defer posting until
/// the lock is released.
#[derive(Debug)]
pub(crate) struct WatermarkMachine {
    state: JitterState,
    high_water: usize,
    low_water: usize,
}

impl WatermarkMachine {
    pub fn new(high_water: usize, low_water: usize) -> Self {
        Self {
            state: JitterState::Idle,
            high_water,
            low_water,
        }
    }

    pub fn state(&self) -> JitterState {
        self.state
    }

    /// Host start request. Idempotent: a repeated start changes nothing.
    pub fn on_start(&mut self) -> Option<JitterEvent> {
        if self.state == JitterState::Idle {
            self.state = JitterState::Buffering;
            Some(JitterEvent::Buffering)
        } else {
            None
        }
    }

    /// Host stop request. Stop is silent; only start/refill/drain emit.
    pub fn on_stop(&mut self) {
        self.state = JitterState::Idle;
    }

    /// Ring was cleared; begin accumulating pre-roll again.
    pub fn on_reset(&mut self) -> Option<JitterEvent> {
        if self.state == JitterState::Buffering {
            None
        } else {
            self.state = JitterState::Buffering;
            Some(JitterEvent::Buffering)
        }
    }

    /// High-water check, run after a write and before each consumer read.
    pub fn refill_check(&mut self, frames: usize) -> Option<JitterEvent> {
        match self.state {
            JitterState::Buffering | JitterState::Underrun if frames >= self.high_water => {
                self.state = JitterState::Playing;
                Some(JitterEvent::Playing)
            }
            _ => None,
        }
    }

    /// Low-water check, run only on the consumer path before a read.
    pub fn drain_check(&mut self, frames: usize) -> Option<JitterEvent> {
        match self.state {
            JitterState::Playing if frames < self.low_water => {
                self.state = JitterState::Underrun;
                Some(JitterEvent::Underrun)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle_and_buffers_on_start() {
        let mut machine = WatermarkMachine::new(4, 2);
        assert_eq!(machine.state(), JitterState::Idle);

        assert_eq!(machine.on_start(), Some(JitterEvent::Buffering));
        assert_eq!(machine.state(), JitterState::Buffering);
    }

    #[test]
    fn test_repeated_start_emits_once() {
        let mut machine = WatermarkMachine::new(4, 2);
        assert!(machine.on_start().is_some());
        assert!(machine.on_start().is_none());
        assert_eq!(machine.state(), JitterState::Buffering);
    }

    #[test]
    fn test_refill_needs_high_water() {
        let mut machine = WatermarkMachine::new(4, 2);
        machine.on_start();

        assert!(machine.refill_check(3).is_none());
        assert_eq!(machine.state(), JitterState::Buffering);

        assert_eq!(machine.refill_check(4), Some(JitterEvent::Playing));
        assert_eq!(machine.state(), JitterState::Playing);
    }

    #[test]
    fn test_drain_only_fires_from_playing() {
        let mut machine = WatermarkMachine::new(4, 2);
        machine.on_start();

        // Below low water while still buffering: not an underrun.
        assert!(machine.drain_check(0).is_none());
        assert_eq!(machine.state(), JitterState::Buffering);

        machine.refill_check(4);
        assert!(machine.drain_check(2).is_none()); // at the mark, not below
        assert_eq!(machine.drain_check(1), Some(JitterEvent::Underrun));
        assert_eq!(machine.state(), JitterState::Underrun);
    }

    #[test]
    fn test_underrun_recovers_at_high_water() {
        let mut machine = WatermarkMachine::new(4, 2);
        machine.on_start();
        machine.refill_check(4);
        machine.drain_check(1);

        // Crossing low water alone must not resume playback.
        assert!(machine.refill_check(3).is_none());
        assert_eq!(machine.state(), JitterState::Underrun);

        assert_eq!(machine.refill_check(4), Some(JitterEvent::Playing));
    }

    #[test]
    fn test_hysteresis_requires_both_thresholds() {
        // No PLAYING/UNDERRUN oscillation without the frame count crossing
        // both marks each time.
        let mut machine = WatermarkMachine::new(8, 3);
        machine.on_start();
        machine.refill_check(8);

        let mut transitions = 0;
        for frames in [7, 5, 4, 3, 3, 4, 5, 6, 7, 7, 6, 5, 4, 3] {
            if machine.drain_check(frames).is_some() {
                transitions += 1;
            }
            if machine.refill_check(frames).is_some() {
                transitions += 1;
            }
        }
        // Frame count never fell below 3 or climbed back to 8: no transition.
        assert_eq!(transitions, 0);
        assert_eq!(machine.state(), JitterState::Playing);

        assert!(machine.drain_check(2).is_some());
        assert!(machine.refill_check(7).is_none());
        assert!(machine.refill_check(8).is_some());
    }

    #[test]
    fn test_stop_is_silent_and_resets_to_idle() {
        let mut machine = WatermarkMachine::new(4, 2);
        machine.on_start();
        machine.refill_check(4);

        machine.on_stop();
        assert_eq!(machine.state(), JitterState::Idle);
    }

    #[test]
    fn test_reset_rebuffers_from_any_state() {
        let mut machine = WatermarkMachine::new(4, 2);
        machine.on_start();
        machine.refill_check(4);

        assert_eq!(machine.on_reset(), Some(JitterEvent::Buffering));
        assert_eq!(machine.state(), JitterState::Buffering);

        // Already buffering: the repeat is a no-op transition.
        assert!(machine.on_reset().is_none());
    }
}
