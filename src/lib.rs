//! # jitterbuf
//!
//! A jitter buffer for real-time media and event streams: a bounded byte
//! ring fronted by a high/low water-mark state machine that smooths
//! producer jitter and emits frames to a downstream sink at a fixed
//! cadence.
//!
//! Producers push frames from any thread; a dedicated consumer thread wakes
//! every `frame_interval` on an absolute-deadline schedule and hands the
//! next frame to the output sink. The buffer trades a small, bounded amount
//! of latency (the pre-roll set by the high water mark) for tolerance of
//! burstiness, stalls, and late arrivals.
//!
//! Frames are either fixed-size byte slices or, with `with_header`,
//! variable-length payloads stored behind a 2-byte big-endian length
//! prefix. In the latter mode overflow discards whole frames from the head
//! so a payload byte is never misread as a length prefix.
//!
//! ```no_run
//! use jitterbuf::{JitterBuffer, JitterBufferConfig};
//!
//! let config = JitterBufferConfig::default();
//! let buffer = JitterBuffer::new(config, |frame: &[u8]| {
//!     // hand the frame to the audio device, socket, ...
//!     let _ = frame;
//! })?;
//!
//! buffer.start()?;
//! buffer.write(&[0u8; 512])?;
//! # Ok::<(), jitterbuf::Error>(())
//! ```

mod buffer;
pub mod config;
pub mod error;
pub mod events;
mod framing;
mod ring;
pub mod sink;
pub mod state;
mod worker;

pub use buffer::{JitterBuffer, JitterBufferStats};
pub use config::{AudioFormat, JitterBufferConfig};
pub use error::{Error, Result};
pub use events::JitterEvent;
pub use sink::OutputSink;
pub use state::JitterState;
