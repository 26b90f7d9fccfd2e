//! Output sink capability
//!
//! The consumer loop hands each emitted frame to an [`OutputSink`]. The sink
//! is set once at construction and invoked from the worker thread with the
//! buffer mutex released, so a slow sink delays at most its own tick, never
//! a producer.
//!
//! The sink must not call back into the owning `JitterBuffer` from inside
//! `on_output_data`.

/// Receives frames emitted by the consumer loop.
pub trait OutputSink: Send {
    /// Called once per emitted frame with the frame payload.
    ///
    /// For fixed framing `frame` is up to `frame_size` bytes; for
    /// length-prefixed framing it is the decoded payload. Silence fill, when
    /// enabled, delivers `frame_size` zero bytes.
    fn on_output_data(&mut self, frame: &[u8]);
}

impl<F> OutputSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn on_output_data(&mut self, frame: &[u8]) {
        self(frame)
    }
}
