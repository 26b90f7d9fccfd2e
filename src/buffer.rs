//! Jitter buffer core
//!
//! Owns the ring, the framing policy, the watermark state machine, and the
//! consumer worker. Producers call [`JitterBuffer::write`] from any thread;
//! the worker pulls one frame per tick and hands it to the output sink.
//!
//! A single mutex guards the ring, counters, and state. Critical sections
//! are bounded by one frame copy, and both the output sink and the event
//! sink are invoked only after the mutex has been released, so a slow
//! downstream never blocks a producer.

use crate::config::JitterBufferConfig;
use crate::error::{Error, Result};
use crate::events::{post_event, JitterEvent};
use crate::framing::{FrameRead, Framing};
use crate::ring::RingBuffer;
use crate::sink::OutputSink;
use crate::state::{JitterState, WatermarkMachine};
use crate::worker::{run_consumer, Command, Control};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Mutex acquisition bound on the write and consumer-tick paths
const DATA_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Mutex acquisition bound on control-plane calls (start, stop, reset)
const CONTROL_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Bound on each wait for a worker acknowledgement
const ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything the single data mutex protects
struct Inner {
    ring: RingBuffer,
    framing: Framing,
    machine: WatermarkMachine,
    overrun_count: u64,
    underrun_count: u64,
    malformed_count: u64,
    /// Bytes removed by overrun reclaim or malformed-frame discard; never
    /// counted into `total_read`
    bytes_dropped: u64,
}

/// State shared between the handle and the worker thread
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    pub(crate) control: Control,
    pub(crate) frame_interval: Duration,
    output_silence_on_empty: bool,
    event_sink: Option<Sender<JitterEvent>>,
}

/// What a consumer tick decided to emit
enum TickOutcome {
    /// A frame of this many bytes is in the scratch buffer
    Frame(usize),
    /// Nothing deliverable; silence fill applies if configured
    NoData,
    /// Mutex not acquired; emit nothing at all this tick
    LockTimeout,
}

/// Counter snapshot for monitoring and tests
#[derive(Debug, Clone, Copy)]
pub struct JitterBufferStats {
    /// State at snapshot time
    pub state: JitterState,

    /// Bytes currently buffered
    pub occupied: usize,

    /// Complete frames currently buffered
    pub frame_count: usize,

    /// Ring capacity in bytes (after any construction-time raise)
    pub capacity: usize,

    /// Lifetime bytes accepted from producers (headers included)
    pub total_written: u64,

    /// Lifetime bytes delivered through frame reads (headers included)
    pub total_read: u64,

    /// Lifetime bytes discarded by overrun or malformed frames
    pub bytes_dropped: u64,

    /// Writes that found insufficient free space
    pub overrun_count: u64,

    /// PLAYING to UNDERRUN transitions
    pub underrun_count: u64,

    /// Frames discarded for an out-of-range header length
    pub malformed_count: u64,
}

impl JitterBufferStats {
    /// Every byte accepted is either delivered, still buffered, or dropped.
    pub fn is_byte_conserved(&self) -> bool {
        self.total_written == self.total_read + self.occupied as u64 + self.bytes_dropped
    }
}

/// Watermark-driven jitter buffer with a fixed-cadence consumer.
///
/// Created with [`JitterBuffer::new`], fed through [`write`](Self::write),
/// drained by the internal worker into the output sink. Dropping the handle
/// (or calling [`shutdown`](Self::shutdown)) signals the worker to exit and
/// joins it with a bounded wait.
pub struct JitterBuffer {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl JitterBuffer {
    /// Allocate the ring and scratch storage, spawn the consumer worker,
    /// and return the handle in IDLE state.
    ///
    /// Fails on invalid configuration or if the worker thread cannot be
    /// spawned. With `with_header`, an undersized `buffer_size` is raised to
    /// hold the full pre-roll rather than rejected.
    pub fn new(config: JitterBufferConfig, sink: impl OutputSink + 'static) -> Result<Self> {
        config.validate()?;
        let capacity = config.effective_buffer_size();
        let framing = if config.with_header {
            Framing::LengthPrefixed {
                max_payload: config.frame_size,
            }
        } else {
            Framing::Fixed {
                frame_size: config.frame_size,
            }
        };

        debug!(
            "Creating jitter buffer: capacity={} bytes, frame_size={}, interval={:?}, high_water={}, low_water={}, with_header={}",
            capacity,
            config.frame_size,
            config.frame_interval,
            config.high_water,
            config.low_water,
            config.with_header
        );

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                ring: RingBuffer::with_capacity(capacity),
                framing,
                machine: WatermarkMachine::new(config.high_water, config.low_water),
                overrun_count: 0,
                underrun_count: 0,
                malformed_count: 0,
                bytes_dropped: 0,
            }),
            control: Control::new(),
            frame_interval: config.frame_interval,
            output_silence_on_empty: config.output_silence_on_empty,
            event_sink: config.event_sink,
        });

        let scratch = vec![0u8; config.frame_size].into_boxed_slice();
        let worker = thread::Builder::new()
            .name("jitter-buffer".into())
            .spawn({
                let shared = Arc::clone(&shared);
                let sink: Box<dyn OutputSink> = Box::new(sink);
                move || run_consumer(shared, sink, scratch)
            })
            .map_err(Error::Io)?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Begin accumulating pre-roll and start the consumer cadence.
    ///
    /// Idempotent: repeating the call re-acknowledges without disturbing a
    /// running cadence. Returns Ok even if the acknowledgement wait times
    /// out; the worker will still honor the request when it runs.
    pub fn start(&self) -> Result<()> {
        let event = {
            let mut guard = self
                .shared
                .inner
                .try_lock_for(CONTROL_LOCK_TIMEOUT)
                .ok_or(Error::LockTimeout {
                    op: "start",
                    timeout: CONTROL_LOCK_TIMEOUT,
                })?;
            guard.machine.on_start()
        };
        if let Some(ev) = event {
            post_event(self.shared.event_sink.as_ref(), ev);
        }
        if !self.shared.control.request(Command::Start, ACK_TIMEOUT) {
            warn!("Jitter buffer start: ack timeout");
        }
        info!("Jitter buffer started");
        Ok(())
    }

    /// Return the consumer to its parked wait and the state to IDLE.
    pub fn stop(&self) -> Result<()> {
        {
            let mut guard = self
                .shared
                .inner
                .try_lock_for(CONTROL_LOCK_TIMEOUT)
                .ok_or(Error::LockTimeout {
                    op: "stop",
                    timeout: CONTROL_LOCK_TIMEOUT,
                })?;
            guard.machine.on_stop();
        }
        if !self.shared.control.request(Command::Stop, ACK_TIMEOUT) {
            warn!("Jitter buffer stop: ack timeout");
        }
        info!("Jitter buffer stopped");
        Ok(())
    }

    /// Drop all buffered data and return to BUFFERING.
    ///
    /// Lifetime counters are untouched; only the cursors and occupancy are
    /// cleared.
    pub fn reset(&self) -> Result<()> {
        let event = {
            let mut guard = self
                .shared
                .inner
                .try_lock_for(CONTROL_LOCK_TIMEOUT)
                .ok_or(Error::LockTimeout {
                    op: "reset",
                    timeout: CONTROL_LOCK_TIMEOUT,
                })?;
            guard.ring.clear();
            guard.machine.on_reset()
        };
        if let Some(ev) = event {
            post_event(self.shared.event_sink.as_ref(), ev);
        }
        debug!("Jitter buffer reset");
        Ok(())
    }

    /// Enqueue one frame.
    ///
    /// With `with_header` the 2-byte length prefix is added internally and
    /// `payload` may be any length up to the configured cap. When free
    /// space is insufficient, the oldest data is discarded first (whole
    /// frames under `with_header`) and the write still succeeds; overruns
    /// are visible through [`stats`](Self::stats), not as errors.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        let event = {
            let mut guard = self
                .shared
                .inner
                .try_lock_for(DATA_LOCK_TIMEOUT)
                .ok_or(Error::LockTimeout {
                    op: "write",
                    timeout: DATA_LOCK_TIMEOUT,
                })?;
            let Inner {
                ring,
                framing,
                machine,
                overrun_count,
                bytes_dropped,
                ..
            } = &mut *guard;

            if matches!(framing, Framing::LengthPrefixed { .. })
                && payload.len() > u16::MAX as usize
            {
                return Err(Error::InvalidArgument(format!(
                    "payload of {} bytes does not fit a 2-byte length header",
                    payload.len()
                )));
            }
            let stored = framing.stored_len(payload.len());
            if stored > ring.capacity() {
                return Err(Error::InvalidArgument(format!(
                    "frame of {} bytes exceeds buffer capacity {}",
                    stored,
                    ring.capacity()
                )));
            }

            if stored > ring.free() {
                let reclaimed = framing.reclaim(ring, stored);
                *overrun_count += 1;
                *bytes_dropped += reclaimed.bytes_dropped as u64;
                warn!(
                    "Jitter buffer overrun: discarded {} frame(s), {} bytes, count={}",
                    reclaimed.frames_dropped, reclaimed.bytes_dropped, overrun_count
                );
            }
            framing.encode_into(ring, payload);

            let frames = framing.frame_count(ring);
            let event = machine.refill_check(frames);
            if event.is_some() {
                info!(
                    "Jitter buffer: start playing (producer path), frames={}",
                    frames
                );
            }
            event
        };
        if let Some(ev) = event {
            post_event(self.shared.event_sink.as_ref(), ev);
        }
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> JitterState {
        self.shared.inner.lock().machine.state()
    }

    /// Complete frames currently buffered
    pub fn frame_count(&self) -> usize {
        let guard = self.shared.inner.lock();
        guard.framing.frame_count(&guard.ring)
    }

    /// Counter snapshot
    pub fn stats(&self) -> JitterBufferStats {
        let guard = self.shared.inner.lock();
        JitterBufferStats {
            state: guard.machine.state(),
            occupied: guard.ring.len(),
            frame_count: guard.framing.frame_count(&guard.ring),
            capacity: guard.ring.capacity(),
            total_written: guard.ring.total_written(),
            total_read: guard.ring.total_read(),
            bytes_dropped: guard.bytes_dropped,
            overrun_count: guard.overrun_count,
            underrun_count: guard.underrun_count,
            malformed_count: guard.malformed_count,
        }
    }

    /// Signal the worker to exit and join it with a bounded wait.
    ///
    /// Equivalent to dropping the handle; provided for callers that want
    /// the teardown point to be explicit.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_worker();
        Ok(())
    }

    fn shutdown_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        if self.shared.control.request(Command::Exit, ACK_TIMEOUT) {
            if handle.join().is_err() {
                error!("Jitter buffer worker panicked before join");
            }
        } else {
            // The worker is wedged (most likely in the output sink). It will
            // observe the terminal exit flag at its next control check; do
            // not block teardown on it.
            warn!("Jitter buffer destroy: exit ack timeout, detaching worker");
        }
    }
}

impl Drop for JitterBuffer {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

impl Shared {
    /// One consumer tick: re-evaluate the state machine, pull at most one
    /// frame under the mutex, then emit outside it.
    pub(crate) fn process_once(&self, scratch: &mut [u8], sink: &mut dyn OutputSink) {
        let mut pending_event = None;
        let outcome = match self.inner.try_lock_for(DATA_LOCK_TIMEOUT) {
            None => {
                warn!("Jitter buffer tick: mutex timeout");
                TickOutcome::LockTimeout
            }
            Some(mut guard) => {
                let Inner {
                    ring,
                    framing,
                    machine,
                    underrun_count,
                    malformed_count,
                    bytes_dropped,
                    ..
                } = &mut *guard;
                let frames = framing.frame_count(ring);

                if let Some(ev) = machine.refill_check(frames) {
                    info!(
                        "Jitter buffer: start playing (consumer path), frames={}",
                        frames
                    );
                    pending_event = Some(ev);
                }

                if machine.state() != JitterState::Playing {
                    // Still accumulating pre-roll; withhold real frames.
                    TickOutcome::NoData
                } else if let Some(ev) = machine.drain_check(frames) {
                    *underrun_count += 1;
                    warn!(
                        "Jitter buffer underrun: frames={}, count={}",
                        frames, underrun_count
                    );
                    pending_event = Some(ev);
                    TickOutcome::NoData
                } else {
                    match framing.read_frame(ring, scratch) {
                        FrameRead::Frame(n) => TickOutcome::Frame(n),
                        FrameRead::Empty => TickOutcome::NoData,
                        FrameRead::Malformed { bytes_dropped: n }
                        | FrameRead::Corrupt { bytes_dropped: n } => {
                            *malformed_count += 1;
                            *bytes_dropped += n as u64;
                            TickOutcome::NoData
                        }
                    }
                }
            }
        };

        if let Some(ev) = pending_event {
            post_event(self.event_sink.as_ref(), ev);
        }
        match outcome {
            TickOutcome::Frame(n) => sink.on_output_data(&scratch[..n]),
            TickOutcome::NoData if self.output_silence_on_empty => {
                scratch.fill(0);
                sink.on_output_data(scratch);
            }
            TickOutcome::NoData | TickOutcome::LockTimeout => {}
        }
    }
}
