//! Jitter buffer configuration
//!
//! Built once by the caller, validated and copied into the instance at
//! construction, immutable afterwards.

use crate::error::{Error, Result};
use crate::events::JitterEvent;
use crate::framing::HEADER_LEN;
use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::warn;

/// Payload format hint for the stream passing through the buffer.
///
/// The buffer treats payloads as opaque either way; the hint only matters
/// for silence fill, where Opus decoders accept a zero frame at a limited
/// set of cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Opus,
    Pcm,
}

/// Silence-fill cadences Opus decoders accept
const OPUS_SILENCE_INTERVALS_MS: [u64; 4] = [20, 40, 60, 120];

/// Configuration for a [`JitterBuffer`](crate::JitterBuffer)
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Ring capacity in bytes. Raised automatically when `with_header`
    /// needs more room for the pre-roll (see `effective_buffer_size`).
    pub buffer_size: usize,

    /// Fixed frame length in bytes, or the payload cap per frame when
    /// `with_header` is set
    pub frame_size: usize,

    /// Consumer tick period; one frame is emitted per tick while playing
    pub frame_interval: Duration,

    /// Complete frames to accumulate before playback starts or resumes
    pub high_water: usize,

    /// Frame count below which playback stalls into underrun
    pub low_water: usize,

    /// Store frames as `[2-byte big-endian length][payload]` instead of
    /// fixed-size slices
    pub with_header: bool,

    /// Emit a zeroed frame instead of nothing while not playing
    pub output_silence_on_empty: bool,

    /// Payload format hint, used to sanity-check silence cadence
    pub audio_format: AudioFormat,

    /// Optional receiver for state-transition events
    pub event_sink: Option<Sender<JitterEvent>>,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: 11 * 1024,
            frame_size: 512,
            frame_interval: Duration::from_millis(20),
            high_water: 20,
            low_water: 10,
            with_header: false,
            output_silence_on_empty: false,
            audio_format: AudioFormat::default(),
            event_sink: None,
        }
    }
}

impl JitterBufferConfig {
    /// Reject configurations the buffer cannot run with.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.frame_interval.is_zero() {
            return Err(Error::InvalidConfig("frame_interval must be > 0".into()));
        }
        if self.frame_size == 0 {
            return Err(Error::InvalidConfig("frame_size must be > 0".into()));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer_size must be > 0".into()));
        }
        if self.low_water > self.high_water {
            return Err(Error::InvalidConfig(format!(
                "low_water ({}) must not exceed high_water ({})",
                self.low_water, self.high_water
            )));
        }
        if self.with_header && self.frame_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "frame_size ({}) cannot be length-prefixed with a 2-byte header",
                self.frame_size
            )));
        }
        if self.output_silence_on_empty
            && self.audio_format == AudioFormat::Opus
            && !OPUS_SILENCE_INTERVALS_MS.contains(&(self.frame_interval.as_millis() as u64))
        {
            warn!(
                "Jitter buffer: Opus silence fill expects a frame_interval of {:?} ms, got {:?}",
                OPUS_SILENCE_INTERVALS_MS, self.frame_interval
            );
        }
        Ok(())
    }

    /// Ring capacity actually allocated.
    ///
    /// With length-prefixed frames the per-frame size is variable, so the
    /// configured capacity is raised to the worst case of `high_water`
    /// frames at the payload cap. The raise is silent apart from a warning
    /// log, matching the construction contract of "adjust, don't fail".
    pub(crate) fn effective_buffer_size(&self) -> usize {
        if !self.with_header {
            return self.buffer_size;
        }
        let min_size = self.high_water * (HEADER_LEN + self.frame_size);
        if self.buffer_size < min_size {
            warn!(
                "Jitter buffer: with_header needs buffer_size >= {} (high_water * (2 + max payload)), adjusting {} -> {}",
                min_size, self.buffer_size, min_size
            );
            min_size
        } else {
            self.buffer_size
        }
    }
}
