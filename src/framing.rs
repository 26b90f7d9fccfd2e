//! Frame policies over the byte ring
//!
//! A [`Framing`] value interprets raw ring contents as a sequence of frames.
//! Two policies exist:
//!
//! - **Fixed**: every `frame_size` bytes is one frame. Every multiple of
//!   `frame_size` from the head is a frame boundary, so overflow handling
//!   may discard at byte granularity.
//! - **Length-prefixed**: each frame is a 2-byte big-endian payload length
//!   followed by that many payload bytes. Here alignment is load-bearing:
//!   the head must always point at a header (or an empty ring). If an
//!   overflow discard ever splits a frame, a payload byte would later be
//!   parsed as a length and the stream would be unrecoverable. Overflow
//!   therefore drops whole frames from the head, walking headers exactly
//!   like the frame counter does, and only falls back to byte-level discard
//!   when the head no longer holds a parsable frame.
//!
//! A header length above half the ring capacity is treated as corruption:
//! frame enumeration stops there rather than looping on garbage.

use crate::ring::RingBuffer;
use tracing::warn;

/// Length prefix size for `LengthPrefixed` framing (big-endian u16)
pub(crate) const HEADER_LEN: usize = 2;

/// How the ring contents are cut into frames
#[derive(Debug, Clone, Copy)]
pub(crate) enum Framing {
    /// Every frame is exactly `frame_size` bytes
    Fixed { frame_size: usize },

    /// `[len_hi, len_lo, payload...]` with `len <= max_payload`
    LengthPrefixed { max_payload: usize },
}

/// Outcome of an overflow reclaim
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Reclaimed {
    pub frames_dropped: usize,
    pub bytes_dropped: usize,
    /// Byte-level fallback was needed; head alignment is no longer assured
    pub alignment_lost: bool,
}

/// Outcome of a single frame read
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameRead {
    /// Payload of this many bytes was copied into the scratch buffer
    Frame(usize),

    /// No complete frame is deliverable this tick
    Empty,

    /// Head frame exceeded the payload cap and was dropped whole
    Malformed { bytes_dropped: usize },

    /// Head header can never describe a frame that fits the ring; all
    /// buffered data was dropped to re-arm the stream
    Corrupt { bytes_dropped: usize },
}

impl Framing {
    /// Bytes the ring must absorb to store `payload_len` payload bytes
    pub fn stored_len(&self, payload_len: usize) -> usize {
        match self {
            Framing::Fixed { .. } => payload_len,
            Framing::LengthPrefixed { .. } => HEADER_LEN + payload_len,
        }
    }

    /// Number of complete frames currently in the ring.
    ///
    /// For length-prefixed framing this walks headers from the head without
    /// moving any cursor, stopping at the first frame that cannot be fully
    /// verified (short data or corrupt length).
    pub fn frame_count(&self, ring: &RingBuffer) -> usize {
        match *self {
            Framing::Fixed { frame_size } => ring.len() / frame_size,
            Framing::LengthPrefixed { .. } => {
                let mut offset = 0;
                let mut count = 0;
                while let Some(len) = parsable_frame_at(ring, offset) {
                    count += 1;
                    offset += len;
                }
                count
            }
        }
    }

    /// Encode one frame at the tail. The caller must have reclaimed space:
    /// `stored_len(payload.len()) <= ring.free()`.
    pub fn encode_into(&self, ring: &mut RingBuffer, payload: &[u8]) {
        if let Framing::LengthPrefixed { .. } = self {
            ring.write(&(payload.len() as u16).to_be_bytes());
        }
        ring.write(payload);
    }

    /// Free up space so that `needed` bytes fit, discarding from the head.
    ///
    /// Fixed framing discards exactly the shortfall. Length-prefixed framing
    /// drops the minimum number of whole frames, then falls back to a
    /// byte-level discard of any remaining shortfall; the fallback exists to
    /// guarantee forward progress and is not expected on well-formed
    /// streams.
    pub fn reclaim(&self, ring: &mut RingBuffer, needed: usize) -> Reclaimed {
        let mut out = Reclaimed::default();
        if let Framing::LengthPrefixed { .. } = self {
            while ring.free() < needed {
                let Some(len) = parsable_frame_at(ring, 0) else {
                    break;
                };
                out.bytes_dropped += ring.discard(len);
                out.frames_dropped += 1;
            }
        }
        if ring.free() < needed {
            let shortfall = needed - ring.free();
            out.bytes_dropped += ring.discard(shortfall);
            if matches!(self, Framing::LengthPrefixed { .. }) {
                out.alignment_lost = true;
                warn!(
                    "Jitter buffer overrun: alignment lost, byte-level discard of {} bytes (frames dropped={})",
                    shortfall, out.frames_dropped
                );
            }
        }
        out
    }

    /// Take one frame from the head into `scratch`.
    ///
    /// `scratch` must hold `frame_size` bytes (the payload cap for
    /// length-prefixed framing). Fixed framing consumes up to one frame's
    /// worth of bytes; length-prefixed framing consumes header plus payload
    /// atomically or not at all.
    pub fn read_frame(&self, ring: &mut RingBuffer, scratch: &mut [u8]) -> FrameRead {
        match *self {
            Framing::Fixed { frame_size } => {
                let len = frame_size.min(scratch.len());
                let n = ring.read(&mut scratch[..len]);
                if n == 0 {
                    FrameRead::Empty
                } else {
                    FrameRead::Frame(n)
                }
            }
            Framing::LengthPrefixed { max_payload } => {
                if ring.len() < HEADER_LEN {
                    return FrameRead::Empty;
                }
                let len = header_at(ring, 0);
                if len > ring.capacity() / 2 || HEADER_LEN + len > ring.capacity() {
                    // This header can never be satisfied; waiting would wedge
                    // the stream until an overrun byte-discards it anyway.
                    let dropped = ring.discard(ring.len());
                    warn!(
                        "Jitter buffer read: unparsable header len={}, dropping {} buffered bytes",
                        len, dropped
                    );
                    return FrameRead::Corrupt {
                        bytes_dropped: dropped,
                    };
                }
                if ring.len() < HEADER_LEN + len {
                    return FrameRead::Empty;
                }
                if len > max_payload {
                    let dropped = ring.discard(HEADER_LEN + len);
                    warn!(
                        "Jitter buffer read: header len={} > max payload {}, frame dropped",
                        len, max_payload
                    );
                    return FrameRead::Malformed {
                        bytes_dropped: dropped,
                    };
                }
                let mut header = [0u8; HEADER_LEN];
                ring.read(&mut header);
                let n = ring.read(&mut scratch[..len]);
                FrameRead::Frame(n)
            }
        }
    }
}

/// Payload length of the header starting `offset` bytes past the head.
/// Caller ensures at least `offset + HEADER_LEN` bytes are buffered.
fn header_at(ring: &RingBuffer, offset: usize) -> usize {
    u16::from_be_bytes([ring.byte_at(offset), ring.byte_at(offset + 1)]) as usize
}

/// Total stored length (`HEADER_LEN + payload`) of the complete frame at
/// `offset` past the head, or None if the data there cannot be verified as
/// a whole frame.
fn parsable_frame_at(ring: &RingBuffer, offset: usize) -> Option<usize> {
    let remaining = ring.len() - offset;
    if remaining < HEADER_LEN {
        return None;
    }
    let len = header_at(ring, offset);
    if len > ring.capacity() / 2 {
        return None;
    }
    if remaining < HEADER_LEN + len {
        return None;
    }
    Some(HEADER_LEN + len)
}
