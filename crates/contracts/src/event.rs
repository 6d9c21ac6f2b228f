//! Stream events - the engine's only output
//!
//! Every outcome of decoding, good or bad, surfaces as a [`StreamEvent`].
//! Sessions wrap them into [`SessionEvent`] before publishing downstream.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::{Frame, Packet, SessionId};

/// Why a candidate block was rejected by the packet validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("bad length: expected {expected}, got {actual}")]
    BadLength { expected: usize, actual: usize },

    #[error("bad header: found {:02X} {:02X}", .found[0], .found[1])]
    BadHeader { found: [u8; 2] },

    #[error("bad sequence: {sequence}")]
    BadSequence { sequence: u8 },

    #[error("bad reserved byte: 0x{found:02X}")]
    BadReserved { found: u8 },
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadLength { .. } => "bad_length",
            Self::BadHeader { .. } => "bad_header",
            Self::BadSequence { .. } => "bad_sequence",
            Self::BadReserved { .. } => "bad_reserved",
        }
    }
}

/// Decoder output event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A header-aligned block failed validation
    PacketInvalid {
        reason: RejectionReason,
        raw_bytes: Bytes,
    },
    /// Accepted packet whose reserved byte differs from the sentinel (warn-only mode)
    ReservedMismatch { sequence: u8, found: u8 },
    /// Non-zero sequence packet arrived with no frame in progress
    OrphanPacket { packet: Packet },
    FrameComplete { frame: Frame },
    /// A new sequence-0 packet (or end of stream) closed a partial frame
    FrameIncomplete { partial_frame: Frame },
    SequenceError {
        expected: u8,
        got: u8,
        partial_frame: Frame,
    },
    /// Noise since the last accepted block reached the overrun ceiling
    BufferOverrunDiscarded { dropped_bytes: usize },
    /// Length prefix was zero or above the ceiling
    InvalidBatchLength { declared: u32 },
    /// Blob bytes left over after the last packet of a length-prefixed record
    BatchRemainder { unconsumed: usize },
    /// Terminal event of every session
    SessionEnded { unconsumed_bytes: usize },
}

impl StreamEvent {
    /// Stable snake_case label used by logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PacketInvalid { .. } => "packet_invalid",
            Self::ReservedMismatch { .. } => "reserved_mismatch",
            Self::OrphanPacket { .. } => "orphan_packet",
            Self::FrameComplete { .. } => "frame_complete",
            Self::FrameIncomplete { .. } => "frame_incomplete",
            Self::SequenceError { .. } => "sequence_error",
            Self::BufferOverrunDiscarded { .. } => "buffer_overrun_discarded",
            Self::InvalidBatchLength { .. } => "invalid_batch_length",
            Self::BatchRemainder { .. } => "batch_remainder",
            Self::SessionEnded { .. } => "session_ended",
        }
    }

    /// All kind labels, in declaration order.
    pub const KINDS: [&'static str; 10] = [
        "packet_invalid",
        "reserved_mismatch",
        "orphan_packet",
        "frame_complete",
        "frame_incomplete",
        "sequence_error",
        "buffer_overrun_discarded",
        "invalid_batch_length",
        "batch_remainder",
        "session_ended",
    ];

    /// Whether the event reports a defect in the stream.
    pub fn is_anomaly(&self) -> bool {
        !matches!(
            self,
            Self::FrameComplete { .. } | Self::SessionEnded { .. }
        )
    }

    /// Frame carried by this event, if any.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::FrameComplete { frame } => Some(frame),
            Self::FrameIncomplete { partial_frame } => Some(partial_frame),
            Self::SequenceError { partial_frame, .. } => Some(partial_frame),
            _ => None,
        }
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketInvalid { reason, raw_bytes } => {
                write!(f, "{} ({reason}, {} bytes)", self.kind(), raw_bytes.len())
            }
            Self::ReservedMismatch { sequence, found } => {
                write!(f, "{} (seq={sequence}, found=0x{found:02X})", self.kind())
            }
            Self::OrphanPacket { packet } => {
                write!(f, "{} (seq={})", self.kind(), packet.sequence)
            }
            Self::FrameComplete { frame } | Self::FrameIncomplete { partial_frame: frame } => {
                write!(
                    f,
                    "{} (index={}, packets={})",
                    self.kind(),
                    frame.index,
                    frame.len()
                )
            }
            Self::SequenceError {
                expected,
                got,
                partial_frame,
            } => write!(
                f,
                "{} (expected={expected}, got={got}, partial={})",
                self.kind(),
                partial_frame.len()
            ),
            Self::BufferOverrunDiscarded { dropped_bytes } => {
                write!(f, "{} ({dropped_bytes} bytes)", self.kind())
            }
            Self::InvalidBatchLength { declared } => {
                write!(f, "{} (declared={declared})", self.kind())
            }
            Self::BatchRemainder { unconsumed } => {
                write!(f, "{} ({unconsumed} bytes)", self.kind())
            }
            Self::SessionEnded { unconsumed_bytes } => {
                write!(f, "{} (unconsumed={unconsumed_bytes})", self.kind())
            }
        }
    }
}

/// Event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub event: StreamEvent,
}

impl SessionEvent {
    pub fn new(session_id: SessionId, event: StreamEvent) -> Self {
        Self { session_id, event }
    }
}
