//! Frame assembler - stateful reducer over validated packets.

use contracts::{Frame, Packet, StreamEvent};
use tracing::debug;

#[derive(Debug, Default)]
enum AssemblerState {
    #[default]
    Empty,
    Collecting { frame: Frame, expected: u8 },
}

/// Groups packets into sequence-ordered frames.
///
/// Sequence 0 always opens a new frame, closing any frame in progress as
/// incomplete. Every push yields at most one event.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    state: AssemblerState,
    next_index: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            state: AssemblerState::Empty,
            next_index: 0,
        }
    }

    /// Feed one validated packet.
    pub fn push(&mut self, packet: Packet) -> Option<StreamEvent> {
        match std::mem::take(&mut self.state) {
            AssemblerState::Empty if packet.sequence == 0 => self.open(packet),
            AssemblerState::Empty => Some(StreamEvent::OrphanPacket { packet }),
            AssemblerState::Collecting { frame, .. } if packet.sequence == 0 => {
                debug!(index = frame.index, members = frame.len(), "frame closed early");
                let closed = StreamEvent::FrameIncomplete {
                    partial_frame: frame,
                };
                // frame_size > 1 here, so opening never completes immediately
                let opened = self.open(packet);
                debug_assert!(opened.is_none());
                Some(closed)
            }
            AssemblerState::Collecting {
                mut frame,
                expected,
            } if packet.sequence == expected => {
                frame.packets.push(packet);
                self.advance(frame)
            }
            AssemblerState::Collecting { frame, expected } => Some(StreamEvent::SequenceError {
                expected,
                got: packet.sequence,
                partial_frame: frame,
            }),
        }
    }

    /// Close the frame in progress, if any, as incomplete.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        match std::mem::take(&mut self.state) {
            AssemblerState::Empty => None,
            AssemblerState::Collecting { frame, .. } => Some(StreamEvent::FrameIncomplete {
                partial_frame: frame,
            }),
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, AssemblerState::Collecting { .. })
    }

    /// Next expected sequence while collecting.
    pub fn expected_sequence(&self) -> Option<u8> {
        match &self.state {
            AssemblerState::Empty => None,
            AssemblerState::Collecting { expected, .. } => Some(*expected),
        }
    }

    /// Number of frames opened so far in this session.
    pub fn frames_opened(&self) -> u64 {
        self.next_index
    }

    fn open(&mut self, first: Packet) -> Option<StreamEvent> {
        let index = self.next_index;
        self.next_index += 1;
        self.advance(Frame::open(index, first, self.frame_size))
    }

    fn advance(&mut self, frame: Frame) -> Option<StreamEvent> {
        if frame.len() >= self.frame_size {
            debug!(index = frame.index, "frame complete");
            return Some(StreamEvent::FrameComplete { frame });
        }
        // len < frame_size <= 256
        let expected = frame.len() as u8;
        self.state = AssemblerState::Collecting { frame, expected };
        None
    }
}
