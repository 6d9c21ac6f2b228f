//! Packet and frame records produced by the frame engine.

use bytes::Bytes;

/// One validated fixed-size protocol unit.
///
/// Keeps the full raw block so sinks can re-emit it byte-for-byte. The
/// payload is a zero-copy view into `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number (`raw[2] & sequence_mask`)
    pub sequence: u8,
    /// Raw reserved byte (`raw[3]`)
    pub reserved: u8,
    raw: Bytes,
}

impl Packet {
    /// Bytes before the payload: header(2) + sequence(1) + reserved(1)
    pub const PREFIX_LEN: usize = 4;

    /// Build a packet record from an already validated raw block.
    ///
    /// Callers guarantee `raw.len() >= PREFIX_LEN`.
    pub fn new(raw: Bytes, sequence: u8) -> Self {
        let reserved = raw.get(3).copied().unwrap_or_default();
        Self {
            sequence,
            reserved,
            raw,
        }
    }

    pub fn header(&self) -> [u8; 2] {
        [self.raw[0], self.raw[1]]
    }

    pub fn payload(&self) -> Bytes {
        self.raw.slice(Self::PREFIX_LEN..)
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Ordered group of packets with sequences `0..n`, strictly ascending.
///
/// A complete frame holds exactly `frame_size` packets; partial frames carried
/// by `FrameIncomplete` / `SequenceError` hold fewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Session-local index assigned when the frame was opened
    pub index: u64,
    pub packets: Vec<Packet>,
}

impl Frame {
    pub fn open(index: u64, first: Packet, frame_size: usize) -> Self {
        let mut packets = Vec::with_capacity(frame_size);
        packets.push(first);
        Self { index, packets }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Sequence numbers in arrival order.
    pub fn sequences(&self) -> Vec<u8> {
        self.packets.iter().map(|p| p.sequence).collect()
    }

    /// Total raw bytes across all member packets.
    pub fn byte_len(&self) -> usize {
        self.packets.iter().map(Packet::len).sum()
    }
}
