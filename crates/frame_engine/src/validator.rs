//! Packet validator - pure, stateless.
//!
//! Checks run in order and short-circuit on the first failure:
//! length, header, sequence range, reserved byte (strict mode only).

use bytes::Bytes;
use contracts::{DecoderConfig, Packet, RejectionReason};

/// Validate a raw block and build a [`Packet`] from it.
///
/// The packet owns a copy of `block`. The decoder uses [`inspect`] and takes
/// the block from its cursor instead, avoiding the copy.
pub fn validate(block: &[u8], config: &DecoderConfig) -> Result<Packet, RejectionReason> {
    let sequence = inspect(block, config)?;
    Ok(Packet::new(Bytes::copy_from_slice(block), sequence))
}

/// Run every check and return the masked sequence number.
pub fn inspect(block: &[u8], config: &DecoderConfig) -> Result<u8, RejectionReason> {
    if block.len() != config.packet_size || block.len() < Packet::PREFIX_LEN {
        return Err(RejectionReason::BadLength {
            expected: config.packet_size,
            actual: block.len(),
        });
    }

    let found = [block[0], block[1]];
    if found != config.header_bytes {
        return Err(RejectionReason::BadHeader { found });
    }

    let sequence = block[2] & config.sequence_mask;
    if usize::from(sequence) >= config.frame_size {
        return Err(RejectionReason::BadSequence { sequence });
    }

    if config.strict_reserved && block[3] != config.reserved_sentinel {
        return Err(RejectionReason::BadReserved { found: block[3] });
    }

    Ok(sequence)
}
