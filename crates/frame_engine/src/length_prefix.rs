//! Length-prefixed record reader.
//!
//! Transport format: `[u32 big-endian length][length bytes]`, repeated. A
//! zero or oversized length is reported and the reader goes straight back to
//! reading the next prefix; no body bytes are skipped.

use bytes::{Buf, Bytes, BytesMut};

const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
enum Stage {
    AwaitingPrefix,
    AwaitingBody { declared: u32 },
}

/// One step of record extraction.
#[derive(Debug, PartialEq, Eq)]
pub enum Record {
    /// Complete record body
    Blob(Bytes),
    /// Prefix was zero or above the ceiling
    InvalidLength { declared: u32 },
}

/// Accumulates bytes into length-prefixed records
#[derive(Debug)]
pub struct RecordReader {
    staging: BytesMut,
    stage: Stage,
    ceiling: u32,
}

impl RecordReader {
    pub fn new(ceiling: u32) -> Self {
        Self {
            staging: BytesMut::new(),
            stage: Stage::AwaitingPrefix,
            ceiling,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.staging.extend_from_slice(chunk);
    }

    /// Extract the next record, or `None` when more bytes are needed.
    pub fn next_record(&mut self) -> Option<Record> {
        loop {
            match self.stage {
                Stage::AwaitingPrefix => {
                    if self.staging.len() < PREFIX_LEN {
                        return None;
                    }
                    let declared = self.staging.get_u32();
                    if declared == 0 || declared > self.ceiling {
                        return Some(Record::InvalidLength { declared });
                    }
                    self.stage = Stage::AwaitingBody { declared };
                }
                Stage::AwaitingBody { declared } => {
                    let len = declared as usize;
                    if self.staging.len() < len {
                        return None;
                    }
                    self.stage = Stage::AwaitingPrefix;
                    return Some(Record::Blob(self.staging.split_to(len).freeze()));
                }
            }
        }
    }

    /// Bytes staged but not yet part of an emitted record, including an
    /// accepted prefix whose body is still incomplete.
    pub fn pending_len(&self) -> usize {
        match self.stage {
            Stage::AwaitingPrefix => self.staging.len(),
            Stage::AwaitingBody { .. } => self.staging.len() + PREFIX_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_record_split_anywhere() {
        let stream = record(&[1, 2, 3, 4, 5]);
        for split in 0..=stream.len() {
            let mut reader = RecordReader::new(65536);
            reader.feed(&stream[..split]);
            let first = reader.next_record();
            reader.feed(&stream[split..]);
            let record = first.or_else(|| reader.next_record());
            assert_eq!(record, Some(Record::Blob(Bytes::from_static(&[1, 2, 3, 4, 5]))));
            assert_eq!(reader.pending_len(), 0);
        }
    }

    #[test]
    fn test_zero_length_is_invalid() {
        let mut reader = RecordReader::new(65536);
        let mut stream = 0u32.to_be_bytes().to_vec();
        stream.extend(record(&[9]));
        reader.feed(&stream);
        assert_eq!(
            reader.next_record(),
            Some(Record::InvalidLength { declared: 0 })
        );
        assert_eq!(
            reader.next_record(),
            Some(Record::Blob(Bytes::from_static(&[9])))
        );
    }

    #[test]
    fn test_oversized_prefix_does_not_consume_body() {
        let mut reader = RecordReader::new(65536);
        reader.feed(&0x0002_0000u32.to_be_bytes());
        reader.feed(&[0xAB; 6]);
        assert_eq!(
            reader.next_record(),
            Some(Record::InvalidLength { declared: 0x0002_0000 })
        );
        // the following bytes are read as the next prefix
        assert_eq!(
            reader.next_record(),
            Some(Record::InvalidLength { declared: 0xABAB_ABAB })
        );
        assert_eq!(reader.next_record(), None);
        assert_eq!(reader.pending_len(), 2);
    }

    #[test]
    fn test_pending_counts_accepted_prefix() {
        let mut reader = RecordReader::new(65536);
        reader.feed(&record(&[0; 10])[..7]);
        assert_eq!(reader.next_record(), None);
        assert_eq!(reader.pending_len(), 7);
    }
}
