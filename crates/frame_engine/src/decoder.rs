//! Per-session stream decoder.

use bytes::Bytes;
use contracts::{DecoderConfig, Packet, StreamEvent};
use tracing::{instrument, trace, warn};

use crate::assembler::FrameAssembler;
use crate::cursor::{ByteCursor, Scan};
use crate::error::EngineError;
use crate::length_prefix::{Record, RecordReader};
use crate::loss::{LossEstimator, LossStats};
use crate::validator;

/// Decoder bound to one session's byte feed.
///
/// Owns the cursor, the assembler (and thereby the single in-flight frame)
/// and, for length-prefixed transports, the record reader.
#[derive(Debug)]
pub struct StreamDecoder {
    config: DecoderConfig,
    cursor: ByteCursor,
    assembler: FrameAssembler,
    records: Option<RecordReader>,
    loss: LossEstimator,
    bytes_fed: u64,
}

impl StreamDecoder {
    /// Create a decoder after validating `config`.
    pub fn new(config: DecoderConfig) -> Result<Self, EngineError> {
        config.check()?;
        let cursor = ByteCursor::new(
            config.packet_size,
            config.header_bytes,
            config.buffer_overrun_ceiling,
        );
        let records = config
            .use_length_prefix
            .then(|| RecordReader::new(config.batch_length_ceiling));
        Ok(Self {
            cursor,
            assembler: FrameAssembler::new(config.frame_size),
            records,
            loss: LossEstimator::new(config.frame_size),
            bytes_fed: 0,
            config,
        })
    }

    /// Decode a complete in-memory stream as one session.
    pub fn decode_all(
        config: DecoderConfig,
        stream: &[u8],
    ) -> Result<Vec<StreamEvent>, EngineError> {
        let mut decoder = Self::new(config)?;
        let mut events = decoder.on_bytes(stream);
        events.extend(decoder.on_end_of_stream());
        Ok(events)
    }

    /// Feed one chunk and return every event it produced, in order.
    #[instrument(level = "trace", name = "decoder_on_bytes", skip_all, fields(len = chunk.len()))]
    pub fn on_bytes(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.bytes_fed += chunk.len() as u64;
        let mut events = Vec::new();

        let Some(reader) = self.records.as_mut() else {
            self.cursor.feed(chunk);
            self.drain(&mut events);
            return events;
        };
        reader.feed(chunk);

        while let Some(record) = self.records.as_mut().and_then(RecordReader::next_record) {
            match record {
                Record::InvalidLength { declared } => {
                    warn!(
                        declared,
                        ceiling = self.config.batch_length_ceiling,
                        "invalid batch length"
                    );
                    events.push(StreamEvent::InvalidBatchLength { declared });
                }
                Record::Blob(blob) => self.scan_blob(&blob, &mut events),
            }
        }
        events
    }

    /// Finish the session: flush the open frame and report leftover bytes.
    pub fn on_end_of_stream(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(event) = self.assembler.flush() {
            events.push(event);
        }
        events.push(StreamEvent::SessionEnded {
            unconsumed_bytes: self.pending_len(),
        });
        events
    }

    /// Bytes held by the cursor or the record reader.
    pub fn pending_len(&self) -> usize {
        self.cursor.pending_len() + self.records.as_ref().map_or(0, RecordReader::pending_len)
    }

    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }

    pub fn loss_stats(&self) -> LossStats {
        self.loss.stats()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn scan_blob(&mut self, blob: &Bytes, events: &mut Vec<StreamEvent>) {
        self.cursor.clear();
        self.cursor.feed(blob);
        self.drain(events);
        let unconsumed = self.cursor.clear();
        if unconsumed > 0 {
            trace!(unconsumed, "batch remainder dropped");
            events.push(StreamEvent::BatchRemainder { unconsumed });
        }
    }

    /// Scan the cursor until it needs more bytes.
    fn drain(&mut self, events: &mut Vec<StreamEvent>) {
        loop {
            let verdict = match self.cursor.scan() {
                Scan::NeedMore => break,
                Scan::Overrun { dropped_bytes } => {
                    warn!(dropped_bytes, "noise ceiling reached, noise run discarded");
                    events.push(StreamEvent::BufferOverrunDiscarded { dropped_bytes });
                    continue;
                }
                Scan::Candidate(block) => validator::inspect(block, &self.config).map_err(
                    |reason| StreamEvent::PacketInvalid {
                        reason,
                        raw_bytes: Bytes::copy_from_slice(block),
                    },
                ),
            };

            match verdict {
                Ok(sequence) => {
                    let packet = Packet::new(self.cursor.take_block(), sequence);
                    self.accept(packet, events);
                }
                Err(event) => {
                    trace!(%event, "candidate rejected");
                    self.cursor.reject();
                    events.push(event);
                }
            }
        }
    }

    fn accept(&mut self, packet: Packet, events: &mut Vec<StreamEvent>) {
        trace!(sequence = packet.sequence, "packet accepted");
        self.loss.observe(packet.sequence);
        if packet.reserved != self.config.reserved_sentinel {
            events.push(StreamEvent::ReservedMismatch {
                sequence: packet.sequence,
                found: packet.reserved,
            });
        }
        if let Some(event) = self.assembler.push(packet) {
            events.push(event);
        }
    }
}
