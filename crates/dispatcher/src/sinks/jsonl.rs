//! JsonlSink - one JSON object per event

use std::collections::HashMap;
use std::io::{self, BufWriter, Write};

use chrono::{SecondsFormat, Utc};
use contracts::{ContractError, EventSink, SessionEvent, StreamEvent};
use serde::Serialize;
use tracing::{debug, instrument};

use super::FileSinkConfig;

/// Serialized form of one event
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    pub ts: String,
    pub session: &'a str,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequences: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub got: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<u32>,
}

impl<'a> EventRecord<'a> {
    pub fn from_event(event: &'a SessionEvent) -> Self {
        let mut record = Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            session: event.session_id.as_str(),
            kind: event.event.kind(),
            index: None,
            sequences: None,
            bytes: None,
            expected: None,
            got: None,
            reason: None,
            declared: None,
        };

        match &event.event {
            StreamEvent::FrameComplete { frame }
            | StreamEvent::FrameIncomplete {
                partial_frame: frame,
            } => {
                record.index = Some(frame.index);
                record.sequences = Some(frame.sequences());
                record.bytes = Some(frame.byte_len());
            }
            StreamEvent::SequenceError {
                expected,
                got,
                partial_frame,
            } => {
                record.index = Some(partial_frame.index);
                record.sequences = Some(partial_frame.sequences());
                record.expected = Some(*expected);
                record.got = Some(*got);
            }
            StreamEvent::PacketInvalid { reason, raw_bytes } => {
                record.reason = Some(reason.to_string());
                record.bytes = Some(raw_bytes.len());
            }
            StreamEvent::OrphanPacket { packet } => {
                record.sequences = Some(vec![packet.sequence]);
                record.bytes = Some(packet.len());
            }
            StreamEvent::ReservedMismatch { sequence, found } => {
                record.sequences = Some(vec![*sequence]);
                record.reason = Some(format!("reserved byte {found:#04x}"));
            }
            StreamEvent::BufferOverrunDiscarded { dropped_bytes } => {
                record.bytes = Some(*dropped_bytes);
            }
            StreamEvent::InvalidBatchLength { declared } => {
                record.declared = Some(*declared);
            }
            StreamEvent::BatchRemainder { unconsumed } => {
                record.bytes = Some(*unconsumed);
            }
            StreamEvent::SessionEnded { unconsumed_bytes } => {
                record.bytes = Some(*unconsumed_bytes);
            }
        }
        record
    }
}

/// Sink writing newline-delimited JSON
pub struct JsonlSink {
    name: String,
    out: BufWriter<std::fs::File>,
}

impl JsonlSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> io::Result<Self> {
        Ok(Self {
            name: name.into(),
            out: BufWriter::new(config.open()?),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params)?)
    }

    fn sink_error(&self, e: impl ToString) -> ContractError {
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl EventSink for JsonlSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "jsonl_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.event.kind())
    )]
    async fn write(&mut self, event: &SessionEvent) -> Result<(), ContractError> {
        let record = EventRecord::from_event(event);
        serde_json::to_writer(&mut self.out, &record).map_err(|e| self.sink_error(e))?;
        self.out.write_all(b"\n").map_err(|e| self.sink_error(e))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        self.out.flush().map_err(|e| self.sink_error(e))
    }

    #[instrument(name = "jsonl_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.out.flush().map_err(|e| self.sink_error(e))?;
        debug!(sink = %self.name, "JsonlSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Frame, Packet, SessionId};
    use tempfile::tempdir;

    fn packet(seq: u8) -> Packet {
        let mut raw = vec![0x0A, 0x00, seq, 0x00];
        raw.extend_from_slice(&[0u8; 40]);
        Packet::new(Bytes::from(raw), seq)
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_one_object_per_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut sink = JsonlSink::new(
            "jsonl",
            FileSinkConfig {
                path: path.clone(),
                append: false,
            },
        )
        .unwrap();

        let session = SessionId::new("replay:capture.bin");
        let mut partial = Frame::open(4, packet(0), 8);
        partial.packets.push(packet(1));
        let events = [
            StreamEvent::SequenceError {
                expected: 2,
                got: 5,
                partial_frame: partial,
            },
            StreamEvent::InvalidBatchLength { declared: 131072 },
            StreamEvent::SessionEnded {
                unconsumed_bytes: 0,
            },
        ];
        for event in events {
            sink.write(&SessionEvent::new(session.clone(), event))
                .await
                .unwrap();
        }
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);

        assert_eq!(lines[0]["kind"], "sequence_error");
        assert_eq!(lines[0]["session"], "replay:capture.bin");
        assert_eq!(lines[0]["index"], 4);
        assert_eq!(lines[0]["sequences"], serde_json::json!([0, 1]));
        assert_eq!(lines[0]["expected"], 2);
        assert_eq!(lines[0]["got"], 5);

        assert_eq!(lines[1]["declared"], 131072);
        assert!(lines[1].get("index").is_none());

        assert_eq!(lines[2]["kind"], "session_ended");
        assert_eq!(lines[2]["bytes"], 0);
    }
}
