//! HexFileSink - human-readable hex dump of every event

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, BufWriter, Write};

use chrono::Local;
use contracts::{ContractError, EventSink, Packet, SessionEvent, SessionId, StreamEvent};
use tracing::{debug, instrument};

use super::FileSinkConfig;

const BYTES_PER_LINE: usize = 16;

/// Per-session tallies printed in the session end line
#[derive(Debug, Default)]
struct SessionTally {
    frames_complete: u64,
    anomalies: u64,
}

/// Dump label for an event
pub fn label(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::PacketInvalid { .. } => "INVALID_PACKET",
        StreamEvent::ReservedMismatch { .. } => "RESERVED_MISMATCH",
        StreamEvent::OrphanPacket { .. } => "ORPHAN_PACKET",
        StreamEvent::FrameComplete { .. } => "FRAME_COMPLETE",
        StreamEvent::FrameIncomplete { .. } => "INCOMPLETE_FRAME",
        StreamEvent::SequenceError { .. } => "SEQUENCE_ERROR",
        StreamEvent::BufferOverrunDiscarded { .. } => "BUFFER_OVERRUN",
        StreamEvent::InvalidBatchLength { .. } => "INVALID_BATCH_LENGTH",
        StreamEvent::BatchRemainder { .. } => "BATCH_REMAINDER",
        StreamEvent::SessionEnded { .. } => "SESSION_END",
    }
}

/// Uppercase space-separated hex, `BYTES_PER_LINE` bytes per line
pub fn hex_lines(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / BYTES_PER_LINE + 1);
    for line in bytes.chunks(BYTES_PER_LINE) {
        for (i, b) in line.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{b:02X}");
        }
        out.push('\n');
    }
    out
}

/// Sink writing the hex dump log
///
/// Layout: a `#` comment header, a banner when a session is first seen,
/// then one `[timestamp] LABEL session=… key=value…` line per event followed
/// by the bytes involved.
pub struct HexFileSink {
    name: String,
    out: BufWriter<std::fs::File>,
    sessions: HashMap<SessionId, SessionTally>,
}

impl HexFileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> io::Result<Self> {
        let mut out = BufWriter::new(config.open()?);
        writeln!(out, "# lidar-framer hex dump")?;
        writeln!(out, "# created: {}", Local::now().to_rfc3339())?;
        writeln!(
            out,
            "# bytes as uppercase hex, {BYTES_PER_LINE} per line; one block per event"
        )?;
        out.flush()?;

        Ok(Self {
            name: name.into(),
            out,
            sessions: HashMap::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params)?)
    }

    fn write_event(&mut self, event: &SessionEvent) -> io::Result<()> {
        let session = &event.session_id;
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        if !self.sessions.contains_key(session) {
            writeln!(self.out, "\n=== SESSION START session={session} [{ts}] ===")?;
            self.sessions.insert(session.clone(), SessionTally::default());
        }

        let tally = self.sessions.entry(session.clone()).or_default();
        match &event.event {
            StreamEvent::FrameComplete { .. } => tally.frames_complete += 1,
            StreamEvent::SessionEnded { .. } => {}
            _ => tally.anomalies += 1,
        }

        let label = label(&event.event);
        match &event.event {
            StreamEvent::FrameComplete { frame } => {
                writeln!(
                    self.out,
                    "[{ts}] {label} session={session} index={} packets={} bytes={}",
                    frame.index,
                    frame.len(),
                    frame.byte_len()
                )?;
                self.write_packets(&frame.packets)?;
            }
            StreamEvent::FrameIncomplete { partial_frame } => {
                writeln!(
                    self.out,
                    "[{ts}] {label} session={session} index={} packets={} sequences={:?}",
                    partial_frame.index,
                    partial_frame.len(),
                    partial_frame.sequences()
                )?;
                self.write_packets(&partial_frame.packets)?;
            }
            StreamEvent::SequenceError {
                expected,
                got,
                partial_frame,
            } => {
                writeln!(
                    self.out,
                    "[{ts}] {label} session={session} index={} expected={expected} got={got}",
                    partial_frame.index
                )?;
                self.write_packets(&partial_frame.packets)?;
            }
            StreamEvent::PacketInvalid { reason, raw_bytes } => {
                writeln!(
                    self.out,
                    "[{ts}] {label} session={session} reason={} detail=\"{reason}\" len={}",
                    reason.as_str(),
                    raw_bytes.len()
                )?;
                self.out.write_all(hex_lines(raw_bytes).as_bytes())?;
            }
            StreamEvent::OrphanPacket { packet } => {
                writeln!(
                    self.out,
                    "[{ts}] {label} session={session} seq={}",
                    packet.sequence
                )?;
                self.out.write_all(hex_lines(packet.raw()).as_bytes())?;
            }
            StreamEvent::ReservedMismatch { sequence, found } => writeln!(
                self.out,
                "[{ts}] {label} session={session} seq={sequence} found={found:02X}"
            )?,
            StreamEvent::BufferOverrunDiscarded { dropped_bytes } => writeln!(
                self.out,
                "[{ts}] {label} session={session} dropped_bytes={dropped_bytes}"
            )?,
            StreamEvent::InvalidBatchLength { declared } => writeln!(
                self.out,
                "[{ts}] {label} session={session} declared={declared}"
            )?,
            StreamEvent::BatchRemainder { unconsumed } => writeln!(
                self.out,
                "[{ts}] {label} session={session} unconsumed={unconsumed}"
            )?,
            StreamEvent::SessionEnded { unconsumed_bytes } => {
                let tally = self.sessions.remove(session).unwrap_or_default();
                writeln!(
                    self.out,
                    "[{ts}] {label} session={session} unconsumed_bytes={unconsumed_bytes} frames_complete={} anomalies={}",
                    tally.frames_complete, tally.anomalies
                )?;
                writeln!(self.out, "=== SESSION END session={session} ===")?;
            }
        }
        Ok(())
    }

    fn write_packets(&mut self, packets: &[Packet]) -> io::Result<()> {
        for (i, packet) in packets.iter().enumerate() {
            writeln!(self.out, "Packet {i} seq={}:", packet.sequence)?;
            self.out.write_all(hex_lines(packet.raw()).as_bytes())?;
        }
        Ok(())
    }

    fn sink_error(&self, e: io::Error) -> ContractError {
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl EventSink for HexFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "hex_file_sink_write",
        skip(self, event),
        fields(sink = %self.name, kind = event.event.kind())
    )]
    async fn write(&mut self, event: &SessionEvent) -> Result<(), ContractError> {
        self.write_event(event).map_err(|e| self.sink_error(e))?;
        // session boundaries hit the disk right away
        if matches!(event.event, StreamEvent::SessionEnded { .. }) {
            self.out.flush().map_err(|e| self.sink_error(e))?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        self.out.flush().map_err(|e| self.sink_error(e))
    }

    #[instrument(name = "hex_file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.out.flush().map_err(|e| self.sink_error(e))?;
        debug!(sink = %self.name, open_sessions = self.sessions.len(), "HexFileSink closed");
        Ok(())
    }
}
