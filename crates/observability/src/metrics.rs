//! Framer 指标收集模块
//!
//! 基于 StreamEvent 收集和统计分帧引擎的运行指标。

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use contracts::StreamEvent;
use metrics::{counter, gauge, histogram};

/// 从 StreamEvent 记录指标
///
/// 每个会话事件发布时调用一次。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_event;
///
/// for event in decoder.on_bytes(&chunk) {
///     record_event(&event);
///     // ...
/// }
/// ```
pub fn record_event(event: &StreamEvent) {
    counter!("lidar_framer_events_total", "kind" => event.kind()).increment(1);

    match event {
        StreamEvent::FrameComplete { frame } => {
            histogram!("lidar_framer_frame_bytes").record(frame.byte_len() as f64);
        }
        StreamEvent::FrameIncomplete { partial_frame }
        | StreamEvent::SequenceError { partial_frame, .. } => {
            histogram!("lidar_framer_partial_frame_packets").record(partial_frame.len() as f64);
        }
        StreamEvent::BufferOverrunDiscarded { dropped_bytes } => {
            counter!("lidar_framer_overrun_bytes_total").increment(*dropped_bytes as u64);
        }
        _ => {}
    }
}

/// 记录接收字节数
pub fn record_bytes_received(bytes: usize) {
    counter!("lidar_framer_bytes_received_total").increment(bytes as u64);
}

/// 会话开始
pub fn record_session_opened() {
    gauge!("lidar_framer_sessions_active").increment(1.0);
    counter!("lidar_framer_sessions_total").increment(1);
}

/// 会话结束
pub fn record_session_closed() {
    gauge!("lidar_framer_sessions_active").decrement(1.0);
}

/// 记录估计丢包数
pub fn record_estimated_loss(lost: u64) {
    if lost > 0 {
        counter!("lidar_framer_estimated_lost_packets_total").increment(lost);
    }
}

/// 记录事件分发
pub fn record_event_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "lidar_framer_events_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 事件统计聚合器
///
/// 在内存中聚合事件计数，便于周期输出摘要。
#[derive(Debug, Clone)]
pub struct EventStatsAggregator {
    started: Instant,

    /// 各事件类型计数
    pub kind_counts: BTreeMap<&'static str, u64>,

    /// 通过校验的包数 (按帧关闭时计入)
    pub packets_valid: u64,

    /// 被拒绝的包数
    pub packets_invalid: u64,

    pub frames_complete: u64,
    pub frames_incomplete: u64,
    pub sequence_errors: u64,

    /// 接收字节总数
    pub bytes_received: u64,

    /// 估计丢包数
    pub estimated_lost: u64,

    /// 已结束会话数
    pub sessions_ended: u64,

    /// 不完整帧的成员数统计
    pub partial_frame_stats: RunningStats,
}

impl Default for EventStatsAggregator {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            kind_counts: BTreeMap::new(),
            packets_valid: 0,
            packets_invalid: 0,
            frames_complete: 0,
            frames_incomplete: 0,
            sequence_errors: 0,
            bytes_received: 0,
            estimated_lost: 0,
            sessions_ended: 0,
            partial_frame_stats: RunningStats::default(),
        }
    }
}

impl EventStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, event: &StreamEvent) {
        *self.kind_counts.entry(event.kind()).or_insert(0) += 1;

        match event {
            StreamEvent::PacketInvalid { .. } => self.packets_invalid += 1,
            StreamEvent::OrphanPacket { .. } => self.packets_valid += 1,
            StreamEvent::FrameComplete { frame } => {
                self.frames_complete += 1;
                self.packets_valid += frame.len() as u64;
            }
            StreamEvent::FrameIncomplete { partial_frame } => {
                self.frames_incomplete += 1;
                self.packets_valid += partial_frame.len() as u64;
                self.partial_frame_stats.push(partial_frame.len() as f64);
            }
            StreamEvent::SequenceError { partial_frame, .. } => {
                self.sequence_errors += 1;
                // the out-of-order packet itself passed validation
                self.packets_valid += partial_frame.len() as u64 + 1;
                self.partial_frame_stats.push(partial_frame.len() as f64);
            }
            StreamEvent::SessionEnded { .. } => self.sessions_ended += 1,
            _ => {}
        }
    }

    /// 记录接收字节数
    pub fn record_bytes(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    /// 记录估计丢包数
    pub fn record_loss(&mut self, lost: u64) {
        self.estimated_lost += lost;
    }

    /// 某类事件的计数
    pub fn count(&self, kind: &str) -> u64 {
        self.kind_counts.get(kind).copied().unwrap_or(0)
    }

    /// 生成摘要报告 (以创建时刻为起点)
    pub fn summary(&self) -> StatsReport {
        self.summary_over(self.started.elapsed())
    }

    /// 以给定时长生成摘要报告
    pub fn summary_over(&self, elapsed: Duration) -> StatsReport {
        let secs = elapsed.as_secs_f64();
        let packets_total = self.packets_valid + self.packets_invalid;
        let frames_total = self.frames_complete + self.frames_incomplete + self.sequence_errors;

        StatsReport {
            elapsed,
            kind_counts: self.kind_counts.clone(),
            packets_valid: self.packets_valid,
            packets_invalid: self.packets_invalid,
            frames_complete: self.frames_complete,
            frames_incomplete: self.frames_incomplete,
            sequence_errors: self.sequence_errors,
            bytes_received: self.bytes_received,
            estimated_lost: self.estimated_lost,
            sessions_ended: self.sessions_ended,
            packet_error_rate: percent(self.packets_invalid, packets_total),
            frame_error_rate: percent(self.frames_incomplete + self.sequence_errors, frames_total),
            frames_per_sec: rate(self.frames_complete as f64, secs),
            throughput_bps: rate(self.bytes_received as f64, secs),
            partial_frame_size: StatsSummary::from(&self.partial_frame_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

fn rate(amount: f64, secs: f64) -> f64 {
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

/// 统计报告
#[derive(Debug, Clone, Default)]
pub struct StatsReport {
    pub elapsed: Duration,
    pub kind_counts: BTreeMap<&'static str, u64>,
    pub packets_valid: u64,
    pub packets_invalid: u64,
    pub frames_complete: u64,
    pub frames_incomplete: u64,
    pub sequence_errors: u64,
    pub bytes_received: u64,
    pub estimated_lost: u64,
    pub sessions_ended: u64,
    /// 百分比
    pub packet_error_rate: f64,
    /// 百分比
    pub frame_error_rate: f64,
    pub frames_per_sec: f64,
    /// 字节/秒
    pub throughput_bps: f64,
    pub partial_frame_size: StatsSummary,
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Framer Statistics ===")?;
        writeln!(f, "Elapsed: {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "Bytes received: {} ({:.1} KB/s)",
            self.bytes_received,
            self.throughput_bps / 1024.0
        )?;
        writeln!(
            f,
            "Packets: {} valid, {} invalid ({:.2}% error)",
            self.packets_valid, self.packets_invalid, self.packet_error_rate
        )?;
        writeln!(
            f,
            "Frames: {} complete, {} incomplete, {} sequence errors ({:.2}% error)",
            self.frames_complete, self.frames_incomplete, self.sequence_errors, self.frame_error_rate
        )?;
        writeln!(f, "Frame rate: {:.2} frames/s", self.frames_per_sec)?;
        writeln!(f, "Estimated lost packets: {}", self.estimated_lost)?;
        writeln!(f, "Partial frame size: {}", self.partial_frame_size)?;
        writeln!(f, "Sessions ended: {}", self.sessions_ended)?;

        if !self.kind_counts.is_empty() {
            writeln!(f, "Event counts:")?;
            for (kind, count) in &self.kind_counts {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
