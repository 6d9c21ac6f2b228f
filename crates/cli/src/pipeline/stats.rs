//! Pipeline statistics.

use std::time::Duration;

use dispatcher::SinkMetricsSnapshot;
use ingestion::MetricsSnapshot;
use observability::{EventStatsAggregator, StatsReport};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Event statistics (packets, frames, rates)
    pub report: StatsReport,

    /// Transport counters at the end of the run
    pub ingestion: MetricsSnapshot,

    /// Per-sink delivery counters
    pub sinks: Vec<(String, SinkMetricsSnapshot)>,

    /// Total duration of the run
    pub duration: Duration,
}

impl PipelineStats {
    pub fn new(
        aggregator: &EventStatsAggregator,
        ingestion: MetricsSnapshot,
        sinks: Vec<(String, SinkMetricsSnapshot)>,
        duration: Duration,
    ) -> Self {
        Self {
            report: aggregator.summary_over(duration),
            ingestion,
            sinks,
            duration,
        }
    }

    pub fn frames_complete(&self) -> u64 {
        self.report.frames_complete
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        print!("{}", self.report);

        println!("\nTransport");
        println!("   ├─ Sessions: {}", self.ingestion.sessions_started);
        println!("   ├─ Chunks read: {}", self.ingestion.chunks_read);
        println!("   ├─ Events published: {}", self.ingestion.events_published);
        println!("   └─ Events dropped (channel full): {}", self.ingestion.events_dropped);

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (i, (name, snapshot)) in self.sinks.iter().enumerate() {
                let branch = if i + 1 == self.sinks.len() { "└─" } else { "├─" };
                println!("   {branch} {name}: {snapshot}");
            }
        }

        println!();
    }
}
