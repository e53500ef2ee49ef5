//! Metrics for normalization runs.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding process installs a recorder.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RunsTotal,
    RunDuration,
    InputRows,
    KeyConflicts,
    RowsWritten,
    SinkWriteDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::RunsTotal => "superstore_runs_total",
            MetricName::RunDuration => "superstore_run_duration_seconds",
            MetricName::InputRows => "superstore_input_rows",
            MetricName::KeyConflicts => "superstore_key_conflicts_total",
            MetricName::RowsWritten => "superstore_rows_written_total",
            MetricName::SinkWriteDuration => "superstore_sink_write_duration_seconds",
        };
        write!(f, "{name}")
    }
}

impl MetricName {
    pub fn as_str(&self) -> String {
        self.to_string()
    }
}

pub mod run {
    use super::MetricName;

    pub fn finished(status: &'static str, duration_secs: f64) {
        ::metrics::counter!(MetricName::RunsTotal.as_str(), "status" => status).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(duration_secs);
    }

    pub fn input_loaded(rows: usize) {
        ::metrics::histogram!(MetricName::InputRows.as_str()).record(rows as f64);
    }
}

pub mod normalize {
    use super::MetricName;

    /// Record a natural key that was kept first-wins despite conflicting attributes
    pub fn key_conflict(table: &'static str) {
        ::metrics::counter!(MetricName::KeyConflicts.as_str(), "table" => table).increment(1);
    }
}

pub mod sink {
    use super::MetricName;

    pub fn rows_written(sink: &'static str, table: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::RowsWritten.as_str(), "sink" => sink, "table" => table)
            .increment(rows as u64);
    }

    pub fn write_duration(sink: &'static str, duration_secs: f64) {
        ::metrics::histogram!(MetricName::SinkWriteDuration.as_str(), "sink" => sink)
            .record(duration_secs);
    }
}
