use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::app::ports::{RecordSource, RunContext, TableSink};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::normalize::{normalize, DuplicatePolicy, NormalizedTables};

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: usize,
}

/// Result of a complete normalization run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: String,
    pub input_rows: usize,
    pub tables: Vec<TableCount>,
    pub key_conflicts: usize,
    pub sinks: Vec<&'static str>,
    pub duration_ms: u64,
}

/// Use case for turning one flat export into the seven related tables
pub struct NormalizeUseCase {
    source: Box<dyn RecordSource>,
    sinks: Vec<Box<dyn TableSink>>,
    policy: DuplicatePolicy,
}

impl NormalizeUseCase {
    pub fn new(
        source: Box<dyn RecordSource>,
        sinks: Vec<Box<dyn TableSink>>,
        policy: DuplicatePolicy,
    ) -> Self {
        Self { source, sinks, policy }
    }

    /// Load, normalize, verify, then hand the tables to each sink in order.
    ///
    /// Nothing reaches a sink unless loading, normalization and the
    /// integrity check all succeed.
    #[instrument(skip(self), fields(source = %self.source.describe(), policy = %self.policy))]
    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let result = self.run_inner(started);
        let status = if result.is_ok() { "success" } else { "failure" };
        metrics::run::finished(status, started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            error!("Normalization run failed: {}", e);
        }
        result
    }

    fn run_inner(&self, started: Instant) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!("Loading input from {}", self.source.describe());
        let input = self.source.load()?;
        metrics::run::input_loaded(input.records.len());
        info!("Loaded {} input rows", input.records.len());

        let tables = normalize(&input.records, self.policy)?;
        tables.verify_integrity()?;

        let run = RunContext {
            run_id,
            started_at,
            source: self.source.describe(),
            input_sha256: input.sha256,
            input_rows: input.records.len(),
        };
        self.write_all(&tables, &run)?;

        let summary = RunSummary {
            run_id,
            source: run.source.clone(),
            input_rows: run.input_rows,
            tables: tables
                .row_counts()
                .into_iter()
                .map(|(table, rows)| TableCount { table, rows })
                .collect(),
            key_conflicts: tables.duplicates.len(),
            sinks: self.sinks.iter().map(|s| s.name()).collect(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            run_id = %summary.run_id,
            key_conflicts = summary.key_conflicts,
            "Normalization complete"
        );
        Ok(summary)
    }

    fn write_all(&self, tables: &NormalizedTables, run: &RunContext) -> Result<()> {
        for sink in &self.sinks {
            let t_sink = Instant::now();
            info!("Writing tables to {} sink", sink.name());
            sink.write_tables(tables, run)?;
            metrics::sink::write_duration(sink.name(), t_sink.elapsed().as_secs_f64());
            for (table, rows) in tables.row_counts() {
                metrics::sink::rows_written(sink.name(), table, rows);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::LoadedInput;
    use crate::domain::RawRecord;
    use crate::error::NormalizeError;
    use crate::pipeline::normalize::test_support::record;
    use std::sync::{Arc, Mutex};

    struct StaticSource {
        records: Vec<RawRecord>,
    }

    impl RecordSource for StaticSource {
        fn describe(&self) -> String {
            "static".to_string()
        }

        fn load(&self) -> Result<LoadedInput> {
            Ok(LoadedInput {
                records: self.records.clone(),
                sha256: "00".to_string(),
            })
        }
    }

    struct FailingSource;

    impl RecordSource for FailingSource {
        fn describe(&self) -> String {
            "missing.csv".to_string()
        }

        fn load(&self) -> Result<LoadedInput> {
            Err(NormalizeError::InputNotFound {
                path: "missing.csv".into(),
            })
        }
    }

    struct MockSink {
        pub written: Arc<Mutex<Vec<NormalizedTables>>>,
    }

    impl TableSink for MockSink {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn write_tables(&self, tables: &NormalizedTables, _run: &RunContext) -> Result<()> {
            self.written.lock().unwrap().push(tables.clone());
            Ok(())
        }
    }

    fn mock_sink() -> (Box<dyn TableSink>, Arc<Mutex<Vec<NormalizedTables>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (Box::new(MockSink { written: written.clone() }), written)
    }

    #[test]
    fn test_run_writes_tables_and_summarises() {
        let (sink, written) = mock_sink();
        let source = StaticSource {
            records: vec![record("CA-1", "P-1"), record("CA-1", "P-2"), record("CA-2", "P-1")],
        };
        let use_case = NormalizeUseCase::new(Box::new(source), vec![sink], DuplicatePolicy::Warn);

        let summary = use_case.run().unwrap();

        assert_eq!(summary.input_rows, 3);
        assert_eq!(summary.sinks, vec!["mock"]);
        let counts: Vec<(&str, usize)> = summary.tables.iter().map(|t| (t.table, t.rows)).collect();
        assert_eq!(
            counts,
            vec![
                ("customers", 1),
                ("locations", 1),
                ("categories", 1),
                ("sub_categories", 1),
                ("products", 2),
                ("orders", 2),
                ("order_details", 3),
            ]
        );
        assert_eq!(written.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_load_failure_reaches_no_sink() {
        let (sink, written) = mock_sink();
        let use_case =
            NormalizeUseCase::new(Box::new(FailingSource), vec![sink], DuplicatePolicy::Warn);

        let err = use_case.run().unwrap_err();

        assert!(matches!(err, NormalizeError::InputNotFound { .. }));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_duplicate_reaches_no_sink() {
        let (sink, written) = mock_sink();
        let source = StaticSource {
            records: vec![
                record("CA-1", "P-1"),
                RawRecord {
                    product_name: "Renamed Bookcase".to_string(),
                    ..record("CA-2", "P-1")
                },
            ],
        };
        let use_case = NormalizeUseCase::new(Box::new(source), vec![sink], DuplicatePolicy::Reject);

        let err = use_case.run().unwrap_err();

        assert!(matches!(err, NormalizeError::PartialDuplicate { table: "products", .. }));
        assert!(written.lock().unwrap().is_empty());
    }
}
