use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::RawRecord;
use crate::error::Result;
use crate::pipeline::normalize::NormalizedTables;

/// The flat input as loaded by a source, before any normalization
#[derive(Clone, Debug)]
pub struct LoadedInput {
    pub records: Vec<RawRecord>,
    /// Hex SHA-256 of the raw input bytes
    pub sha256: String,
}

/// Identity of one normalization run, handed to every sink
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub source: String,
    pub input_sha256: String,
    pub input_rows: usize,
}

pub trait RecordSource: Send + Sync {
    /// Human-readable location of the input, used in logs and the manifest
    fn describe(&self) -> String;
    fn load(&self) -> Result<LoadedInput>;
}

/// Destination for the seven normalized tables.
///
/// A sink either writes every table or leaves its previous output as it was.
pub trait TableSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn write_tables(&self, tables: &NormalizedTables, run: &RunContext) -> Result<()>;
}
