use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Input file {} could not be read: {reason}", path.display())]
    InputUnreadable { path: PathBuf, reason: String },

    #[error("Unknown text encoding label: {0}")]
    UnknownEncoding(String),

    #[error("Unresolved reference in {table}.{column}: no row for key '{key}'")]
    UnresolvedReference {
        table: &'static str,
        column: &'static str,
        key: String,
    },

    #[error("Ambiguous reference in {table}.{column}: '{key}' matches {candidates:?}")]
    AmbiguousReference {
        table: &'static str,
        column: &'static str,
        key: String,
        candidates: Vec<u32>,
    },

    #[error("Conflicting duplicate of natural key '{key}' in {table}")]
    PartialDuplicate { table: &'static str, key: String },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
