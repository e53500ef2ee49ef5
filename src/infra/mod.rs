// Adapters between the normalizer and the filesystem / database

pub mod csv_sink;
pub mod csv_source;
pub mod sqlite_sink;

pub use csv_sink::CsvTableSink;
pub use csv_source::CsvRecordSource;
pub use sqlite_sink::{SalesOverview, SqliteStore};
