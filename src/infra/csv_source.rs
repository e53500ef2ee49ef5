use encoding_rs::Encoding;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::app::ports::{LoadedInput, RecordSource};
use crate::domain::RawRecord;
use crate::error::{NormalizeError, Result};

/// Header names the export must carry; any other columns are ignored
pub const REQUIRED_COLUMNS: [&str; 19] = [
    "Order ID",
    "Order Date",
    "Ship Date",
    "Ship Mode",
    "Customer ID",
    "Customer Name",
    "Segment",
    "City",
    "State",
    "Postal Code",
    "Region",
    "Product ID",
    "Category",
    "Sub-Category",
    "Product Name",
    "Sales",
    "Quantity",
    "Discount",
    "Profit",
];

/// Reads the flat export from a CSV file in a declared text encoding
pub struct CsvRecordSource {
    path: PathBuf,
    encoding: &'static Encoding,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>, encoding_label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(encoding_label.trim().as_bytes())
            .ok_or_else(|| NormalizeError::UnknownEncoding(encoding_label.to_string()))?;
        Ok(Self {
            path: path.into(),
            encoding,
        })
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    fn unreadable(&self, reason: impl Into<String>) -> NormalizeError {
        NormalizeError::InputUnreadable {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => NormalizeError::InputNotFound {
                path: self.path.clone(),
            },
            _ => self.unreadable(e.to_string()),
        })
    }

    /// Decode the whole file; a byte-order mark takes precedence over the declared encoding.
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let (text, used, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            return Err(self.unreadable(format!("input is not valid {}", used.name())));
        }
        debug!(encoding = used.name(), "Decoded input");
        Ok(text.into_owned())
    }

    fn parse(&self, text: &str) -> Result<Vec<RawRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(text.as_bytes());

        let headers = reader.headers().map_err(|e| self.unreadable(e.to_string()))?.clone();
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|h| h == *column))
            .collect();
        if !missing.is_empty() {
            let reason = format!("missing required columns: {}", missing.join(", "));
            return Err(self.unreadable(reason));
        }

        let mut records = Vec::new();
        for row in reader.deserialize::<RawRecord>() {
            let record = row.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                self.unreadable(format!("line {line}: {e}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl RecordSource for CsvRecordSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display(), encoding = self.encoding.name()))]
    fn load(&self) -> Result<LoadedInput> {
        let bytes = self.read_bytes()?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let text = self.decode(&bytes)?;
        let records = self.parse(&text)?;
        Ok(LoadedInput { records, sha256 })
    }
}

/// Convenience for callers that only need the records
pub fn read_records(path: &Path, encoding_label: &str) -> Result<Vec<RawRecord>> {
    Ok(CsvRecordSource::new(path, encoding_label)?.load()?.records)
}
