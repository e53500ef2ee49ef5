use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::app::ports::{RunContext, TableSink};
use crate::constants::{self, table_file_name};
use crate::error::{NormalizeError, Result};
use crate::pipeline::normalize::NormalizedTables;

#[derive(Debug, Serialize)]
struct TableManifest {
    table: &'static str,
    file: String,
    rows: usize,
}

/// Written next to the tables so a reader can tell which input produced them
#[derive(Debug, Serialize)]
struct Manifest {
    run_id: Uuid,
    generated_at: DateTime<Utc>,
    source: String,
    input_sha256: String,
    input_rows: usize,
    key_conflicts: usize,
    conflicts_per_table: BTreeMap<&'static str, usize>,
    tables: Vec<TableManifest>,
}

/// Writes each table as `<table>.csv` into an output directory.
///
/// Files are staged in a scratch directory first and only moved over the
/// previous output once all of them were written. The previous files are
/// parked while the new ones move in, and put back if any move fails.
pub struct CsvTableSink {
    output_dir: PathBuf,
}

impl CsvTableSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn write_with<R>(&self, tables: &NormalizedTables, run: &RunContext, rename: R) -> Result<()>
    where
        R: Fn(&Path, &Path) -> io::Result<()>,
    {
        if !self.output_dir.exists() {
            info!("Creating output directory {}", self.output_dir.display());
        }
        fs::create_dir_all(&self.output_dir)?;

        let staging = self.output_dir.join(format!(".staging-{}", run.run_id));
        fs::create_dir(&staging)?;

        let mut files: Vec<String> = constants::TABLES.iter().map(|t| table_file_name(t)).collect();
        files.push(constants::MANIFEST_FILE.to_string());

        let backup = self.output_dir.join(format!(".previous-{}", run.run_id));
        let outcome = self
            .stage(&staging, tables, run)
            .and_then(|()| self.publish(&staging, &backup, &files, rename));

        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!("Failed to remove staging directory {}: {}", staging.display(), e);
        }
        outcome?;

        for (table, rows) in tables.row_counts() {
            info!("Created {} ({} rows)", table_file_name(table), rows);
        }
        Ok(())
    }

    fn stage(&self, staging: &Path, tables: &NormalizedTables, run: &RunContext) -> Result<()> {
        let path = |table: &str| staging.join(table_file_name(table));
        write_table(
            &path(constants::CUSTOMERS),
            &constants::CUSTOMER_HEADERS,
            &tables.customers,
        )?;
        write_table(
            &path(constants::LOCATIONS),
            &constants::LOCATION_HEADERS,
            &tables.locations,
        )?;
        write_table(
            &path(constants::CATEGORIES),
            &constants::CATEGORY_HEADERS,
            &tables.categories,
        )?;
        write_table(
            &path(constants::SUB_CATEGORIES),
            &constants::SUB_CATEGORY_HEADERS,
            &tables.sub_categories,
        )?;
        write_table(
            &path(constants::PRODUCTS),
            &constants::PRODUCT_HEADERS,
            &tables.products,
        )?;
        write_table(&path(constants::ORDERS), &constants::ORDER_HEADERS, &tables.orders)?;
        write_table(
            &path(constants::ORDER_DETAILS),
            &constants::ORDER_DETAIL_HEADERS,
            &tables.order_details,
        )?;

        let manifest = Manifest {
            run_id: run.run_id,
            generated_at: run.started_at,
            source: run.source.clone(),
            input_sha256: run.input_sha256.clone(),
            input_rows: run.input_rows,
            key_conflicts: tables.duplicates.len(),
            conflicts_per_table: tables.duplicates.per_table(),
            tables: tables
                .row_counts()
                .into_iter()
                .map(|(table, rows)| TableManifest {
                    table,
                    file: table_file_name(table),
                    rows,
                })
                .collect(),
        };
        let mut writer = BufWriter::new(fs::File::create(staging.join(constants::MANIFEST_FILE))?);
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        writer.flush()?;
        Ok(())
    }

    /// Every staged file must be able to replace its target before any is moved.
    fn check_targets(&self, files: &[String]) -> Result<()> {
        for file in files {
            let target = self.output_dir.join(file);
            if target.is_dir() {
                return Err(NormalizeError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is a directory", target.display()),
                )));
            }
        }
        Ok(())
    }

    fn publish<R>(&self, staging: &Path, backup: &Path, files: &[String], rename: R) -> Result<()>
    where
        R: Fn(&Path, &Path) -> io::Result<()>,
    {
        self.check_targets(files)?;
        fs::create_dir(backup)?;

        // (file, whether a previous version was parked in the backup)
        let mut moved: Vec<(&str, bool)> = Vec::with_capacity(files.len());
        for file in files {
            let target = self.output_dir.join(file);
            let had_previous = target.exists();
            let step = if had_previous {
                rename(&target, &backup.join(file))
            } else {
                Ok(())
            };
            if let Err(e) = step {
                self.roll_back(backup, &moved);
                return Err(e.into());
            }

            moved.push((file.as_str(), had_previous));
            if let Err(e) = rename(&staging.join(file), &target) {
                self.roll_back(backup, &moved);
                return Err(e.into());
            }
        }

        if let Err(e) = fs::remove_dir_all(backup) {
            warn!("Failed to remove backup directory {}: {}", backup.display(), e);
        }
        Ok(())
    }

    /// Remove what this run already published and put the parked files back.
    ///
    /// The backup directory is kept if anything could not be restored.
    fn roll_back(&self, backup: &Path, moved: &[(&str, bool)]) {
        let mut restored = true;
        for (file, had_previous) in moved.iter().rev() {
            let target = self.output_dir.join(file);
            if let Err(e) = fs::remove_file(&target) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partially published {}: {}", target.display(), e);
                }
            }
            if *had_previous {
                if let Err(e) = fs::rename(backup.join(file), &target) {
                    error!("Failed to restore {}: {}", target.display(), e);
                    restored = false;
                }
            }
        }

        if restored {
            if let Err(e) = fs::remove_dir_all(backup) {
                warn!("Failed to remove backup directory {}: {}", backup.display(), e);
            }
        } else {
            error!("Previous output left in {}", backup.display());
        }
    }
}

impl TableSink for CsvTableSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    #[instrument(
        skip(self, tables, run),
        fields(output_dir = %self.output_dir.display(), run_id = %run.run_id)
    )]
    fn write_tables(&self, tables: &NormalizedTables, run: &RunContext) -> Result<()> {
        self.write_with(tables, run, |from, to| fs::rename(from, to))
    }
}

/// Write one table with an explicit header row, so empty tables still carry their columns.
fn write_table<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
