use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use superstore_normalizer::app::normalize_use_case::NormalizeUseCase;
use superstore_normalizer::app::ports::TableSink;
use superstore_normalizer::config::Config;
use superstore_normalizer::infra::{CsvRecordSource, CsvTableSink, SqliteStore};
use superstore_normalizer::logging;

#[derive(Parser)]
#[command(name = "superstore")]
#[command(about = "Normalize the Superstore sales export into related tables")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the flat export into the seven related tables
    Normalize {
        /// Input CSV file
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory receiving the seven table files
        #[arg(long)]
        output: Option<PathBuf>,
        /// Text encoding of the input (e.g. windows-1252, utf-8)
        #[arg(long)]
        encoding: Option<String>,
        /// Also load the tables into this SQLite database
        #[arg(long)]
        sqlite: Option<PathBuf>,
        /// What to do with conflicting duplicate keys: warn or reject
        #[arg(long)]
        on_duplicate: Option<String>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print headline sales figures from a loaded SQLite database
    Overview {
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },
    /// Print the effective configuration
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;
    let _log_guard = logging::init_logging(&config.log_dir);

    match cli.command {
        Commands::Normalize {
            input,
            output,
            encoding,
            sqlite,
            on_duplicate,
            json,
        } => {
            if let Some(v) = input {
                config.input = v;
            }
            if let Some(v) = output {
                config.output_dir = v;
            }
            if let Some(v) = encoding {
                config.encoding = v;
            }
            if sqlite.is_some() {
                config.sqlite_path = sqlite;
            }
            if let Some(v) = on_duplicate {
                config.duplicate_policy = v.parse()?;
            }
            run_normalize(&config, json)?;
        }
        Commands::Overview { sqlite } => {
            let path = sqlite
                .or(config.sqlite_path)
                .context("no SQLite database given (use --sqlite or SUPERSTORE_SQLITE_PATH)")?;
            let overview = SqliteStore::new(&path)
                .sales_overview()
                .with_context(|| format!("querying {}", path.display()))?;
            println!("Total sales:        {:.2}", overview.total_sales);
            println!("Total profit:       {:.2}", overview.total_profit);
            println!("Total orders:       {}", overview.total_orders);
            match overview.average_sale {
                Some(avg) => println!("Average sale value: {:.2}", avg),
                None => println!("Average sale value: n/a"),
            }
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn run_normalize(config: &Config, json: bool) -> Result<()> {
    let source = CsvRecordSource::new(&config.input, &config.encoding)?;
    info!("Reading {} as {}", config.input.display(), source.encoding_name());

    let mut sinks: Vec<Box<dyn TableSink>> = vec![Box::new(CsvTableSink::new(&config.output_dir))];
    if let Some(db) = &config.sqlite_path {
        sinks.push(Box::new(SqliteStore::new(db)));
    }

    let use_case = NormalizeUseCase::new(Box::new(source), sinks, config.duplicate_policy);
    let summary = use_case
        .run()
        .with_context(|| format!("normalizing {}", config.input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Normalized {} rows from {}", summary.input_rows, summary.source);
    for table in &summary.tables {
        println!("   {:<15} {:>6} rows", table.table, table.rows);
    }
    if summary.key_conflicts > 0 {
        println!("   {} conflicting duplicate keys kept first occurrence", summary.key_conflicts);
    }
    println!("Tables written to '{}'", config.output_dir.display());
    if let Some(db) = &config.sqlite_path {
        println!("Tables loaded into '{}'", db.display());
    }
    Ok(())
}
