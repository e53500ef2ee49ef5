use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{NormalizeError, Result};
use crate::pipeline::normalize::DuplicatePolicy;

/// Effective settings for a normalization run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub encoding: String,
    pub sqlite_path: Option<PathBuf>,
    pub duplicate_policy: DuplicatePolicy,
    pub log_dir: PathBuf,
}

/// Shape of `superstore.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub input: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub encoding: Option<String>,
    pub sqlite_path: Option<PathBuf>,
    pub duplicate_policy: Option<DuplicatePolicy>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from(constants::DEFAULT_INPUT),
            output_dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
            encoding: constants::DEFAULT_ENCODING.to_string(),
            sqlite_path: None,
            duplicate_policy: DuplicatePolicy::Warn,
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    /// Defaults, then the config file, then `SUPERSTORE_*` environment variables (`.env` included).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let (config_path, explicit) = match env("SUPERSTORE_CONFIG") {
            Some(path) => (PathBuf::from(path), true),
            None => (PathBuf::from(constants::DEFAULT_CONFIG_FILE), false),
        };
        let file = if explicit || config_path.exists() {
            Some(Self::read_file(&config_path)?)
        } else {
            None
        };

        Self::resolve(file, env)
    }

    pub fn read_file(path: &Path) -> Result<FileConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            NormalizeError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let file: FileConfig = toml::from_str(&content)?;
        Ok(file)
    }

    /// Layer an optional file config and an environment lookup over the defaults
    pub fn resolve(file: Option<FileConfig>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(file) = file {
            if let Some(v) = file.input {
                config.input = v;
            }
            if let Some(v) = file.output_dir {
                config.output_dir = v;
            }
            if let Some(v) = file.encoding {
                config.encoding = v;
            }
            if file.sqlite_path.is_some() {
                config.sqlite_path = file.sqlite_path;
            }
            if let Some(v) = file.duplicate_policy {
                config.duplicate_policy = v;
            }
            if let Some(v) = file.log_dir {
                config.log_dir = v;
            }
        }

        if let Some(v) = env("SUPERSTORE_INPUT") {
            config.input = PathBuf::from(v);
        }
        if let Some(v) = env("SUPERSTORE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env("SUPERSTORE_ENCODING") {
            config.encoding = v;
        }
        if let Some(v) = env("SUPERSTORE_SQLITE_PATH") {
            config.sqlite_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("SUPERSTORE_DUPLICATE_POLICY") {
            config.duplicate_policy = v.parse()?;
        }
        if let Some(v) = env("SUPERSTORE_LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }

        Ok(config)
    }
}
