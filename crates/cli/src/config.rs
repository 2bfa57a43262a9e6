//! `statute.toml` configuration.
//!
//! ```toml
//! rules_dir = "rules"
//! reference_date = "2025-01-01"
//! log = "info"
//!
//! [remote]
//! RvIG = "http://localhost:8081"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use statute_core::format_date;

use crate::error::{CliError, Result};

pub const DEFAULT_PATH: &str = "statute.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned recursively for rule JSON files
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,

    /// Reference date used when `--date` is absent; defaults to today
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<String>,

    /// Log filter when `RUST_LOG` and `--log` are absent
    #[serde(default = "default_log")]
    pub log: String,

    /// Service name to base URL of a remote engine
    #[serde(default)]
    pub remote: BTreeMap<String, String>,
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("rules")
}

fn default_log() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rules_dir: default_rules_dir(),
            reference_date: None,
            log: default_log(),
            remote: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load an explicit config file, or `statute.toml` in the working
    /// directory if present. Only an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_PATH);
                if !default.exists() {
                    return Ok(Config::default());
                }
                default
            }
        };
        let contents = fs::read_to_string(&path).map_err(|source| CliError::Io {
            path: path.clone(),
            source,
        })?;
        Config::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if let Some(date) = &config.reference_date {
            if statute_core::parse_date(date).is_none() {
                return Err(CliError::Config(format!("invalid reference_date '{}'", date)));
            }
        }
        Ok(config)
    }

    pub fn reference_date(&self) -> String {
        self.reference_date
            .clone()
            .unwrap_or_else(|| format_date(time::OffsetDateTime::now_utc().date()))
    }
}
