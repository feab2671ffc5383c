//! Configuration file parsing for `intcode.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `<config dir>/intcode/intcode.toml` if no project-level file is found.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "intcode.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct IntcodeConfig {
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LogSection {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct LimitsSection {
    /// Per-VM instruction budget. Unlimited when absent.
    pub max_instructions: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct OutputSection {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One value per line.
    #[default]
    Lines,
    /// All values on one comma-separated line.
    Csv,
    /// A JSON document.
    Json,
}

impl IntcodeConfig {
    /// Load config from `intcode.toml`, searching current dir then parents,
    /// then the user config dir. Returns `Default` when no file is found; a
    /// file that exists but cannot be read or parsed is an error.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::find_and_load()?
            .map(|(_path, cfg)| cfg)
            .unwrap_or_default())
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a TOML string directly.
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    fn find_and_load() -> Result<Option<(PathBuf, Self)>, ConfigError> {
        if let Ok(start) = std::env::current_dir() {
            if let Some(found) = Self::search_from(&start)? {
                return Ok(Some(found));
            }
        }
        match dirs::config_dir() {
            Some(dir) => Self::load_if_exists(dir.join("intcode").join(CONFIG_FILE)),
            None => Ok(None),
        }
    }

    /// Search `start` and its ancestors for `intcode.toml`.
    ///
    /// The nearest file wins. `Ok(None)` means no file was found.
    pub fn search_from(start: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        for dir in start.ancestors() {
            if let Some(found) = Self::load_if_exists(dir.join(CONFIG_FILE))? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn load_if_exists(path: PathBuf) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        if !path.is_file() {
            return Ok(None);
        }
        let cfg = Self::load_from(&path)?;
        Ok(Some((path, cfg)))
    }

    /// Generate a default `intcode.toml` template.
    pub fn default_template() -> &'static str {
        r#"[log]
level = "warn"

[limits]
# max_instructions = 10000000

[output]
format = "lines"
"#
    }
}
