//! Configuration handling for taskr
//!
//! Configuration is read from `taskr.toml` (found by walking up from the
//! working directory) layered over `~/.config/taskr/config.toml` (global).
//! Project values win key by key.
//!
//! ```toml
//! prog = "fab"
//! propagate_errors = false
//!
//! [output]
//! format = "json"
//! verbose = true
//!
//! [log]
//! level = "debug"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::OutputFormat;

/// Project configuration file name
pub const PROJECT_FILE: &str = "taskr.toml";

/// Environment variable overriding the output format
pub const FORMAT_ENV: &str = "TASKR_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// `[output]` section
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Result format (text or json)
    pub format: OutputFormat,

    /// Print `[verbose]` diagnostics
    pub verbose: bool,
}

/// `[log]` section
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

/// One configuration file; every key optional so files can be layered
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub prog: Option<String>,
    pub propagate_errors: Option<bool>,
    pub output: Option<PartialOutput>,
    pub log: Option<PartialLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PartialOutput {
    pub format: Option<OutputFormat>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PartialLog {
    pub level: Option<LogLevel>,
}

/// Effective configuration (global + project + environment)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Program name shown in usage lines
    pub prog: String,

    /// Surface task and usage errors unrendered (embedding and testing)
    pub propagate_errors: bool,

    pub output: OutputConfig,

    pub log: LogConfig,

    /// Project file the configuration was read from, if any
    pub project_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prog: "taskr".to_string(),
            propagate_errors: false,
            output: OutputConfig::default(),
            log: LogConfig::default(),
            project_file: None,
        }
    }
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        Self::load_from(&cwd)
    }

    /// Loads configuration as seen from `start`
    pub fn load_from(start: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(global) = Self::load_global()? {
            config.apply(global);
        }

        if let Some(path) = Self::find_project_file(start) {
            let file = Self::read_file(&path).context("Failed to parse project config")?;
            config.apply(file);
            config.project_file = Some(path);
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "taskr", "taskr").map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<Option<ConfigFile>> {
        let config_path = match Self::global_config_dir() {
            Some(dir) => dir.join("config.toml"),
            None => return Ok(None),
        };

        if !config_path.exists() {
            return Ok(None);
        }

        Self::read_file(&config_path)
            .context("Failed to parse global config")
            .map(Some)
    }

    /// Reads and parses one configuration file
    pub fn read_file(path: &Path) -> Result<ConfigFile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let file: ConfigFile = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if matches!(&file.prog, Some(prog) if prog.trim().is_empty()) {
            return Err(ConfigError::Invalid("prog must not be empty".to_string()).into());
        }
        Ok(file)
    }

    /// Finds `taskr.toml` in `start` or one of its ancestors
    pub fn find_project_file(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            let candidate = current.join(PROJECT_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Layers `file` over the current values
    pub fn apply(&mut self, file: ConfigFile) {
        if let Some(prog) = file.prog {
            self.prog = prog;
        }
        if let Some(propagate) = file.propagate_errors {
            self.propagate_errors = propagate;
        }
        if let Some(output) = file.output {
            if let Some(format) = output.format {
                self.output.format = format;
            }
            if let Some(verbose) = output.verbose {
                self.output.verbose = verbose;
            }
        }
        if let Some(level) = file.log.and_then(|log| log.level) {
            self.log.level = level;
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(format) = std::env::var(FORMAT_ENV) {
            self.output.format = match format.to_ascii_lowercase().as_str() {
                "text" => OutputFormat::Text,
                "json" => OutputFormat::Json,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be 'text' or 'json', got '{}'",
                        FORMAT_ENV, other
                    ))
                    .into())
                }
            };
        }
        Ok(())
    }
}
