//! Output formatting for task results

use serde::{Deserialize, Serialize};

use crate::domain::Value;
use crate::runner::DispatchError;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
    verbose: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Prints a task's return value; `None` prints nothing in text mode
    pub fn result(&self, task: &str, value: &Value) {
        match self.format {
            OutputFormat::Text => {
                if !value.is_none() {
                    println!("{}", value);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "task": task,
                        "result": value
                    })
                );
            }
        }
    }

    /// Reports a dispatch failure and returns the exit status
    ///
    /// Text mode renders usage errors the way a command-line tool does;
    /// JSON mode emits one object on stderr. Help always goes to stdout.
    pub fn failure(&self, error: &DispatchError) -> i32 {
        match (self.format, error) {
            (OutputFormat::Json, DispatchError::Help(_)) | (OutputFormat::Text, _) => error.report(),
            (OutputFormat::Json, _) => {
                let usage = error.context().map(|c| c.usage.as_str());
                let message = match error {
                    DispatchError::Task { task, source } => format!("task {} failed: {:#}", task, source),
                    other => other.to_string(),
                };
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "success": false,
                        "error": message,
                        "usage": usage,
                        "exit_code": error.exit_code()
                    })
                );
                error.exit_code()
            }
        }
    }

    /// Prints a verbose debug message (only when verbose is set)
    pub fn verbose(&self, message: &str) {
        if self.verbose {
            eprintln!("[verbose] {}", message);
        }
    }

    /// Prints a verbose debug message with context (only when verbose is set)
    pub fn verbose_ctx(&self, context: &str, message: &str) {
        if self.verbose {
            eprintln!("[verbose:{}] {}", context, message);
        }
    }
}
