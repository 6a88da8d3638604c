//! # Command-Line Interface
//!
//! The `taskr` binary: a handful of front-end options, then a task name and
//! its arguments.
//!
//! ```bash
//! taskr run Tokyo Osaka --speed 10
//! taskr --format json fly Tokyo Osaka Nagoya
//! taskr --help
//! ```
//!
//! ## Front-end options
//!
//! Only recognised before the task name:
//! - `--format text|json` (`-f`) - how results and errors are printed
//! - `--verbose` (`-v`) - `[verbose]` diagnostics on stderr
//! - `--help` (`-h`) - top-level help listing the tasks
//!
//! Everything from the first other token on is handed to the
//! [`TaskManager`](crate::runner::TaskManager).

mod output;
pub mod tasks;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

pub use output::{Output, OutputFormat};

use crate::config::Config;
use crate::logging;
use crate::runner::{process_status, DispatchError, TaskManager, USAGE_EXIT_CODE};

#[derive(Parser, Debug)]
#[command(name = "taskr", about = "Declarative task runner")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Print help
    #[arg(long, short = 'h')]
    pub help: bool,

    /// Task name followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Parses the process arguments and runs the selected demo task
pub fn run() -> Result<ExitCode> {
    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print()?;
            return Ok(if e.use_stderr() {
                exit_code(USAGE_EXIT_CODE)
            } else {
                ExitCode::SUCCESS
            });
        }
    };
    if cli.help {
        cli.args.insert(0, "--help".to_string());
    }
    let config = Config::load()?;
    logging::init(config.log.level);

    let output = Output::new(
        cli.format.unwrap_or(config.output.format),
        cli.verbose || config.output.verbose,
    );
    if let Some(path) = &config.project_file {
        output.verbose(&format!("Loaded configuration from {}", path.display()));
    }

    let mut manager = TaskManager::from_config(&config);
    tasks::register(&mut manager)?;
    manager.finalize()?;
    output.verbose(&format!("Registered {}", manager));

    execute(&manager, &output, cli.args, config.propagate_errors)
}

/// Dispatches `args`, printing the result or the failure through `output`
///
/// With `propagate` set, failures other than help requests are returned
/// instead of rendered.
pub fn execute(
    manager: &TaskManager,
    output: &Output,
    args: Vec<String>,
    propagate: bool,
) -> Result<ExitCode> {
    let outcome = manager.parse(args).and_then(|(handle, call_args)| {
        let name = manager
            .task(handle)
            .map(|task| task.name().to_string())
            .unwrap_or_default();
        output.verbose_ctx(
            &name,
            &format!(
                "Calling with {} positional and {} named arguments",
                call_args.positional().len(),
                call_args.named().len()
            ),
        );
        manager.invoke(handle, call_args).map(|value| (name, value))
    });

    match outcome {
        Ok((name, value)) => {
            output.result(&name, &value);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if propagate && !matches!(e, DispatchError::Help(_)) => Err(e.into()),
        Err(e) => Ok(exit_code(output.failure(&e))),
    }
}

/// Converts a dispatch status into a process exit code
pub fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(process_status(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_end_options_stop_at_task_name() {
        let cli = Cli::try_parse_from(["taskr", "-f", "json", "run", "-v", "--speed", "3"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(!cli.verbose);
        assert_eq!(cli.args, vec!["run", "-v", "--speed", "3"]);
    }

    #[test]
    fn help_flags_after_the_task_name_belong_to_the_task() {
        let cli = Cli::try_parse_from(["taskr", "--help"]).unwrap();
        assert!(cli.help);
        assert!(cli.args.is_empty());

        let cli = Cli::try_parse_from(["taskr", "run", "--help"]).unwrap();
        assert!(!cli.help);
        assert_eq!(cli.args, vec!["run", "--help"]);
    }

    #[test]
    fn bad_front_end_option_is_a_usage_error() {
        let err = Cli::try_parse_from(["taskr", "--format", "xml", "run"]).unwrap_err();
        assert!(err.use_stderr());
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn propagated_errors_are_returned() {
        let mut manager = TaskManager::new("taskr");
        tasks::register(&mut manager).unwrap();
        manager.finalize().unwrap();
        let output = Output::new(OutputFormat::Text, false);

        let err = execute(&manager, &output, vec!["run".to_string()], true).unwrap_err();
        assert!(err.downcast_ref::<DispatchError>().is_some());
    }
}
