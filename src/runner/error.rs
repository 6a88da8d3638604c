//! Dispatch-time errors
//!
//! User-input errors carry the usage line of the parser that rejected the
//! input so they can be rendered the way a command-line tool reports them.
//! Everything else is either a programming error or a task failure.

use std::fmt;
use thiserror::Error;

use crate::domain::TaskExit;

/// Exit status for argument-resolution failures and programming errors
pub const USAGE_EXIT_CODE: i32 = 1;

/// Maps a status onto the 0..=255 range a process exits with
///
/// Out-of-range codes wrap the way POSIX truncates them; a non-zero code
/// that would wrap to 0 becomes 1 so failure is never reported as success.
pub fn process_status(code: i32) -> u8 {
    let wrapped = (code & 0xff) as u8;
    if code != 0 && wrapped == 0 {
        1
    } else {
        wrapped
    }
}

/// Which parser an error belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageContext {
    /// Program and task, e.g. `taskr run`
    pub prog: String,
    /// Rendered usage line
    pub usage: String,
}

impl UsageContext {
    pub fn new(prog: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            prog: prog.into(),
            usage: usage.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Tasks should be finalized before parsing arguments.")]
    NotFinalized,

    #[error("Mismatched task and task manager.")]
    ForeignHandle,

    #[error("{}", no_task_message(.requested.as_deref(), .available))]
    NoTaskSelected {
        requested: Option<String>,
        available: Vec<String>,
        context: UsageContext,
    },

    #[error("the following arguments are required: {}", .names.join(", "))]
    MissingArguments {
        names: Vec<String>,
        context: UsageContext,
    },

    #[error("{message}")]
    InvalidValue {
        message: String,
        context: UsageContext,
    },

    #[error("unrecognized arguments: {}", quoted(.tokens))]
    UnrecognizedArguments {
        tokens: Vec<String>,
        context: UsageContext,
    },

    #[error("{message}")]
    Usage {
        message: String,
        context: UsageContext,
    },

    /// Help or version output was requested; not a failure
    #[error("help requested")]
    Help(String),

    #[error("task {task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// True for bad command-line input the user can correct
    pub fn is_user_error(&self) -> bool {
        self.context().is_some()
    }

    /// Usage context of a user-input error
    pub fn context(&self) -> Option<&UsageContext> {
        match self {
            DispatchError::NoTaskSelected { context, .. }
            | DispatchError::MissingArguments { context, .. }
            | DispatchError::InvalidValue { context, .. }
            | DispatchError::UnrecognizedArguments { context, .. }
            | DispatchError::Usage { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Process exit status this error maps to
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Help(_) => 0,
            DispatchError::Task { source, .. } => source
                .downcast_ref::<TaskExit>()
                .map(|exit| exit.code)
                .unwrap_or(USAGE_EXIT_CODE),
            _ => USAGE_EXIT_CODE,
        }
    }

    /// Renders the message a command-line user sees
    ///
    /// User-input errors become `usage + "<prog>: error: <message>"`.
    pub fn render(&self) -> String {
        match self {
            DispatchError::Help(text) => text.clone(),
            DispatchError::Task { task, source } => match source.downcast_ref::<TaskExit>() {
                Some(TaskExit { message: None, .. }) => String::new(),
                Some(exit) => format!("{}\n", exit),
                None => format!("Error: task {} failed: {:#}\n", task, source),
            },
            other => match other.context() {
                Some(context) => format!("{}\n{}: error: {}\n", context.usage, context.prog, other),
                None => format!("Error: {}\n", other),
            },
        }
    }

    /// Writes the rendered message (help to stdout, the rest to stderr)
    /// and returns the exit status
    pub fn report(&self) -> i32 {
        let rendered = self.render();
        match self {
            DispatchError::Help(_) => print!("{}", rendered),
            _ => eprint!("{}", rendered),
        }
        self.exit_code()
    }
}

fn quoted(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("'{}'", t))
        .collect::<Vec<_>>()
        .join(", ")
}

fn no_task_message(requested: Option<&str>, available: &[String]) -> String {
    let choices = quoted(available);
    match requested {
        Some(name) => format!("invalid choice: '{}' (choose from {})", name, choices),
        None => format!("cannot find task to execute. (choose from {})", choices),
    }
}

impl fmt::Display for UsageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_status_never_turns_failure_into_success() {
        assert_eq!(process_status(0), 0);
        assert_eq!(process_status(3), 3);
        assert_eq!(process_status(255), 255);
        assert_eq!(process_status(-1), 255);
        assert_eq!(process_status(256), 1);
        assert_eq!(process_status(258), 2);
    }

    fn context() -> UsageContext {
        UsageContext::new("taskr run", "Usage: taskr run [-h] [OPTIONS] <origin> <destination>")
    }

    #[test]
    fn no_task_messages() {
        let available = vec!["run".to_string(), "fly".to_string()];
        let err = DispatchError::NoTaskSelected {
            requested: None,
            available: available.clone(),
            context: context(),
        };
        assert_eq!(err.to_string(), "cannot find task to execute. (choose from 'run', 'fly')");

        let err = DispatchError::NoTaskSelected {
            requested: Some("swim".to_string()),
            available,
            context: context(),
        };
        assert_eq!(err.to_string(), "invalid choice: 'swim' (choose from 'run', 'fly')");
        assert!(err.is_user_error());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn renders_usage_then_error() {
        let err = DispatchError::UnrecognizedArguments {
            tokens: vec!["5656".to_string()],
            context: context(),
        };
        assert_eq!(
            err.render(),
            "Usage: taskr run [-h] [OPTIONS] <origin> <destination>\ntaskr run: error: unrecognized arguments: '5656'\n"
        );
    }

    #[test]
    fn missing_arguments_message() {
        let err = DispatchError::MissingArguments {
            names: vec!["origin".to_string(), "destination".to_string()],
            context: context(),
        };
        assert_eq!(
            err.to_string(),
            "the following arguments are required: origin, destination"
        );
    }

    #[test]
    fn task_exit_code_propagates() {
        let err = DispatchError::Task {
            task: "abort".to_string(),
            source: anyhow::Error::new(TaskExit::new(3)),
        };
        assert!(!err.is_user_error());
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.render(), "");

        let err = DispatchError::Task {
            task: "run".to_string(),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.render(), "Error: task run failed: boom\n");
    }

    #[test]
    fn programming_errors_are_not_user_errors() {
        assert!(!DispatchError::NotFinalized.is_user_error());
        assert_eq!(DispatchError::NotFinalized.exit_code(), 1);
        assert_eq!(DispatchError::Help("usage".to_string()).exit_code(), 0);
    }
}
