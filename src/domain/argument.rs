//! Declarative command-line argument specifications
//!
//! An [`ArgumentSpec`] describes one command-line argument: the tokens that
//! select it, the destination it binds to, and how its value is produced.
//! Specs are built infallibly and validated when a task accepts them.

use std::fmt;
use thiserror::Error;

use super::value::{Value, ValueType};

/// Group tag of the unnamed, general section
pub const DEFAULT_GROUP: &str = "*";

#[derive(Debug, Error, PartialEq)]
pub enum ArgumentError {
    #[error("Expect at least one name or flag for an argument")]
    NoFlags,

    #[error("Cannot mix positional names and dash-prefixed flags: {0}")]
    MixedFlags(String),

    #[error("A positional argument takes exactly one name, got: {0}")]
    MultiplePositionalNames(String),

    #[error("Invalid flag '{0}': expected '-x' or '--long-name'")]
    InvalidFlag(String),

    #[error("Cannot find destination of the flags '{0}'")]
    UnresolvedDestination(String),

    #[error("Action '{action}' is not valid for the {kind} argument '{destination}'")]
    InvalidAction {
        action: Action,
        kind: &'static str,
        destination: String,
    },
}

/// What happens when an argument is encountered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    /// Store one coerced value
    #[default]
    Store,
    /// Flag that stores `true`
    StoreTrue,
    /// Flag that stores `false`
    StoreFalse,
    /// Collect every occurrence into a list
    Append,
    /// Positional that absorbs all remaining tokens
    Remainder,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Store => "store",
            Action::StoreTrue => "store_true",
            Action::StoreFalse => "store_false",
            Action::Append => "append",
            Action::Remainder => "remainder",
        }
    }

    /// True for actions that take no value on the command line
    pub fn is_flag(&self) -> bool {
        matches!(self, Action::StoreTrue | Action::StoreFalse)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared command-line argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentSpec {
    group: String,
    flags: Vec<String>,
    destination: Option<String>,
    default: Option<Value>,
    required: Option<bool>,
    value_type: Option<ValueType>,
    action: Action,
    help: Option<String>,
    choices: Option<Vec<Value>>,
}

impl ArgumentSpec {
    /// Creates a spec selected by `flags`
    ///
    /// A single bare name declares a positional argument; dash-prefixed
    /// tokens declare an optional one.
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group: DEFAULT_GROUP.to_string(),
            flags: flags.into_iter().map(Into::into).collect(),
            destination: None,
            default: None,
            required: None,
            value_type: None,
            action: Action::Store,
            help: None,
            choices: None,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn group_name(&self) -> &str {
        &self.group
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Destination once resolved (or explicitly given)
    pub fn dest(&self) -> &str {
        self.destination.as_deref().unwrap_or_default()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn get_value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn get_action(&self) -> Action {
        self.action
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn choice_values(&self) -> Option<&[Value]> {
        self.choices.as_deref()
    }

    pub fn is_positional(&self) -> bool {
        self.flags.iter().all(|flag| !flag.starts_with('-'))
    }

    /// Whether the argument must appear on the command line
    pub fn is_required(&self) -> bool {
        match self.required {
            Some(required) => required,
            None => self.is_positional() && self.default.is_none() && self.action != Action::Remainder,
        }
    }

    /// Coercion applied to raw tokens; plain strings unless set
    pub fn coercion(&self) -> ValueType {
        self.value_type.unwrap_or_default()
    }

    /// Name used in messages: the positional name or the flags joined by `/`
    pub fn display_name(&self) -> String {
        self.flags.join("/")
    }

    /// Validates the flags and fills in the destination
    pub fn resolve(mut self) -> Result<Self, ArgumentError> {
        if self.flags.is_empty() {
            return Err(ArgumentError::NoFlags);
        }

        let dashed = self.flags.iter().filter(|f| f.starts_with('-')).count();
        if dashed != 0 && dashed != self.flags.len() {
            return Err(ArgumentError::MixedFlags(self.flags.join(", ")));
        }

        let destination = if self.is_positional() {
            if self.flags.len() > 1 {
                return Err(ArgumentError::MultiplePositionalNames(self.flags.join(", ")));
            }
            if !matches!(self.action, Action::Store | Action::Remainder) {
                return Err(self.invalid_action("positional"));
            }
            self.destination.clone().unwrap_or_else(|| self.flags[0].clone())
        } else {
            if let Some(bad) = self.flags.iter().find(|f| !is_valid_flag(f)) {
                return Err(ArgumentError::InvalidFlag(bad.clone()));
            }
            if self.action == Action::Remainder {
                return Err(self.invalid_action("optional"));
            }
            match &self.destination {
                Some(destination) => destination.clone(),
                None => destination_from_flags(&self.flags)
                    .ok_or_else(|| ArgumentError::UnresolvedDestination(self.flags.join(", ")))?,
            }
        };

        self.destination = Some(destination);
        Ok(self)
    }

    fn invalid_action(&self, kind: &'static str) -> ArgumentError {
        ArgumentError::InvalidAction {
            action: self.action,
            kind,
            destination: self.destination.clone().unwrap_or_else(|| self.display_name()),
        }
    }
}

/// `-x` with one character, or `--name` with at least one character
fn is_valid_flag(flag: &str) -> bool {
    if let Some(long) = flag.strip_prefix("--") {
        !long.is_empty() && !long.starts_with('-') && !long.contains(char::is_whitespace)
    } else if let Some(short) = flag.strip_prefix('-') {
        let mut chars = short.chars();
        matches!((chars.next(), chars.next()), (Some(c), None) if c != '-' && !c.is_whitespace())
    } else {
        false
    }
}

/// Longest `--` flag (first on ties), dashes stripped, `-` turned into `_`
fn destination_from_flags(flags: &[String]) -> Option<String> {
    let mut best: Option<&str> = None;
    for long in flags.iter().filter_map(|f| f.strip_prefix("--")) {
        if best.map_or(true, |b| long.len() > b.len()) {
            best = Some(long);
        }
    }
    best.map(|long| long.replace('-', "_"))
}
