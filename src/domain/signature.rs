//! Signature introspection
//!
//! Every registrable task declares its parameter list up front through a
//! [`Signature`]. [`introspect`] validates that declaration and turns it into
//! the ordered [`Parameters`] table the rest of the crate works from.
//!
//! Declared order must follow the only order a call can take:
//! required positionals, then defaulted ones, then at most one
//! variadic-positional, then at most one variadic-keyword parameter.

use std::fmt;
use thiserror::Error;

use super::callable::Callable;
use super::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum IntrospectionError {
    #[error("{0} object is not a callable")]
    NotInvocable(String),

    #[error("Cannot determine the signature of {0}: it forwards arbitrary arguments without declaring them")]
    Undeterminable(String),

    #[error("Duplicate parameter '{parameter}' in the signature of {callable}")]
    DuplicateParameter { callable: String, parameter: String },

    #[error("Empty parameter name in the signature of {0}")]
    EmptyName(String),

    #[error("Parameter '{parameter}' of {callable} is declared out of order: {kind} cannot follow {previous}")]
    OutOfOrder {
        callable: String,
        parameter: String,
        kind: ParameterKind,
        previous: ParameterKind,
    },
}

/// How a parameter accepts its argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterKind {
    PositionalRequired,
    PositionalWithDefault,
    VarPositional,
    VarKeyword,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterKind::PositionalRequired => "a required parameter",
            ParameterKind::PositionalWithDefault => "a defaulted parameter",
            ParameterKind::VarPositional => "a variadic-positional parameter",
            ParameterKind::VarKeyword => "a variadic-keyword parameter",
        };
        f.write_str(label)
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: ParameterKind,
    /// Present iff `kind` is [`ParameterKind::PositionalWithDefault`]
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::PositionalRequired,
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::PositionalWithDefault,
            default: Some(default.into()),
        }
    }

    pub fn var_positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::VarPositional,
            default: None,
        }
    }

    pub fn var_keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::VarKeyword,
            default: None,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self.kind, ParameterKind::VarPositional | ParameterKind::VarKeyword)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Declared {
        receiver: Option<String>,
        parameters: Vec<ParameterDescriptor>,
    },
    Opaque,
    NotInvocable,
}

/// A callable's declared parameter list
///
/// ```
/// use taskr::Signature;
///
/// let signature = Signature::new()
///     .required("origin")
///     .required("destination")
///     .optional("speed", 1)
///     .var_keyword("kwargs");
/// assert_eq!(signature.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    shape: Shape,
}

impl Default for Signature {
    fn default() -> Self {
        Self::new()
    }
}

impl Signature {
    pub fn new() -> Self {
        Self {
            shape: Shape::Declared {
                receiver: None,
                parameters: Vec::new(),
            },
        }
    }

    /// A callable that forwards everything it receives and declares nothing
    pub fn opaque() -> Self {
        Self { shape: Shape::Opaque }
    }

    /// An entity that cannot be invoked at all
    pub fn not_invocable() -> Self {
        Self {
            shape: Shape::NotInvocable,
        }
    }

    /// Marks the callable as method-like; the receiver is never exposed
    pub fn receiver(mut self, name: impl Into<String>) -> Self {
        if let Shape::Declared { receiver, .. } = &mut self.shape {
            *receiver = Some(name.into());
        }
        self
    }

    pub fn required(self, name: impl Into<String>) -> Self {
        self.param(ParameterDescriptor::required(name))
    }

    pub fn optional(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.param(ParameterDescriptor::with_default(name, default))
    }

    pub fn var_positional(self, name: impl Into<String>) -> Self {
        self.param(ParameterDescriptor::var_positional(name))
    }

    pub fn var_keyword(self, name: impl Into<String>) -> Self {
        self.param(ParameterDescriptor::var_keyword(name))
    }

    pub fn param(mut self, parameter: ParameterDescriptor) -> Self {
        if let Shape::Declared { parameters, .. } = &mut self.shape {
            parameters.push(parameter);
        }
        self
    }

    /// Number of declared parameters, receiver excluded
    pub fn len(&self) -> usize {
        match &self.shape {
            Shape::Declared { parameters, .. } => parameters.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered parameter table produced by [`introspect`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(Vec<ParameterDescriptor>);

impl Parameters {
    pub fn get(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required positional parameters in declaration order
    pub fn required(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.0
            .iter()
            .filter(|p| p.kind == ParameterKind::PositionalRequired)
    }

    pub fn has_var_positional(&self) -> bool {
        self.0.iter().any(|p| p.kind == ParameterKind::VarPositional)
    }

    pub fn has_var_keyword(&self) -> bool {
        self.0.iter().any(|p| p.kind == ParameterKind::VarKeyword)
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a ParameterDescriptor;
    type IntoIter = std::slice::Iter<'a, ParameterDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Introspects a callable's declared signature
///
/// The receiver of a method-like callable is excluded. The result is
/// deterministic and leaves the callable untouched.
pub fn introspect(callable: &dyn Callable) -> Result<Parameters, IntrospectionError> {
    let identifier = callable.identifier().to_string();
    let parameters = match callable.signature().shape {
        Shape::NotInvocable => return Err(IntrospectionError::NotInvocable(identifier)),
        Shape::Opaque => return Err(IntrospectionError::Undeterminable(identifier)),
        // The receiver is dropped here, it never reaches the table
        Shape::Declared { parameters, .. } => parameters,
    };

    let mut previous: Option<ParameterKind> = None;
    for (index, parameter) in parameters.iter().enumerate() {
        if parameter.name.is_empty() {
            return Err(IntrospectionError::EmptyName(identifier));
        }
        if parameters[..index].iter().any(|p| p.name == parameter.name) {
            return Err(IntrospectionError::DuplicateParameter {
                callable: identifier,
                parameter: parameter.name.clone(),
            });
        }

        // Required < defaulted may repeat; each variadic kind appears at most once
        if let Some(prev) = previous {
            let repeated_variadic = parameter.is_variadic() && prev == parameter.kind;
            if parameter.kind < prev || repeated_variadic {
                return Err(IntrospectionError::OutOfOrder {
                    callable: identifier,
                    parameter: parameter.name.clone(),
                    kind: parameter.kind,
                    previous: prev,
                });
            }
        }
        previous = Some(parameter.kind);
    }

    Ok(Parameters(
        parameters
            .into_iter()
            .map(|mut p| {
                if p.kind != ParameterKind::PositionalWithDefault {
                    p.default = None;
                }
                p
            })
            .collect(),
    ))
}
