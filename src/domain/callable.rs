//! The callable capability a task wraps
//!
//! Instead of reflecting over arbitrary functions at runtime, anything that
//! can be registered as a task implements [`Callable`] and declares its
//! [`Signature`]. [`FnTask`] adapts a plain closure.

use std::fmt;
use thiserror::Error;

use super::signature::Signature;
use super::value::Value;

static NONE: Value = Value::None;

/// Result returned by a task body
pub type TaskResult = anyhow::Result<Value>;

/// Something that can be registered and invoked as a task
pub trait Callable {
    /// Identifier the default task name is derived from
    fn identifier(&self) -> &str;

    /// Declared parameter list
    fn signature(&self) -> Signature;

    /// One-line description shown in help output
    fn about(&self) -> Option<&str> {
        None
    }

    /// Invokes the callable with reconstructed call arguments
    fn call(&self, args: CallArgs) -> TaskResult;
}

impl<C: Callable + ?Sized> Callable for Box<C> {
    fn identifier(&self) -> &str {
        (**self).identifier()
    }

    fn signature(&self) -> Signature {
        (**self).signature()
    }

    fn about(&self) -> Option<&str> {
        (**self).about()
    }

    fn call(&self, args: CallArgs) -> TaskResult {
        (**self).call(args)
    }
}

/// A closure with a declared signature
pub struct FnTask<F> {
    identifier: String,
    about: Option<String>,
    signature: Signature,
    func: F,
}

impl<F> FnTask<F>
where
    F: Fn(CallArgs) -> TaskResult,
{
    pub fn new(identifier: impl Into<String>, signature: Signature, func: F) -> Self {
        Self {
            identifier: identifier.into(),
            about: None,
            signature,
            func,
        }
    }

    /// Sets the description shown in help output
    pub fn with_about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }
}

impl<F> Callable for FnTask<F>
where
    F: Fn(CallArgs) -> TaskResult,
{
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn signature(&self) -> Signature {
        self.signature.clone()
    }

    fn about(&self) -> Option<&str> {
        self.about.as_deref()
    }

    fn call(&self, args: CallArgs) -> TaskResult {
        (self.func)(args)
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("identifier", &self.identifier)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Arguments reconstructed for one invocation
///
/// `positional` holds the required parameters in declaration order followed
/// by any variadic extras; `named` holds everything else in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>, named: Vec<(String, Value)>) -> Self {
        Self { positional, named }
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self) -> &[(String, Value)] {
        &self.named
    }

    /// Positional argument at `index`, or [`Value::None`] past the end
    pub fn arg(&self, index: usize) -> &Value {
        self.positional.get(index).unwrap_or(&NONE)
    }

    /// Positional arguments from `start` onwards (the variadic tail)
    pub fn rest(&self, start: usize) -> &[Value] {
        self.positional.get(start..).unwrap_or(&[])
    }

    /// Named argument, or [`Value::None`] if absent
    pub fn get(&self, name: &str) -> &Value {
        self.named
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .unwrap_or(&NONE)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.iter().any(|(key, _)| key == name)
    }

    pub fn into_parts(self) -> (Vec<Value>, Vec<(String, Value)>) {
        (self.positional, self.named)
    }
}

/// Deliberate abnormal termination requested by a task body
///
/// Returning this error (through `anyhow`) makes the process exit with `code`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or("task exited with a non-zero status"))]
pub struct TaskExit {
    pub code: i32,
    pub message: Option<String>,
}

impl TaskExit {
    pub fn new(code: i32) -> Self {
        Self { code, message: None }
    }

    pub fn with_message(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}
