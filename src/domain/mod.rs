//! Domain models for taskr
//!
//! Values, declared signatures and argument specifications, without any
//! parsing or I/O concerns.

mod argument;
mod callable;
mod signature;
mod value;

pub use argument::{Action, ArgumentError, ArgumentSpec, DEFAULT_GROUP};
pub use callable::{CallArgs, Callable, FnTask, TaskExit, TaskResult};
pub use signature::{
    introspect, IntrospectionError, ParameterDescriptor, ParameterKind, Parameters, Signature,
};
pub use value::{Value, ValueType};
