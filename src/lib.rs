//! taskr - a declarative command-line task runner
//!
//! Tasks are plain callables that declare their parameter list. taskr derives a
//! command-line parser from each declaration, lets the author override or add
//! arguments in named groups, and maps parsed input back onto a call.
//!
//! ```
//! use taskr::{FnTask, Signature, TaskManager, Value};
//!
//! let mut manager = TaskManager::new("taskr");
//! manager
//!     .register(FnTask::new(
//!         "run",
//!         Signature::new().required("origin").required("destination").optional("speed", 1),
//!         |args| Ok(Value::from(format!("{} -> {} at {}", args.arg(0), args.arg(1), args.get("speed")))),
//!     ))
//!     .unwrap();
//! manager.finalize().unwrap();
//!
//! let result = manager.dispatch(["run", "tokyo", "osaka", "-s", "10"]).unwrap();
//! assert_eq!(result, Value::from("tokyo -> osaka at 10"));
//! ```

pub mod domain;
pub mod runner;
pub mod config;
pub mod logging;
pub mod cli;

pub use domain::{
    introspect, Action, ArgumentError, ArgumentSpec, CallArgs, Callable, FnTask,
    IntrospectionError, ParameterDescriptor, ParameterKind, Parameters, Signature, TaskExit,
    TaskResult, Value, ValueType, DEFAULT_GROUP,
};
pub use runner::{
    DispatchError, ManagerError, ParsedArgs, Registrant, Task, TaskBuilder, TaskError,
    TaskHandle, TaskManager, TaskParser, UsageContext,
};
