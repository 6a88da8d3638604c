//! Task registration and dispatch
//!
//! Builds on [`crate::domain`]: tasks wrap callables, compile their argument
//! tables into parsers, and the manager routes command lines to them.

mod error;
mod manager;
mod parser;
mod task;

pub use error::{process_status, DispatchError, UsageContext, USAGE_EXIT_CODE};
pub use manager::{ManagerError, Registrant, TaskHandle, TaskManager};
pub use parser::{ParsedArgs, TaskParser};
pub use task::{Task, TaskBuilder, TaskError};
