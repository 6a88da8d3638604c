//! The task registry and dispatcher
//!
//! A [`TaskManager`] is built explicitly by the embedding program; there is no
//! process-wide registry. Tasks are addressed through [`TaskHandle`]s, plain
//! keys that are only meaningful to the manager that issued them.

use std::collections::HashSet;
use std::fmt;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Command;
use thiserror::Error;

use super::error::{process_status, DispatchError, UsageContext};
use super::parser::{self, ParsedArgs};
use super::task::{Task, TaskError};
use crate::config::Config;
use crate::domain::{ArgumentSpec, CallArgs, Callable, IntrospectionError, Value};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

const ROOT_HELP_FLAGS: [&str; 2] = ["-h", "--help"];

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Mismatched task and task manager.")]
    MismatchedManager,

    #[error("{0} object is not a callable")]
    NotCallable(String),

    #[error("Duplicate task name '{0}': every task needs a distinct name")]
    DuplicateTaskName(String),

    #[error("Tasks have been finalized. Cannot {0}.")]
    AlreadyFinalized(&'static str),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Key of a task inside the manager that registered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    manager: u64,
    index: usize,
}

/// Anything [`TaskManager::register`] accepts
pub enum Registrant {
    Callable(Box<dyn Callable>),
    Task(Task),
    Handle(TaskHandle),
}

impl<C: Callable + 'static> From<C> for Registrant {
    fn from(callable: C) -> Self {
        Registrant::Callable(Box::new(callable))
    }
}

impl From<Task> for Registrant {
    fn from(task: Task) -> Self {
        Registrant::Task(task)
    }
}

impl From<TaskHandle> for Registrant {
    fn from(handle: TaskHandle) -> Self {
        Registrant::Handle(handle)
    }
}

type ErrorHook = Box<dyn Fn(&str, &anyhow::Error)>;

/// Registry and dispatch owner
pub struct TaskManager {
    id: u64,
    prog: String,
    tasks: Vec<Task>,
    main: Option<TaskHandle>,
    finalized: bool,
    error_hook: Option<ErrorHook>,
}

impl TaskManager {
    pub fn new(prog: impl Into<String>) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            prog: prog.into(),
            tasks: Vec::new(),
            main: None,
            finalized: false,
            error_hook: None,
        }
    }

    /// Creates a manager using the configured program name
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.prog.clone())
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn prog(&self) -> &str {
        &self.prog
    }

    /// Registers a callable, a task built for this manager, or an existing handle
    ///
    /// Registering a handle this manager issued returns it unchanged.
    pub fn register(&mut self, registrant: impl Into<Registrant>) -> Result<TaskHandle, ManagerError> {
        match registrant.into() {
            Registrant::Handle(handle) => {
                self.check(handle)?;
                Ok(handle)
            }
            Registrant::Task(task) => {
                if task.manager_id() != self.id {
                    return Err(ManagerError::MismatchedManager);
                }
                self.push(task)
            }
            Registrant::Callable(callable) => {
                let task = Task::with_owner(callable, self.id).map_err(|e| match e {
                    TaskError::Introspection(IntrospectionError::NotInvocable(name)) => {
                        ManagerError::NotCallable(name)
                    }
                    other => ManagerError::Task(other),
                })?;
                self.push(task)
            }
        }
    }

    fn push(&mut self, task: Task) -> Result<TaskHandle, ManagerError> {
        self.ensure_open("register tasks")?;
        let handle = TaskHandle {
            manager: self.id,
            index: self.tasks.len(),
        };
        tracing::debug!(task = task.name(), "Task registered");
        self.tasks.push(task);
        Ok(handle)
    }

    /// Designates the task run when no task name is given
    pub fn set_main(&mut self, task: impl Into<Registrant>) -> Result<TaskHandle, ManagerError> {
        let handle = self.register(task)?;
        self.main = Some(handle);
        Ok(handle)
    }

    pub fn set_name(
        &mut self,
        task: impl Into<Registrant>,
        name: impl Into<String>,
    ) -> Result<TaskHandle, ManagerError> {
        self.modify(task, |task| task.set_name(name).map(|_| ()))
    }

    pub fn set_argument(
        &mut self,
        task: impl Into<Registrant>,
        spec: ArgumentSpec,
    ) -> Result<TaskHandle, ManagerError> {
        self.modify(task, |task| task.set_argument(spec).map(|_| ()))
    }

    pub fn set_group_argument(
        &mut self,
        task: impl Into<Registrant>,
        group: impl Into<String>,
        spec: ArgumentSpec,
    ) -> Result<TaskHandle, ManagerError> {
        self.modify(task, |task| task.set_group_argument(group, spec).map(|_| ()))
    }

    /// Marks the task to be called with the parsed namespace only
    pub fn pass_namespace(&mut self, task: impl Into<Registrant>) -> Result<TaskHandle, ManagerError> {
        self.modify(task, |task| task.set_pass_namespace(true).map(|_| ()))
    }

    fn modify(
        &mut self,
        task: impl Into<Registrant>,
        change: impl FnOnce(&mut Task) -> Result<(), TaskError>,
    ) -> Result<TaskHandle, ManagerError> {
        let handle = self.register(task)?;
        change(&mut self.tasks[handle.index])?;
        Ok(handle)
    }

    /// Called with the task name and error before a task error propagates
    pub fn on_task_error(&mut self, hook: impl Fn(&str, &anyhow::Error) + 'static) -> &mut Self {
        self.error_hook = Some(Box::new(hook));
        self
    }

    pub fn task(&self, handle: TaskHandle) -> Option<&Task> {
        self.check(handle).ok()
    }

    /// Handle of the task named `name`
    pub fn get(&self, name: &str) -> Option<TaskHandle> {
        self.tasks
            .iter()
            .position(|t| t.name() == name)
            .map(|index| TaskHandle {
                manager: self.id,
                index,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Task names in registration order
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(Task::name).collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn main_task(&self) -> Option<&Task> {
        self.main.and_then(|handle| self.task(handle))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Finalizes every task's parser; later calls do nothing
    pub fn finalize(&mut self) -> Result<(), ManagerError> {
        if self.finalized {
            return Ok(());
        }

        for (index, task) in self.tasks.iter().enumerate() {
            if self.tasks[..index].iter().any(|t| t.name() == task.name()) {
                return Err(ManagerError::DuplicateTaskName(task.name().to_string()));
            }
        }

        for task in &mut self.tasks {
            if !task.is_finalized() {
                task.finalize_argparser(&self.prog)?;
            }
        }
        self.finalized = true;
        tracing::debug!(tasks = self.tasks.len(), "Tasks finalized");
        Ok(())
    }

    /// Selects a task and rebuilds its call arguments without invoking it
    pub fn parse<I, S>(&self, args: I) -> Result<(TaskHandle, CallArgs), DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.finalized {
            return Err(DispatchError::NotFinalized);
        }
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let (handle, rest) = self.select(&args)?;
        let task = &self.tasks[handle.index];
        tracing::debug!(task = task.name(), args = rest.len(), "Task selected");

        let parsed: ParsedArgs = task.parse(rest)?;
        Ok((handle, task.bind(parsed)?))
    }

    /// Parses `args` and invokes the selected task, returning its result
    pub fn dispatch<I, S>(&self, args: I) -> Result<Value, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (handle, call_args) = self.parse(args)?;
        self.invoke(handle, call_args)
    }

    /// Invokes a task with arguments produced by [`TaskManager::parse`]
    ///
    /// A task error runs the `on_task_error` hook before it is returned.
    pub fn invoke(&self, handle: TaskHandle, call_args: CallArgs) -> Result<Value, DispatchError> {
        if !self.finalized {
            return Err(DispatchError::NotFinalized);
        }
        let task = self.check(handle).map_err(|_| DispatchError::ForeignHandle)?;

        task.call(call_args).map_err(|source| {
            if let Some(hook) = &self.error_hook {
                hook(task.name(), &source);
            }
            DispatchError::Task {
                task: task.name().to_string(),
                source,
            }
        })
    }

    /// Dispatches and reports failures the way a command-line tool does
    pub fn run<I, S>(&self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.dispatch(args) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => ExitCode::from(process_status(e.report())),
        }
    }

    /// Top-level help listing every task
    pub fn render_help(&self) -> String {
        self.root_command().render_help().to_string()
    }

    fn select<'a>(&self, args: &'a [String]) -> Result<(TaskHandle, &'a [String]), DispatchError> {
        if let Some(first) = args.first() {
            if let Some(handle) = self.get(first) {
                return Ok((handle, &args[1..]));
            }
            if ROOT_HELP_FLAGS.contains(&first.as_str()) {
                return Err(self.root_error(args));
            }
        }

        if let Some(main) = self.main {
            return Ok((main, args));
        }

        let requested = args.first().filter(|token| !token.starts_with('-')).cloned();
        Err(DispatchError::NoTaskSelected {
            requested,
            available: self.task_names().into_iter().map(String::from).collect(),
            context: self.root_context(),
        })
    }

    fn root_error(&self, args: &[String]) -> DispatchError {
        let argv = std::iter::once(self.prog.clone()).chain(args.iter().cloned());
        match self.root_command().try_get_matches_from(argv) {
            Err(e) => parser::clap_error(e, &self.root_context(), |raw| raw.to_string()),
            Ok(_) => DispatchError::NoTaskSelected {
                requested: None,
                available: self.task_names().into_iter().map(String::from).collect(),
                context: self.root_context(),
            },
        }
    }

    fn root_context(&self) -> UsageContext {
        UsageContext::new(self.prog.clone(), format!("Usage: {}", self.root_usage()))
    }

    fn root_usage(&self) -> String {
        format!("{} [-h] {{{}}} ...", self.prog, self.task_names().join(","))
    }

    fn root_command(&self) -> Command {
        let mut command = Command::new(self.prog.clone())
            .disable_version_flag(true)
            .disable_help_subcommand(true)
            .subcommand_help_heading("Tasks")
            .subcommand_value_name("TASK")
            .override_usage(self.root_usage());

        // Names may still collide before finalize; the first registration is listed
        let mut listed = HashSet::new();
        for task in self.tasks.iter().filter(|task| listed.insert(task.name())) {
            let subcommand = match task.parser() {
                Some(parser) => parser.command().clone(),
                None => {
                    let mut command = Command::new(task.name().to_string());
                    if let Some(about) = task.about() {
                        command = command.about(about.to_string());
                    }
                    command
                }
            };
            command = command.subcommand(subcommand);
        }
        command
    }

    fn check(&self, handle: TaskHandle) -> Result<&Task, ManagerError> {
        if handle.manager != self.id {
            return Err(ManagerError::MismatchedManager);
        }
        self.tasks
            .get(handle.index)
            .ok_or(ManagerError::MismatchedManager)
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), ManagerError> {
        if self.finalized {
            return Err(ManagerError::AlreadyFinalized(operation));
        }
        Ok(())
    }
}

impl fmt::Display for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tasks=[{}]", self.task_names().join(","))?;
        if let Some(main) = self.main_task() {
            write!(f, ", main={}", main.name())?;
        }
        Ok(())
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("prog", &self.prog)
            .field("tasks", &self.tasks)
            .field("main", &self.main)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}
