//! Tasks: a callable plus its command-line argument table
//!
//! A [`Task`] introspects its callable once, derives one [`ArgumentSpec`] per
//! non-variadic parameter, accepts manual overrides until it is finalized, and
//! reverses the mapping at dispatch time by rebuilding [`CallArgs`].
//!
//! ## Derivation rules
//!
//! | Parameter | Argument |
//! |-----------|----------|
//! | required | positional named after the parameter, plain string |
//! | defaulted | `-<first char>` / `--<name-with-hyphens>`, typed from the default |
//! | defaulted `bool` | flag toggling away from the default |
//! | variadic-positional | none; receives unconsumed tokens |
//! | variadic-keyword | none; allows extra destinations |

use std::fmt;
use thiserror::Error;

use super::error::DispatchError;
use super::manager::{ManagerError, TaskHandle, TaskManager};
use super::parser::{ParsedArgs, TaskParser};
use crate::domain::{
    introspect, Action, ArgumentError, ArgumentSpec, CallArgs, Callable, IntrospectionError,
    ParameterDescriptor, ParameterKind, Parameters, TaskResult, Value, ValueType,
};

#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error("Invalid argument for {task}: {source}")]
    Argument {
        task: String,
        #[source]
        source: ArgumentError,
    },

    #[error("\"{destination}\" is not allowed to be added as an argument of {task}. {task} doesn't accept extra keyword args.")]
    UnknownArgument { destination: String, task: String },

    #[error("The argument parser of {0} has been finalized. Cannot modify it again.")]
    AlreadyFinalized(String),
}

/// A registered callable and its argument table
pub struct Task {
    name: String,
    callable: Box<dyn Callable>,
    parameters: Parameters,
    arguments: Vec<ArgumentSpec>,
    pass_namespace: bool,
    manager_id: u64,
    parser: Option<TaskParser>,
}

impl Task {
    /// Wraps `callable` for `manager`, deriving its default arguments
    pub fn new<C: Callable + 'static>(callable: C, manager: &TaskManager) -> Result<Self, TaskError> {
        Self::with_owner(Box::new(callable), manager.id())
    }

    /// Starts a builder that collects overrides before the task exists
    pub fn builder<C: Callable + 'static>(callable: C) -> TaskBuilder {
        TaskBuilder::new(Box::new(callable))
    }

    pub(crate) fn with_owner(callable: Box<dyn Callable>, manager_id: u64) -> Result<Self, TaskError> {
        let parameters = introspect(callable.as_ref())?;
        let name = task_name(callable.identifier());

        let arguments = parameters
            .iter()
            .filter(|p| !p.is_variadic())
            .map(|p| {
                derive_argument(p).resolve().map_err(|source| TaskError::Argument {
                    task: name.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(task = name.as_str(), arguments = arguments.len(), "Task created");

        Ok(Self {
            name,
            callable,
            parameters,
            arguments,
            pass_namespace: false,
            manager_id,
            parser: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn about(&self) -> Option<&str> {
        self.callable.about()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Argument specs in registration order
    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    pub fn argument(&self, destination: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|a| a.dest() == destination)
    }

    pub fn has_var_positional(&self) -> bool {
        self.parameters.has_var_positional()
    }

    pub fn has_var_keyword(&self) -> bool {
        self.parameters.has_var_keyword()
    }

    pub fn passes_namespace(&self) -> bool {
        self.pass_namespace
    }

    pub fn is_finalized(&self) -> bool {
        self.parser.is_some()
    }

    pub fn parser(&self) -> Option<&TaskParser> {
        self.parser.as_ref()
    }

    pub(crate) fn manager_id(&self) -> u64 {
        self.manager_id
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<&mut Self, TaskError> {
        self.ensure_open()?;
        self.name = name.into();
        Ok(self)
    }

    /// Calls the task with every parsed destination as a named argument
    pub fn set_pass_namespace(&mut self, pass_namespace: bool) -> Result<&mut Self, TaskError> {
        self.ensure_open()?;
        self.pass_namespace = pass_namespace;
        Ok(self)
    }

    /// Adds or replaces the argument for `spec`'s destination, keeping its group
    pub fn set_argument(&mut self, spec: ArgumentSpec) -> Result<&mut Self, TaskError> {
        self.ensure_open()?;
        let spec = spec.resolve().map_err(|source| TaskError::Argument {
            task: self.name.clone(),
            source,
        })?;

        let destination = spec.dest().to_string();
        let accepts_extra = self.has_var_keyword() || self.pass_namespace;
        if !accepts_extra && !self.parameters.contains(&destination) {
            return Err(TaskError::UnknownArgument {
                destination,
                task: self.name.clone(),
            });
        }

        // A replacement keeps the original position
        match self.arguments.iter_mut().find(|a| a.dest() == destination) {
            Some(existing) => *existing = spec,
            None => self.arguments.push(spec),
        }
        tracing::debug!(task = self.name.as_str(), destination = destination.as_str(), "Argument set");
        Ok(self)
    }

    /// Like [`Task::set_argument`], placing the argument under `group`
    pub fn set_group_argument(
        &mut self,
        group: impl Into<String>,
        spec: ArgumentSpec,
    ) -> Result<&mut Self, TaskError> {
        self.set_argument(spec.group(group))
    }

    /// Builds the task's parser; may be called once
    pub fn finalize_argparser(&mut self, prog: &str) -> Result<(), TaskError> {
        self.ensure_open()?;
        let variadic = self
            .parameters
            .iter()
            .find(|p| p.kind == ParameterKind::VarPositional)
            .map(|p| p.name.as_str());

        let parser = TaskParser::compile(
            prog,
            &self.name,
            self.callable.about(),
            &self.arguments,
            variadic,
        );
        tracing::debug!(task = self.name.as_str(), "Argument parser finalized");
        self.parser = Some(parser);
        Ok(())
    }

    /// Parses the tokens that follow the task name
    pub fn parse(&self, args: &[String]) -> Result<ParsedArgs, DispatchError> {
        self.parser
            .as_ref()
            .ok_or(DispatchError::NotFinalized)?
            .parse(args)
    }

    /// Rebuilds call arguments from a parse result
    ///
    /// Required parameters are passed positionally in declaration order,
    /// followed by unconsumed tokens when the callable is variadic. Every
    /// other destination is passed by name.
    pub fn bind(&self, parsed: ParsedArgs) -> Result<CallArgs, DispatchError> {
        let (mut values, unconsumed) = parsed.into_parts();

        if !unconsumed.is_empty() && !self.has_var_positional() {
            let context = self
                .parser
                .as_ref()
                .ok_or(DispatchError::NotFinalized)?
                .context()
                .clone();
            return Err(DispatchError::UnrecognizedArguments {
                tokens: unconsumed,
                context,
            });
        }

        let mut positional = Vec::new();
        if !self.pass_namespace {
            for parameter in self.parameters.required() {
                let value = match values.iter().position(|(dest, _)| *dest == parameter.name) {
                    Some(index) => values.remove(index).1,
                    None => Value::None,
                };
                positional.push(value);
            }
        }
        positional.extend(unconsumed.into_iter().map(Value::Str));

        tracing::debug!(
            task = self.name.as_str(),
            positional = positional.len(),
            named = values.len(),
            "Arguments bound"
        );
        Ok(CallArgs::new(positional, values))
    }

    /// Invokes the wrapped callable
    pub fn call(&self, args: CallArgs) -> TaskResult {
        self.callable.call(args)
    }

    fn ensure_open(&self) -> Result<(), TaskError> {
        if self.is_finalized() {
            return Err(TaskError::AlreadyFinalized(self.name.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("arguments", &self.arguments)
            .field("pass_namespace", &self.pass_namespace)
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

/// Collects a task's name and overrides before it is created
///
/// ```
/// use taskr::{ArgumentSpec, FnTask, Signature, Task, TaskManager, Value};
///
/// let mut manager = TaskManager::new("taskr");
/// let run = FnTask::new(
///     "run",
///     Signature::new().required("origin").required("destination").optional("speed", 1),
///     |_| Ok(Value::None),
/// );
/// let handle = Task::builder(run)
///     .with_group_argument("location", ArgumentSpec::new(["origin"]).default("Tokyo"))
///     .register(&mut manager)
///     .unwrap();
/// assert_eq!(manager.task(handle).unwrap().name(), "run");
/// ```
pub struct TaskBuilder {
    callable: Box<dyn Callable>,
    name: Option<String>,
    arguments: Vec<ArgumentSpec>,
    pass_namespace: bool,
}

impl TaskBuilder {
    fn new(callable: Box<dyn Callable>) -> Self {
        Self {
            callable,
            name: None,
            arguments: Vec::new(),
            pass_namespace: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_argument(mut self, spec: ArgumentSpec) -> Self {
        self.arguments.push(spec);
        self
    }

    pub fn with_group_argument(mut self, group: impl Into<String>, spec: ArgumentSpec) -> Self {
        self.arguments.push(spec.group(group));
        self
    }

    pub fn pass_namespace(mut self) -> Self {
        self.pass_namespace = true;
        self
    }

    /// Creates the task for `manager`, applying overrides in order
    pub fn build(self, manager: &TaskManager) -> Result<Task, TaskError> {
        let mut task = Task::with_owner(self.callable, manager.id())?;
        task.set_pass_namespace(self.pass_namespace)?;
        if let Some(name) = self.name {
            task.set_name(name)?;
        }
        for spec in self.arguments {
            task.set_argument(spec)?;
        }
        Ok(task)
    }

    /// Builds the task and registers it with `manager`
    pub fn register(self, manager: &mut TaskManager) -> Result<TaskHandle, ManagerError> {
        let task = self.build(manager)?;
        manager.register(task)
    }
}

/// `Run_Fast` → `run-fast`
fn task_name(identifier: &str) -> String {
    identifier.replace('_', "-").to_lowercase()
}

fn derive_argument(parameter: &ParameterDescriptor) -> ArgumentSpec {
    let name = parameter.name.as_str();
    match &parameter.default {
        None => ArgumentSpec::new([name])
            .destination(name)
            .value_type(ValueType::String),
        Some(default) => {
            let first = name.chars().next().map(String::from).unwrap_or_default();
            let spec = ArgumentSpec::new([format!("-{}", first), format!("--{}", name.replace('_', "-"))])
                .destination(name)
                .default(default.clone())
                .required(false);
            match default {
                Value::Bool(true) => spec.action(Action::StoreFalse),
                Value::Bool(false) => spec.action(Action::StoreTrue),
                other => spec.value_type(other.value_type()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FnTask, Signature, DEFAULT_GROUP};

    fn run() -> impl Callable {
        FnTask::new(
            "run",
            Signature::new()
                .required("origin")
                .required("destination")
                .optional("speed", 1)
                .optional("step_size", 1.5)
                .optional("quiet", false)
                .optional("loud", true),
            |args| Ok(Value::from(format!("{} -> {}", args.arg(0), args.arg(1)))),
        )
    }

    fn fly() -> impl Callable {
        FnTask::new(
            "Fly_Away",
            Signature::new()
                .required("origin")
                .required("destination")
                .var_positional("args"),
            |args| Ok(Value::from(args.positional().to_vec())),
        )
    }

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn derives_default_arguments() {
        let manager = TaskManager::new("taskr");
        let task = Task::new(run(), &manager).unwrap();

        let origin = task.argument("origin").unwrap();
        assert!(origin.is_positional());
        assert_eq!(origin.get_value_type(), Some(ValueType::String));

        let speed = task.argument("speed").unwrap();
        assert_eq!(speed.flags(), &["-s".to_string(), "--speed".to_string()]);
        assert_eq!(speed.get_value_type(), Some(ValueType::Integer));
        assert!(!speed.is_required());

        let step = task.argument("step_size").unwrap();
        assert_eq!(step.flags(), &["-s".to_string(), "--step-size".to_string()]);
        assert_eq!(step.get_value_type(), Some(ValueType::Float));

        assert_eq!(task.argument("quiet").unwrap().get_action(), Action::StoreTrue);
        assert_eq!(task.argument("loud").unwrap().get_action(), Action::StoreFalse);
    }

    #[test]
    fn variadics_are_not_arguments() {
        let manager = TaskManager::new("taskr");
        let task = Task::new(fly(), &manager).unwrap();
        assert_eq!(task.name(), "fly-away");
        assert_eq!(task.arguments().len(), 2);
        assert!(task.has_var_positional());
        assert!(!task.has_var_keyword());
    }

    #[test]
    fn override_keeps_position() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(run(), &manager).unwrap();
        task.set_group_argument("location", ArgumentSpec::new(["origin"]).default("Tokyo"))
            .unwrap();

        let dests: Vec<_> = task.arguments().iter().map(|a| a.dest()).collect();
        assert_eq!(dests[0], "origin");
        let origin = task.argument("origin").unwrap();
        assert_eq!(origin.group_name(), "location");
        assert!(!origin.is_required());
    }

    #[test]
    fn set_argument_keeps_spec_group() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(run(), &manager).unwrap();
        task.set_argument(ArgumentSpec::new(["destination"]).group("places"))
            .unwrap();
        assert_eq!(task.argument("destination").unwrap().group_name(), "places");

        task.set_argument(ArgumentSpec::new(["-a", "--speed"])).unwrap();
        assert_eq!(task.argument("speed").unwrap().group_name(), DEFAULT_GROUP);
    }

    #[test]
    fn rejects_unknown_destination() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(fly(), &manager).unwrap();
        let err = task
            .set_argument(ArgumentSpec::new(["-y", "--year"]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"year\" is not allowed to be added as an argument of fly-away. fly-away doesn't accept extra keyword args."
        );
    }

    #[test]
    fn var_keyword_accepts_extra_destinations() {
        let manager = TaskManager::new("taskr");
        let callable = FnTask::new(
            "walk",
            Signature::new().required("to").var_keyword("kwargs"),
            |_| Ok(Value::None),
        );
        let mut task = Task::new(callable, &manager).unwrap();
        task.set_argument(ArgumentSpec::new(["-y", "--year"]).value_type(ValueType::Integer))
            .unwrap();
        assert!(task.argument("year").is_some());
    }

    #[test]
    fn unresolvable_flags_fail_at_construction() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(run(), &manager).unwrap();
        let err = task.set_argument(ArgumentSpec::new(["-y"])).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Argument {
                source: ArgumentError::UnresolvedDestination(_),
                ..
            }
        ));
    }

    #[test]
    fn finalize_is_one_shot() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(run(), &manager).unwrap();
        assert!(matches!(task.parse(&[]), Err(DispatchError::NotFinalized)));

        task.finalize_argparser("taskr").unwrap();
        assert_eq!(
            task.finalize_argparser("taskr"),
            Err(TaskError::AlreadyFinalized("run".to_string()))
        );
        assert!(matches!(
            task.set_argument(ArgumentSpec::new(["origin"])),
            Err(TaskError::AlreadyFinalized(_))
        ));
        assert!(task.set_name("walk").is_err());
    }

    #[test]
    fn binds_required_then_named() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(run(), &manager).unwrap();
        task.finalize_argparser("taskr").unwrap();

        let parsed = task.parse(&args(&["tokyo", "osaka", "--speed", "10"])).unwrap();
        let call = task.bind(parsed).unwrap();
        assert_eq!(call.positional(), &[Value::from("tokyo"), Value::from("osaka")]);
        assert_eq!(call.get("speed"), &Value::Int(10));
        assert_eq!(call.get("step_size"), &Value::Float(1.5));
        assert_eq!(call.get("quiet"), &Value::Bool(false));
        assert_eq!(call.get("loud"), &Value::Bool(true));
        assert!(!call.contains("origin"));

        assert_eq!(task.call(call).unwrap(), Value::from("tokyo -> osaka"));
    }

    #[test]
    fn unconsumed_tokens_follow_required() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(fly(), &manager).unwrap();
        task.finalize_argparser("taskr").unwrap();

        let parsed = task.parse(&args(&["tokyo", "osaka", "56", "57"])).unwrap();
        let call = task.bind(parsed).unwrap();
        assert_eq!(call.rest(2), &[Value::from("56"), Value::from("57")]);
    }

    #[test]
    fn unconsumed_tokens_rejected_without_variadic() {
        let manager = TaskManager::new("taskr");
        let mut task = Task::new(run(), &manager).unwrap();
        task.finalize_argparser("taskr").unwrap();

        let parsed = task.parse(&args(&["tokyo", "osaka", "5656"])).unwrap();
        let err = task.bind(parsed).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized arguments: '5656'");
        assert_eq!(err.context().unwrap().prog, "taskr run");
    }

    #[test]
    fn namespace_passing_names_everything() {
        let manager = TaskManager::new("taskr");
        let callable = FnTask::new("sleep", Signature::new(), |args| {
            Ok(args.get("start_time").clone())
        });
        let mut task = Task::builder(callable)
            .pass_namespace()
            .with_argument(ArgumentSpec::new(["start_time"]))
            .with_argument(ArgumentSpec::new(["end_time"]))
            .build(&manager)
            .unwrap();
        task.finalize_argparser("taskr").unwrap();

        let parsed = task.parse(&args(&["--", "9", "17"])).unwrap();
        let call = task.bind(parsed).unwrap();
        assert!(call.positional().is_empty());
        assert_eq!(call.get("start_time"), &Value::from("9"));
        assert_eq!(call.get("end_time"), &Value::from("17"));
    }

    #[test]
    fn builder_applies_name_and_overrides() {
        let manager = TaskManager::new("taskr");
        let task = Task::builder(run())
            .named("drive")
            .with_argument(ArgumentSpec::new(["--speed", "-s"]).value_type(ValueType::Integer))
            .build(&manager)
            .unwrap();
        assert_eq!(task.name(), "drive");
        assert_eq!(
            task.argument("speed").unwrap().flags(),
            &["--speed".to_string(), "-s".to_string()]
        );
    }

    #[test]
    fn task_names() {
        assert_eq!(task_name("run"), "run");
        assert_eq!(task_name("step_size"), "step-size");
        assert_eq!(task_name("Deploy_All"), "deploy-all");
    }
}
