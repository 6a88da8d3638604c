//! Compiles a task's argument table into a command-line parser
//!
//! Optional arguments are handed to `clap` (builder API), one `Arg` per spec,
//! with each group rendered under its own help heading. Positional tokens are
//! gathered by a single hidden catch-all and assigned here, so that optional
//! positionals, remainders and unconsumed trailing tokens follow one
//! predictable, greedy left-to-right rule.
//!
//! Dash-prefixed tokens matching no flag never reach clap. They are kept
//! aside and reported as unconsumed together with any leftover positional
//! tokens, in command-line order.

use std::collections::{HashMap, VecDeque};

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use super::error::{DispatchError, UsageContext};
use crate::domain::{Action, ArgumentSpec, Value, DEFAULT_GROUP};

const POSITIONAL_TOKENS: &str = "__positional_tokens__";
const HELP_ID: &str = "__help__";
const HELP_FLAGS: [&str; 2] = ["-h", "--help"];

/// Values produced by one parse, before they are bound to a call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    values: Vec<(String, Value)>,
    unconsumed: Vec<String>,
}

impl ParsedArgs {
    /// Destination → value, in registration order
    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn get(&self, destination: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(dest, _)| dest == destination)
            .map(|(_, value)| value)
    }

    /// Positional tokens no argument claimed, in command-line order
    pub fn unconsumed(&self) -> &[String] {
        &self.unconsumed
    }

    pub fn into_parts(self) -> (Vec<(String, Value)>, Vec<String>) {
        (self.values, self.unconsumed)
    }
}

#[derive(Debug, Clone)]
struct CompiledArgument {
    spec: ArgumentSpec,
    /// Flags left after conflict resolution (empty for positionals)
    flags: Vec<String>,
}

/// A finalized parser for one task
#[derive(Debug, Clone)]
pub struct TaskParser {
    command: Command,
    arguments: Vec<CompiledArgument>,
    /// Every flag clap knows about → whether it takes a value
    flags: HashMap<String, bool>,
    context: UsageContext,
}

impl TaskParser {
    /// Builds the parser for `task` invoked as `<prog> <task>`
    ///
    /// `variadic` names the variadic-positional parameter, if the task has one,
    /// so that usage shows where extra tokens go.
    pub fn compile(
        prog: &str,
        task: &str,
        about: Option<&str>,
        specs: &[ArgumentSpec],
        variadic: Option<&str>,
    ) -> Self {
        let (arguments, help_flags) = resolve_conflicts(task, specs);
        let mut flags: HashMap<String, bool> =
            help_flags.iter().map(|flag| (flag.clone(), false)).collect();
        for argument in &arguments {
            let takes_value = !argument.spec.get_action().is_flag();
            flags.extend(argument.flags.iter().map(|flag| (flag.clone(), takes_value)));
        }
        let context = UsageContext::new(
            format!("{} {}", prog, task),
            format!("Usage: {}", usage_line(prog, task, &arguments, &help_flags, variadic)),
        );

        let mut template = String::new();
        if about.is_some() {
            template.push_str("{about-with-newline}\n");
        }
        template.push_str("{usage-heading} {usage}\n\n{before-help}{all-args}{after-help}");

        let mut command = Command::new(task.to_string())
            .disable_help_flag(true)
            .disable_version_flag(true)
            .args_override_self(true)
            .override_usage(usage_line(prog, task, &arguments, &help_flags, variadic))
            .help_template(template)
            .arg(
                Arg::new(POSITIONAL_TOKENS)
                    .num_args(1..)
                    .action(ArgAction::Append)
                    .value_parser(clap::value_parser!(String))
                    .allow_negative_numbers(true)
                    .hide(true),
            );

        if let Some(about) = about {
            command = command.about(about.to_string());
        }

        let positional_help = positional_help(&arguments);
        if !positional_help.is_empty() {
            command = command.before_help(positional_help);
        }

        if !help_flags.is_empty() {
            command = command.arg(flagged(
                Arg::new(HELP_ID).action(ArgAction::Help).help("Print help"),
                &help_flags,
            ));
        }

        for argument in arguments.iter().filter(|a| !a.flags.is_empty()) {
            command = command.arg(optional_arg(argument));
        }

        Self {
            command,
            arguments,
            flags,
            context,
        }
    }

    /// The compiled clap command (used as a subcommand of the manager's parser)
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn context(&self) -> &UsageContext {
        &self.context
    }

    /// Flags an argument kept after conflict resolution
    pub fn effective_flags(&self, destination: &str) -> Option<&[String]> {
        self.arguments
            .iter()
            .find(|a| a.spec.dest() == destination)
            .map(|a| a.flags.as_slice())
    }

    pub fn render_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }

    /// Parses the arguments that follow the task name
    pub fn parse(&self, args: &[String]) -> Result<ParsedArgs, DispatchError> {
        let (known, origins, strays) = self.split_unknown_flags(args);
        let matches = self
            .command
            .clone()
            .try_get_matches_from(std::iter::once(self.context.prog.clone()).chain(known))
            .map_err(|e| clap_error(e, &self.context, |raw| display_for_flag(raw, &self.arguments)))?;

        let tokens: VecDeque<String> = matches
            .get_many::<String>(POSITIONAL_TOKENS)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        // clap indices count the program name at 0
        let positions: Vec<usize> = matches
            .indices_of(POSITIONAL_TOKENS)
            .map(|indices| {
                indices
                    .filter_map(|i| i.checked_sub(1).and_then(|i| origins.get(i)).copied())
                    .collect()
            })
            .unwrap_or_default();

        let (mut positional_values, leftover) = self.assign_positionals(tokens)?;
        let unconsumed = in_command_line_order(leftover, &positions, strays);

        let mut values = Vec::with_capacity(self.arguments.len());
        for argument in &self.arguments {
            let spec = &argument.spec;
            let value = if spec.is_positional() {
                positional_values.remove(spec.dest())
            } else if argument.flags.is_empty() {
                // Every flag was taken over by a later argument
                spec.default_value().cloned()
            } else {
                Some(self.optional_value(spec, &matches)?)
            };
            if let Some(value) = value {
                values.push((spec.dest().to_string(), value));
            }
        }

        Ok(ParsedArgs { values, unconsumed })
    }

    /// Splits off dash-prefixed tokens that match no flag
    ///
    /// Returns the tokens for clap, the original index of each, and the
    /// unknown tokens with their original index. Everything after `--` is
    /// positional.
    fn split_unknown_flags(&self, args: &[String]) -> (Vec<String>, Vec<usize>, Vec<(usize, String)>) {
        let mut known = Vec::with_capacity(args.len());
        let mut origins = Vec::with_capacity(args.len());
        let mut strays = Vec::new();
        let mut positional_only = false;

        for (index, token) in args.iter().enumerate() {
            if !positional_only && token == "--" {
                positional_only = true;
            } else if !positional_only && looks_like_flag(token) && !self.is_known_flag(token) {
                strays.push((index, token.clone()));
                continue;
            }
            known.push(token.clone());
            origins.push(index);
        }
        (known, origins, strays)
    }

    /// `--long`, `--long=value`, `-s`, clustered `-qs` or `-s5`
    fn is_known_flag(&self, token: &str) -> bool {
        if token.starts_with("--") {
            let name = token.split_once('=').map_or(token, |(name, _)| name);
            return self.flags.contains_key(name);
        }
        if self.flags.contains_key(token) {
            return true;
        }
        for short in token.chars().skip(1) {
            match self.flags.get(&format!("-{}", short)) {
                // The rest of the token is the value
                Some(true) => return true,
                Some(false) => {}
                None => return false,
            }
        }
        true
    }

    /// Greedy left-to-right assignment of positional tokens
    fn assign_positionals(
        &self,
        mut tokens: VecDeque<String>,
    ) -> Result<(HashMap<String, Value>, Vec<String>), DispatchError> {
        let positionals: Vec<&ArgumentSpec> = self
            .arguments
            .iter()
            .map(|a| &a.spec)
            .filter(|spec| spec.is_positional())
            .collect();

        let required_total = positionals.iter().filter(|s| s.is_required()).count();
        let mut surplus = tokens.len().saturating_sub(required_total);
        let mut required_left = required_total;
        let mut assigned = HashMap::new();
        let mut missing = Vec::new();

        for spec in positionals {
            let value = match spec.get_action() {
                Action::Remainder => {
                    let take = tokens.len().saturating_sub(required_left);
                    surplus = surplus.saturating_sub(take);
                    let mut items = match spec.default_value() {
                        Some(Value::List(items)) => items.clone(),
                        _ => Vec::new(),
                    };
                    for token in tokens.drain(..take) {
                        items.push(self.coerce(spec, &token)?);
                    }
                    Value::List(items)
                }
                _ if spec.is_required() => {
                    required_left -= 1;
                    match tokens.pop_front() {
                        Some(token) => self.coerce(spec, &token)?,
                        None => {
                            missing.push(spec.display_name());
                            continue;
                        }
                    }
                }
                _ => match tokens.front() {
                    Some(_) if surplus > 0 => {
                        surplus -= 1;
                        let token = tokens.pop_front().unwrap_or_default();
                        self.coerce(spec, &token)?
                    }
                    _ => spec.default_value().cloned().unwrap_or(Value::None),
                },
            };
            assigned.insert(spec.dest().to_string(), value);
        }

        if !missing.is_empty() {
            return Err(DispatchError::MissingArguments {
                names: missing,
                context: self.context.clone(),
            });
        }

        Ok((assigned, tokens.into_iter().collect()))
    }

    fn optional_value(&self, spec: &ArgumentSpec, matches: &ArgMatches) -> Result<Value, DispatchError> {
        let id = spec.dest();
        let given = matches.value_source(id) == Some(ValueSource::CommandLine);
        let default = spec.default_value().cloned();

        let value = match spec.get_action() {
            Action::StoreTrue if given => Value::Bool(true),
            Action::StoreTrue => default.unwrap_or(Value::Bool(false)),
            Action::StoreFalse if given => Value::Bool(false),
            Action::StoreFalse => default.unwrap_or(Value::Bool(true)),
            Action::Append if given => {
                let mut items = match default {
                    Some(Value::List(items)) => items,
                    _ => Vec::new(),
                };
                for token in matches.get_many::<String>(id).into_iter().flatten() {
                    items.push(self.coerce(spec, token)?);
                }
                Value::List(items)
            }
            _ if given => match matches.get_one::<String>(id) {
                Some(token) => self.coerce(spec, token)?,
                None => default.unwrap_or(Value::None),
            },
            _ => default.unwrap_or(Value::None),
        };
        Ok(value)
    }

    /// Applies the spec's coercion and choices to a raw token
    fn coerce(&self, spec: &ArgumentSpec, token: &str) -> Result<Value, DispatchError> {
        let invalid = |message: String| DispatchError::InvalidValue {
            message: format!("argument {}: {}", spec.display_name(), message),
            context: self.context.clone(),
        };

        let value = spec.coercion().coerce(token).map_err(&invalid)?;
        if let Some(choices) = spec.choice_values() {
            if !choices.contains(&value) {
                return Err(invalid(format!(
                    "invalid choice: '{}' (choose from {})",
                    token,
                    choice_list(choices)
                )));
            }
        }
        Ok(value)
    }
}

/// Later arguments take over flags already claimed by earlier ones,
/// the built-in help flags included
fn resolve_conflicts(task: &str, specs: &[ArgumentSpec]) -> (Vec<CompiledArgument>, Vec<String>) {
    let mut help_flags: Vec<String> = HELP_FLAGS.iter().map(|f| f.to_string()).collect();
    let mut arguments: Vec<CompiledArgument> = Vec::with_capacity(specs.len());
    let mut owners: HashMap<String, Option<usize>> =
        help_flags.iter().map(|f| (f.clone(), None)).collect();

    for (index, spec) in specs.iter().enumerate() {
        let flags = if spec.is_positional() {
            Vec::new()
        } else {
            spec.flags().to_vec()
        };

        for flag in &flags {
            let previous = owners.insert(flag.clone(), Some(index));
            if let Some(previous) = previous.filter(|owner| *owner != Some(index)) {
                let (losing, list) = match previous {
                    Some(owner) => (arguments[owner].spec.dest().to_string(), &mut arguments[owner].flags),
                    None => ("help".to_string(), &mut help_flags),
                };
                list.retain(|f| f != flag);
                tracing::debug!(
                    task = task,
                    flag = flag.as_str(),
                    from = losing.as_str(),
                    to = spec.dest(),
                    "Flag taken over by a later argument"
                );
            }
        }

        arguments.push(CompiledArgument {
            spec: spec.clone(),
            flags,
        });
    }

    (arguments, help_flags)
}

fn looks_like_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && !is_negative_number(token)
}

fn is_negative_number(token: &str) -> bool {
    token.strip_prefix('-').is_some_and(|digits| {
        digits.chars().any(|c| c.is_ascii_digit())
            && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
    })
}

/// Leftover positional tokens (a suffix of the positional stream) merged
/// with the unknown flags by their original index
fn in_command_line_order(
    leftover: Vec<String>,
    positions: &[usize],
    strays: Vec<(usize, String)>,
) -> Vec<String> {
    let offset = positions.len().saturating_sub(leftover.len());
    let mut tokens: Vec<(usize, String)> = leftover
        .into_iter()
        .enumerate()
        .map(|(i, token)| (positions.get(offset + i).copied().unwrap_or(usize::MAX), token))
        .collect();
    tokens.extend(strays);
    tokens.sort_by_key(|(position, _)| *position);
    tokens.into_iter().map(|(_, token)| token).collect()
}

fn flagged(mut arg: Arg, flags: &[String]) -> Arg {
    let mut has_short = false;
    let mut has_long = false;
    for flag in flags {
        if let Some(long) = flag.strip_prefix("--") {
            arg = if has_long {
                arg.visible_alias(long.to_string())
            } else {
                arg.long(long.to_string())
            };
            has_long = true;
        } else if let Some(short) = flag.strip_prefix('-').and_then(|s| s.chars().next()) {
            arg = if has_short {
                arg.visible_short_alias(short)
            } else {
                arg.short(short)
            };
            has_short = true;
        }
    }
    arg
}

fn optional_arg(argument: &CompiledArgument) -> Arg {
    let spec = &argument.spec;
    let mut arg = Arg::new(spec.dest().to_string()).required(spec.is_required());

    arg = match spec.get_action() {
        Action::StoreTrue => arg.action(ArgAction::SetTrue),
        Action::StoreFalse => arg.action(ArgAction::SetFalse),
        Action::Append => arg
            .action(ArgAction::Append)
            .num_args(1)
            .allow_negative_numbers(true)
            .value_name(metavar(spec))
            .value_parser(clap::value_parser!(String)),
        Action::Store | Action::Remainder => arg
            .action(ArgAction::Set)
            .num_args(1)
            .allow_negative_numbers(true)
            .value_name(metavar(spec))
            .value_parser(clap::value_parser!(String)),
    };

    if let Some(help) = help_line(spec) {
        arg = arg.help(help);
    }
    if spec.group_name() != DEFAULT_GROUP {
        arg = arg.help_heading(spec.group_name().to_string());
    }

    flagged(arg, &argument.flags)
}

fn metavar(spec: &ArgumentSpec) -> String {
    spec.dest().to_uppercase()
}

/// Help text with the default and the choices appended
fn help_line(spec: &ArgumentSpec) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(help) = spec.help_text() {
        parts.push(help.to_string());
    }
    if let Some(choices) = spec.choice_values() {
        parts.push(format!("[choices: {}]", choice_list(choices)));
    }
    match spec.default_value() {
        Some(default) if !spec.get_action().is_flag() && !default.is_none() => {
            parts.push(format!("[default: {}]", default));
        }
        _ => {}
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn choice_list(choices: &[Value]) -> String {
    choices
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn usage_line(
    prog: &str,
    task: &str,
    arguments: &[CompiledArgument],
    help_flags: &[String],
    variadic: Option<&str>,
) -> String {
    let mut parts = vec![prog.to_string(), task.to_string()];
    if let Some(flag) = help_flags.first() {
        parts.push(format!("[{}]", flag));
    }

    let optionals = arguments.iter().filter(|a| !a.flags.is_empty());
    let (required, optional): (Vec<_>, Vec<_>) = optionals.partition(|a| a.spec.is_required());
    if !optional.is_empty() {
        parts.push("[OPTIONS]".to_string());
    }
    for argument in required {
        parts.push(format!("{} <{}>", argument.flags[0], metavar(&argument.spec)));
    }

    for argument in arguments.iter().filter(|a| a.spec.is_positional()) {
        let name = argument.spec.display_name();
        parts.push(match argument.spec.get_action() {
            Action::Remainder => format!("[{}]...", name),
            _ if argument.spec.is_required() => format!("<{}>", name),
            _ => format!("[{}]", name),
        });
    }
    if let Some(variadic) = variadic {
        parts.push(format!("[{}]...", variadic));
    }

    parts.join(" ")
}

/// "Arguments:" sections for positionals, one per group
fn positional_help(arguments: &[CompiledArgument]) -> String {
    let mut groups: Vec<(&str, Vec<&ArgumentSpec>)> = Vec::new();
    for spec in arguments.iter().map(|a| &a.spec).filter(|s| s.is_positional()) {
        match groups.iter_mut().find(|(group, _)| *group == spec.group_name()) {
            Some((_, specs)) => specs.push(spec),
            None => groups.push((spec.group_name(), vec![spec])),
        }
    }
    // The general group always comes first
    groups.sort_by_key(|(group, _)| *group != DEFAULT_GROUP);

    let width = groups
        .iter()
        .flat_map(|(_, specs)| specs.iter().map(|s| s.display_name().len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (group, specs) in groups {
        if group == DEFAULT_GROUP {
            out.push_str("Arguments:\n");
        } else {
            out.push_str(&format!("{} arguments:\n", group));
        }
        for spec in specs {
            let name = spec.display_name();
            match help_line(spec) {
                Some(help) => out.push_str(&format!("  {:<width$}  {}\n", name, help, width = width)),
                None => out.push_str(&format!("  {}\n", name)),
            }
        }
        out.push('\n');
    }
    out
}

/// Maps a clap error onto the dispatch error taxonomy
pub(crate) fn clap_error(
    error: clap::Error,
    context: &UsageContext,
    display: impl Fn(&str) -> String,
) -> DispatchError {
    let context = context.clone();
    match error.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            DispatchError::Help(error.render().to_string())
        }
        ErrorKind::MissingRequiredArgument => {
            let names = context_strings(&error, ContextKind::InvalidArg)
                .into_iter()
                .map(|raw| display(&raw))
                .collect();
            DispatchError::MissingArguments { names, context }
        }
        ErrorKind::UnknownArgument => DispatchError::UnrecognizedArguments {
            tokens: context_strings(&error, ContextKind::InvalidArg),
            context,
        },
        ErrorKind::InvalidValue | ErrorKind::ValueValidation => DispatchError::InvalidValue {
            message: first_line(&error),
            context,
        },
        _ => DispatchError::Usage {
            message: first_line(&error),
            context,
        },
    }
}

fn context_strings(error: &clap::Error, kind: ContextKind) -> Vec<String> {
    match error.get(kind) {
        Some(ContextValue::String(value)) => vec![value.clone()],
        Some(ContextValue::Strings(values)) => values.clone(),
        _ => Vec::new(),
    }
}

/// `--answer <ANSWER>` → the argument's display name (`-a/--answer`)
fn display_for_flag(raw: &str, arguments: &[CompiledArgument]) -> String {
    let flag = raw.split_whitespace().next().unwrap_or(raw);
    arguments
        .iter()
        .find(|a| a.flags.iter().any(|f| f == flag))
        .map(|a| a.flags.join("/"))
        .unwrap_or_else(|| flag.to_string())
}

fn first_line(error: &clap::Error) -> String {
    let rendered = error.render().to_string();
    let line = rendered.lines().next().unwrap_or_default();
    line.trim_start_matches("error: ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValueType;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn run_specs() -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::new(["origin"]).value_type(ValueType::String),
            ArgumentSpec::new(["destination"]).value_type(ValueType::String),
            ArgumentSpec::new(["-s", "--speed"])
                .default(1)
                .required(false)
                .value_type(ValueType::Integer),
            ArgumentSpec::new(["-q", "--quiet"])
                .default(false)
                .required(false)
                .action(Action::StoreTrue),
        ]
        .into_iter()
        .map(|s| s.resolve().unwrap())
        .collect()
    }

    fn run_parser() -> TaskParser {
        TaskParser::compile("taskr", "run", Some("Run somewhere"), &run_specs(), None)
    }

    #[test]
    fn parses_positionals_and_defaults() {
        let parsed = run_parser().parse(&args(&["tokyo", "osaka"])).unwrap();
        assert_eq!(parsed.get("origin"), Some(&Value::from("tokyo")));
        assert_eq!(parsed.get("destination"), Some(&Value::from("osaka")));
        assert_eq!(parsed.get("speed"), Some(&Value::Int(1)));
        assert_eq!(parsed.get("quiet"), Some(&Value::Bool(false)));
        assert!(parsed.unconsumed().is_empty());
    }

    #[test]
    fn parses_flags_anywhere() {
        let parsed = run_parser()
            .parse(&args(&["-q", "tokyo", "--speed", "10", "osaka"]))
            .unwrap();
        assert_eq!(parsed.get("speed"), Some(&Value::Int(10)));
        assert_eq!(parsed.get("quiet"), Some(&Value::Bool(true)));
        assert_eq!(parsed.get("destination"), Some(&Value::from("osaka")));
    }

    #[test]
    fn leftover_tokens_are_unconsumed() {
        let parsed = run_parser()
            .parse(&args(&["tokyo", "osaka", "--speed", "100", "56"]))
            .unwrap();
        assert_eq!(parsed.unconsumed(), &["56".to_string()]);
    }

    #[test]
    fn missing_positionals_are_named() {
        let err = run_parser().parse(&args(&["tokyo"])).unwrap_err();
        assert_eq!(err.to_string(), "the following arguments are required: destination");

        let err = run_parser().parse(&[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the following arguments are required: origin, destination"
        );
    }

    #[test]
    fn invalid_coercion_is_reported() {
        let err = run_parser()
            .parse(&args(&["tokyo", "osaka", "-s", "fast"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "argument -s/--speed: invalid int value: 'fast'");
        assert!(err.is_user_error());
    }

    #[test]
    fn choices_are_enforced() {
        let specs = vec![ArgumentSpec::new(["source"])
            .choices(["Tokyo", "Osaka"])
            .resolve()
            .unwrap()];
        let parser = TaskParser::compile("taskr", "run", None, &specs, None);

        assert!(parser.parse(&args(&["Tokyo"])).is_ok());
        let err = parser.parse(&args(&["Kyoto"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument source: invalid choice: 'Kyoto' (choose from 'Tokyo', 'Osaka')"
        );
    }

    #[test]
    fn optional_positional_before_required() {
        let specs: Vec<_> = vec![
            ArgumentSpec::new(["origin"]).default("Tokyo"),
            ArgumentSpec::new(["destination"]),
        ]
        .into_iter()
        .map(|s| s.resolve().unwrap())
        .collect();
        let parser = TaskParser::compile("taskr", "run", None, &specs, None);

        let parsed = parser.parse(&args(&["osaka"])).unwrap();
        assert_eq!(parsed.get("origin"), Some(&Value::from("Tokyo")));
        assert_eq!(parsed.get("destination"), Some(&Value::from("osaka")));

        let parsed = parser.parse(&args(&["kyoto", "osaka"])).unwrap();
        assert_eq!(parsed.get("origin"), Some(&Value::from("kyoto")));
        assert_eq!(parsed.get("destination"), Some(&Value::from("osaka")));
    }

    #[test]
    fn remainder_leaves_tokens_for_later_required() {
        let specs: Vec<_> = vec![
            ArgumentSpec::new(["first"]),
            ArgumentSpec::new(["middle"]).action(Action::Remainder),
            ArgumentSpec::new(["last"]),
        ]
        .into_iter()
        .map(|s| s.resolve().unwrap())
        .collect();
        let parser = TaskParser::compile("taskr", "span", None, &specs, None);

        let parsed = parser.parse(&args(&["a", "b", "c", "d"])).unwrap();
        assert_eq!(parsed.get("first"), Some(&Value::from("a")));
        assert_eq!(parsed.get("middle"), Some(&Value::from(vec!["b", "c"])));
        assert_eq!(parsed.get("last"), Some(&Value::from("d")));
    }

    #[test]
    fn append_collects_occurrences() {
        let specs = vec![ArgumentSpec::new(["-t", "--tag"])
            .action(Action::Append)
            .value_type(ValueType::Integer)
            .resolve()
            .unwrap()];
        let parser = TaskParser::compile("taskr", "tag", None, &specs, None);

        let parsed = parser.parse(&args(&["-t", "1", "--tag", "2"])).unwrap();
        assert_eq!(parsed.get("tag"), Some(&Value::from(vec![1, 2])));

        let parsed = parser.parse(&[]).unwrap();
        assert_eq!(parsed.get("tag"), Some(&Value::None));
    }

    #[test]
    fn repeated_store_keeps_last_value() {
        let parsed = run_parser()
            .parse(&args(&["tokyo", "osaka", "-s", "2", "-s", "3"]))
            .unwrap();
        assert_eq!(parsed.get("speed"), Some(&Value::Int(3)));
    }

    #[test]
    fn later_argument_takes_over_flags() {
        let specs: Vec<_> = vec![
            ArgumentSpec::new(["-s", "--speed"]).default(42),
            ArgumentSpec::new(["-s", "--step-size"]).default(1),
            ArgumentSpec::new(["-h", "--host"]).default("localhost"),
        ]
        .into_iter()
        .map(|s| s.resolve().unwrap())
        .collect();
        let parser = TaskParser::compile("taskr", "run", None, &specs, None);

        assert_eq!(parser.effective_flags("speed"), Some(&["--speed".to_string()][..]));
        assert_eq!(
            parser.effective_flags("step_size"),
            Some(&["-s".to_string(), "--step-size".to_string()][..])
        );

        let parsed = parser.parse(&args(&["-s", "5", "-h", "remote"])).unwrap();
        assert_eq!(parsed.get("step_size"), Some(&Value::from("5")));
        assert_eq!(parsed.get("speed"), Some(&Value::Int(42)));
        assert_eq!(parsed.get("host"), Some(&Value::from("remote")));

        // --help survives the loss of -h
        assert!(matches!(
            parser.parse(&args(&["--help"])),
            Err(DispatchError::Help(_))
        ));
    }

    #[test]
    fn unknown_flags_are_unconsumed() {
        let parsed = run_parser()
            .parse(&args(&["tokyo", "osaka", "--fast"]))
            .unwrap();
        assert_eq!(parsed.unconsumed(), &["--fast".to_string()]);
        assert_eq!(parsed.get("speed"), Some(&Value::Int(1)));
    }

    #[test]
    fn unconsumed_tokens_keep_command_line_order() {
        let parsed = run_parser()
            .parse(&args(&["tokyo", "--fast", "osaka", "56", "-q", "--via=kyoto"]))
            .unwrap();
        assert_eq!(parsed.get("destination"), Some(&Value::from("osaka")));
        assert_eq!(parsed.get("quiet"), Some(&Value::Bool(true)));
        assert_eq!(parsed.unconsumed(), &args(&["--fast", "56", "--via=kyoto"]));

        let parsed = run_parser()
            .parse(&args(&["tokyo", "osaka", "56", "-x"]))
            .unwrap();
        assert_eq!(parsed.unconsumed(), &args(&["56", "-x"]));
    }

    #[test]
    fn known_flag_forms_are_not_unconsumed() {
        let parsed = run_parser()
            .parse(&args(&["tokyo", "osaka", "--speed=7", "-qs3"]))
            .unwrap();
        assert!(parsed.unconsumed().is_empty());
        assert_eq!(parsed.get("speed"), Some(&Value::Int(3)));
        assert_eq!(parsed.get("quiet"), Some(&Value::Bool(true)));
    }

    #[test]
    fn tokens_after_double_dash_are_positional() {
        let parsed = run_parser()
            .parse(&args(&["tokyo", "--", "--osaka"]))
            .unwrap();
        assert_eq!(parsed.get("destination"), Some(&Value::from("--osaka")));
        assert!(parsed.unconsumed().is_empty());
    }

    #[test]
    fn required_optional_is_reported() {
        let specs = vec![ArgumentSpec::new(["-a", "--answer"])
            .required(true)
            .resolve()
            .unwrap()];
        let parser = TaskParser::compile("taskr", "ask", None, &specs, None);
        let err = parser.parse(&[]).unwrap_err();
        assert_eq!(err.to_string(), "the following arguments are required: -a/--answer");
    }

    #[test]
    fn negative_numbers_are_positional_tokens() {
        let specs = vec![ArgumentSpec::new(["offset"])
            .value_type(ValueType::Integer)
            .resolve()
            .unwrap()];
        let parser = TaskParser::compile("taskr", "shift", None, &specs, None);
        let parsed = parser.parse(&args(&["-5"])).unwrap();
        assert_eq!(parsed.get("offset"), Some(&Value::Int(-5)));
    }

    #[test]
    fn usage_and_help() {
        let parser = TaskParser::compile("taskr", "fly", None, &run_specs()[..2], Some("args"));
        assert_eq!(
            parser.context().usage,
            "Usage: taskr fly [-h] <origin> <destination> [args]..."
        );

        let help = run_parser().render_help();
        assert!(help.contains("Run somewhere"));
        assert!(help.contains("Arguments:"));
        assert!(help.contains("--speed <SPEED>"));
        assert!(help.contains("[default: 1]"));
    }

    #[test]
    fn groups_get_their_own_heading() {
        let specs = vec![
            ArgumentSpec::new(["source"]).group("places").resolve().unwrap(),
            ArgumentSpec::new(["--vehicle"]).group("transport").resolve().unwrap(),
        ];
        let help = TaskParser::compile("taskr", "run", None, &specs, None).render_help();
        assert!(help.contains("places arguments:"));
        assert!(help.contains("transport:"));
    }
}
