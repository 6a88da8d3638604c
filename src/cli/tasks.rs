//! Demo tasks shipped with the `taskr` binary
//!
//! | Task | Shows |
//! |------|-------|
//! | `run` | grouped overrides, choices, a typed flag taking over `-s` |
//! | `fly` | variadic positionals (main task) |
//! | `sleep` | namespace passing with manual positionals |
//! | `abort` | exit-code propagation through [`TaskExit`] |

use anyhow::Result;

use crate::domain::{ArgumentSpec, Callable, FnTask, Signature, TaskExit, Value, ValueType};
use crate::runner::{Task, TaskManager};

/// Registers the demo tasks with `manager`
pub fn register(manager: &mut TaskManager) -> Result<()> {
    Task::builder(run())
        .with_group_argument(
            "places",
            ArgumentSpec::new(["source"])
                .help("The source where you come from")
                .choices(["Tokyo", "Osaka"]),
        )
        .with_group_argument("places", ArgumentSpec::new(["destination"]))
        .with_argument(
            ArgumentSpec::new(["--speed", "-s"])
                .help("The speed you wanna run")
                .value_type(ValueType::Integer)
                .default(42)
                .destination("speed"),
        )
        .register(manager)?;

    manager.set_main(fly())?;

    Task::builder(sleep())
        .pass_namespace()
        .with_argument(ArgumentSpec::new(["start_time"]))
        .with_argument(ArgumentSpec::new(["end_time"]))
        .register(manager)?;

    manager.register(abort())?;
    Ok(())
}

fn run() -> impl Callable {
    FnTask::new(
        "run",
        Signature::new()
            .required("source")
            .required("destination")
            .optional("vehicle", "car")
            .optional("speed", 42)
            .optional("step_size", 1),
        |args| {
            Ok(Value::from(format!(
                "Run from {} to {} by vehicle={} speed={} and step={}",
                args.arg(0),
                args.arg(1),
                args.get("vehicle"),
                args.get("speed"),
                args.get("step_size"),
            )))
        },
    )
    .with_about("Run from one place to another")
}

fn fly() -> impl Callable {
    FnTask::new(
        "fly",
        Signature::new()
            .required("origin")
            .required("destination")
            .var_positional("args"),
        |args| {
            let mut message = format!("Fly from {} to {}", args.arg(0), args.arg(1));
            let stops = args.rest(2);
            if !stops.is_empty() {
                let stops: Vec<String> = stops.iter().map(Value::to_string).collect();
                message.push_str(&format!(" via {}", stops.join(", ")));
            }
            Ok(Value::from(message))
        },
    )
    .with_about("Fly between two places, optionally with stops")
}

fn sleep() -> impl Callable {
    FnTask::new("sleep", Signature::new(), |args| {
        Ok(Value::from(format!(
            "Sleep from {} to {}",
            args.get("start_time"),
            args.get("end_time")
        )))
    })
    .with_about("Sleep for a while")
}

fn abort() -> impl Callable {
    FnTask::new("abort", Signature::new().optional("code", 3), |args| {
        let code = args.get("code").as_int().unwrap_or(3);
        let code = i32::try_from(code).unwrap_or(i32::MAX);
        Err(TaskExit::new(code).into())
    })
    .with_about("Exit with the given status")
}
