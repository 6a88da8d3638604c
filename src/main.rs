//! taskr - declarative task runner (demo binary)

use std::process::ExitCode;

use taskr::runner::DispatchError;

fn main() -> ExitCode {
    match taskr::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<DispatchError>() {
                Some(dispatch) => taskr::cli::exit_code(dispatch.exit_code()),
                None => ExitCode::FAILURE,
            }
        }
    }
}
