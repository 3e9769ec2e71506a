use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match tinyrpcd::run_server() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr();
            drop(writeln!(stderr, "tinyrpcd: {error}"));
            ExitCode::FAILURE
        }
    }
}
