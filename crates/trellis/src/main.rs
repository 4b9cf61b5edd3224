mod args;
mod cli;
mod commands;
mod diagnostics;
mod exit;
mod logging;
mod walk;

use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match cli::run(args) {
        Ok(exit) => exit.report(),
        Err(err) => {
            eprintln!("Error: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("Caused by: {cause}");
            }
            ExitCode::FAILURE
        }
    }
}
