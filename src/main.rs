use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use attrition::api::{run, Cli};
use attrition::common::log;

fn main() -> ExitCode {
    let cli = Cli::parse();
    log::init(cli.verbose);

    let stage = cli.command.name();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(stage, code = err.code().as_str(), error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(err.code().exit_code())
        }
    }
}
