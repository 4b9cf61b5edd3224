use anyhow::Result;
use clap::Parser;

use crate::args::Args;
use crate::commands::debug_requested;
use crate::commands::Command;
use crate::commands::TrellisCommand;
use crate::exit::Exit;
use crate::logging;

/// Check, inspect and resolve view markup.
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: TrellisCommand,

    #[command(flatten)]
    pub args: Args,
}

/// Parse CLI arguments and execute the chosen command
pub fn run(args: Vec<String>) -> Result<Exit> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    logging::init_tracing(&cli.args.global, debug_requested());
    cli.command.execute(&cli.args)
}
