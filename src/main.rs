mod args;
mod commands;
mod pigeon;
mod shared;

use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env, Target};

use args::{AppCommand, Cli};
use commands::{run_mode, run_reset};

// Top-level entrypoint: set up logging, parse CLI args and dispatch to a command module.
fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        AppCommand::Run(args) => run_mode(args),
        AppCommand::Reset(args) => run_reset(args),
    }
}
