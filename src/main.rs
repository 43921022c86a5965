mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod provider;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Declaration file
    pub file: PathBuf,
    /// State database override
    pub state: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        file: cli.file,
        state: cli.state,
    };

    match cli.command {
        Command::Preview { diff, json } => commands::preview::run(&ctx, diff, json),
        Command::Up(args) => commands::up::run(&ctx, args),
        Command::Destroy { yes, json } => commands::destroy::run(&ctx, yes, json),
        Command::State(cmd) => commands::state::run(&ctx, cmd),
        Command::Outputs { json } => commands::outputs::run(&ctx, json),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "keel", &mut io::stdout());
            Ok(())
        }
    }
}
