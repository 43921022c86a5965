use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::DEFAULT_FILE;

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge declared resources: plan, preview, apply, destroy", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Declaration file
    #[arg(short, long, global = true, env = "KEEL_FILE", default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    /// State database (defaults to the declaration's settings, then the state directory)
    #[arg(long, global = true, env = "KEEL_STATE")]
    pub state: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what `up` would change, without calling any provider
    Preview {
        /// Show input diffs for changed resources
        #[arg(short, long)]
        diff: bool,

        /// Print the preview as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create, update, replace and delete resources to match the declaration
    Up(ApplyArgs),

    /// Delete every resource recorded in state
    Destroy {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and edit recorded state
    #[command(subcommand)]
    State(StateCommand),

    /// Print stack outputs from recorded state
    Outputs {
        /// Print outputs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Resources provisioned concurrently within a batch
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Show input diffs for changed resources
    #[arg(short, long)]
    pub diff: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// State Commands
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resources
    List,

    /// Show one recorded resource
    Show {
        /// Logical name of the resource
        name: String,
    },

    /// Forget a resource without deleting it
    Rm {
        /// Logical name of the resource
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["keel", "up", "--yes", "-j", "2", "-f", "demo.toml", "-vv"])
            .unwrap();
        assert_eq!(cli.file, PathBuf::from("demo.toml"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Up(args) => {
                assert!(args.yes);
                assert_eq!(args.jobs, Some(2));
            }
            _ => panic!("expected up"),
        }
    }

    #[test]
    fn test_state_rm() {
        let cli = Cli::try_parse_from(["keel", "state", "rm", "app-ecr", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::State(StateCommand::Rm { ref name, yes: true }) if name == "app-ecr"
        ));
    }
}
