//! Developer CLI for Aqueduct.

mod replay;

use clap::{Parser, Subcommand};
use color_eyre::{config::HookBuilder, eyre::Result};

#[derive(Parser)]
#[command(name = "aqueduct")]
#[command(about = "CLI of Aqueduct", long_about = None)]
#[command(version, author)]
struct Cli {
    /// Increase output verbosity (-v, -vv); `AQUEDUCT_LOG` still takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines host message log and print what gets mounted and sent
    Replay(replay::ReplayArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    HookBuilder::default()
        .display_env_section(false)
        .panic_section("It looks like the Aqueduct CLI encountered a bug")
        .install()?;

    match cli.command {
        Commands::Replay(args) => replay::run(args, cli.verbose),
    }
}
