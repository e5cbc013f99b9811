use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "revdoc",
    about = "Revdoc: offline-first synchronized documents",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a replica scenario and print every replica's final state
    Simulate(SimulateArgs),
    /// Run a scenario, then replay each replica's log and check convergence
    Verify(VerifyArgs),
    /// Run a scenario and print one replica's change log
    Log(LogArgs),
    /// Show a persisted document
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,
    /// Persist every replica into this directory afterwards
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,
}

#[derive(Args)]
pub struct LogArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,
    /// Replica whose log to print
    #[arg(short, long, default_value = "authority")]
    pub replica: String,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Document file written by `simulate --save`
    pub path: PathBuf,
}
