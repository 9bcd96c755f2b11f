mod cores;
mod measure;
mod sweep;
mod util;

use clap::{Parser, Subcommand};
use cores::{run_cores, CoresArgs};
use measure::{run_measure, MeasureArgs};
use sweep::{run_sweep, SweepArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about)]
struct CLIParser {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Sweep thread counts, delays, strides and coherence states and write the averages to .tsv files
    Sweep(SweepArgs),
    /// Time one operation in every coherence state (M, E, S, I) and print the averages
    Measure(MeasureArgs),
    /// List the cores threads can be pinned to
    Cores(CoresArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CLIParser::parse();

    match args.action {
        Action::Sweep(args) => run_sweep(args),
        Action::Measure(args) => run_measure(args),
        Action::Cores(args) => run_cores(args),
    }
}
