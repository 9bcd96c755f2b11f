use crate::util::{grouped, local_time, CommonArgs};
use anyhow::Context;
use clap::Args;
use coherence_bench::{
    CoherenceState, ConsoleSink, Harness, HarnessConfig, OpKind, SweepKind, SweepRange,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(super) struct SweepArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory the .tsv result files are appended to
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Comma-separated sweeps to run: threads, delay, stride, states; all by default
    #[arg(short, long, value_delimiter = ',')]
    sweeps: Vec<SweepKind>,

    /// Comma-separated operations: cas, swap, fetch_add, load, store; all by default
    #[arg(long, value_delimiter = ',')]
    ops: Vec<OpKind>,

    /// Thread counts of the thread sweep, as start..end[:step]
    #[arg(long, default_value = "1..8")]
    threads: SweepRange,

    /// Delays of the delay sweep, as start..end[:step]
    #[arg(long, default_value = "0..1000:100")]
    delays: SweepRange,

    /// Strides (in 8-byte words) of the stride sweep, as start..end[:step]
    #[arg(long, default_value = "1..16")]
    strides: SweepRange,

    /// Thread count used by every sweep but the thread sweep
    #[arg(long, default_value_t = 1)]
    threads_fixed: usize,

    /// Delay used by every sweep but the delay sweep
    #[arg(long, default_value_t = 0)]
    delay_fixed: u64,

    /// Stride used by every sweep but the stride sweep
    #[arg(long, default_value_t = 8)]
    stride_fixed: usize,

    /// Coherence state induced before each operation (M, E, S or I) in the
    /// thread, delay and stride sweeps; uncontrolled by default
    #[arg(long)]
    state: Option<CoherenceState>,
}

pub(super) fn run_sweep(args: SweepArgs) -> anyhow::Result<()> {
    let mut config = HarnessConfig {
        threads: args.threads,
        delays: args.delays,
        strides: args.strides,
        threads_fixed: args.threads_fixed,
        delay_fixed: args.delay_fixed,
        stride_fixed: args.stride_fixed,
        state: args.state,
        output_dir: Some(args.output.clone()),
        ..Default::default()
    };
    if !args.ops.is_empty() {
        config.ops = args.ops;
    }
    if !args.sweeps.is_empty() {
        config.sweeps = args.sweeps;
    }
    args.common.apply(&mut config);

    let cores = args.common.core_plan()?;
    let harness = Harness::with_cores(config, cores).context("Invalid sweep configuration")?;

    println!("Started at {}", local_time());
    println!(
        "Repetitions per thread and phase: {}",
        grouped(harness.config().repetitions)
    );
    println!("Pinning to {} cores", harness.cores().len());

    let timer = std::time::Instant::now();
    harness.run_enabled(&mut ConsoleSink::new())?;
    println!(
        "Finished sweeps in {:.1} secs, results in {}",
        timer.elapsed().as_secs_f64(),
        args.output.display()
    );
    Ok(())
}
