use crate::util::{grouped, local_time, CommonArgs};
use clap::Args;
use coherence_bench::{
    state_label, CoherenceState, Configuration, ConsoleSink, Harness, HarnessConfig, OpKind,
    SweepRange,
};

#[derive(Args, Debug)]
pub(super) struct MeasureArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Operation to time: cas, swap, fetch_add, load or store
    #[arg(long, default_value_t = OpKind::CompareAndSwap)]
    op: OpKind,

    /// Number of measurement threads
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Delay between two repetitions
    #[arg(short, long, default_value_t = 0)]
    delay: u64,

    /// Distance (in 8-byte words) between the words of two threads
    #[arg(short, long, default_value_t = 8)]
    stride: usize,

    /// Also time the operation without inducing any state first
    #[arg(short, long)]
    uncontrolled: bool,
}

pub(super) fn run_measure(args: MeasureArgs) -> anyhow::Result<()> {
    let mut config = HarnessConfig {
        threads: SweepRange::single(args.threads as u64),
        threads_fixed: args.threads,
        strides: SweepRange::single(args.stride as u64),
        stride_fixed: args.stride,
        delays: SweepRange::single(args.delay),
        delay_fixed: args.delay,
        ops: vec![args.op],
        ..Default::default()
    };
    args.common.apply(&mut config);
    let harness = Harness::with_cores(config, args.common.core_plan()?)?;

    println!("Started at {}", local_time());
    println!(
        "Timing {} repetitions of {} on {} threads",
        grouped(args.common.repetitions),
        args.op,
        args.threads
    );

    let states = args
        .uncontrolled
        .then_some(None)
        .into_iter()
        .chain(CoherenceState::ALL.map(Some));
    let mut console = ConsoleSink::new();
    for state in states {
        let cfg = Configuration {
            op: args.op,
            state,
            threads: args.threads,
            delay: args.delay,
            stride: args.stride,
            pattern: args.common.pattern,
        };
        let timer = std::time::Instant::now();
        let summaries = harness.measure(&cfg, &mut console)?;
        let elapsed_ns: u64 = summaries.iter().map(|x| x.record.elapsed_ns).sum();
        let samples: u64 = summaries.iter().map(|x| x.record.samples).sum();
        println!(
            "{}: {} ns timed in total, {:.2} ns per operation ({:.1} secs wall)",
            state_label(state),
            grouped(elapsed_ns),
            elapsed_ns as f64 / samples.max(1) as f64,
            timer.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
