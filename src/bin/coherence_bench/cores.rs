use clap::Args;
use coherence_bench::CorePlan;

#[derive(Args, Debug)]
pub(super) struct CoresArgs {
    /// Print only the number of cores
    #[arg(short, long)]
    count: bool,
}

pub(super) fn run_cores(args: CoresArgs) -> anyhow::Result<()> {
    let plan = CorePlan::detect()?;
    if args.count {
        println!("{}", plan.len());
        return Ok(());
    }
    let ids: Vec<String> = plan.ids().map(|x| x.to_string()).collect();
    println!("{} cores: {}", plan.len(), ids.join(","));
    if plan.len() < 2 {
        println!("Coherence states E, S and I need at least two cores");
    }
    Ok(())
}
