use chrono::Local;
use clap::Args;
use coherence_bench::{AccessPattern, CorePlan, DelayMode, HarnessConfig};
use num_format::{CustomFormat, Grouping, ToFormattedString};

/// Options shared by every subcommand that measures.
#[derive(Args, Debug)]
pub(super) struct CommonArgs {
    /// Timed operations per thread and phase
    #[arg(short, long, default_value_t = 1_000_000)]
    pub repetitions: u64,

    /// Whether all threads target word 0 (shared) or word thread*stride (not-shared)
    #[arg(short, long, default_value_t = AccessPattern::NotShared)]
    pub pattern: AccessPattern,

    /// How the pause between repetitions is produced: spin, jittered-spin or jittered-sleep
    #[arg(long, default_value_t = DelayMode::Spin)]
    pub delay_mode: DelayMode,

    /// Comparand of compare-and-swap; anything but 0 makes every CAS fail
    #[arg(long, default_value_t = coherence_bench::DEFAULT_VALUE, allow_negative_numbers = true)]
    pub cas_expected: i64,

    /// Comma-separated core ids to pin threads to, all available cores by default
    #[arg(short, long, value_delimiter = ',')]
    pub cores: Vec<usize>,
}

impl CommonArgs {
    pub(super) fn apply(&self, config: &mut HarnessConfig) {
        config.repetitions = self.repetitions;
        config.pattern = self.pattern;
        config.delay_mode = self.delay_mode;
        config.cas_expected = self.cas_expected;
    }

    pub(super) fn core_plan(&self) -> anyhow::Result<CorePlan> {
        if self.cores.is_empty() {
            CorePlan::detect()
        } else {
            CorePlan::from_ids(self.cores.clone())
        }
    }
}

pub(super) fn grouped(x: u64) -> String {
    let fmt = CustomFormat::builder()
        .grouping(Grouping::Standard)
        .separator("_")
        .build()
        .unwrap();
    x.to_formatted_string(&fmt)
}

pub(super) fn local_time() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}
