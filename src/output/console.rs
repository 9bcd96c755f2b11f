use super::ResultSink;
use crate::{
    aggregator::AggregateSummary,
    coherence::state_label,
    config::{Configuration, SweepKind},
    runner::RunReport,
};
use anyhow::Result;

/// Human-readable progress on stdout. Not meant for parsing.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    /// Sum of the per-thread averages of the running phase.
    averages_sum: f64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for ConsoleSink {
    fn sample(&mut self, cfg: &Configuration, thread: usize, report: &RunReport) -> Result<()> {
        self.averages_sum += report.average_ns();
        println!(
            "THREAD {}: Avg time ({}) {:.2} ns",
            thread,
            state_label(cfg.state),
            report.average_ns()
        );
        Ok(())
    }

    fn record(&mut self, _sweep: Option<SweepKind>, _summary: &AggregateSummary) -> Result<()> {
        Ok(())
    }

    fn phase_end(
        &mut self,
        sweep: Option<SweepKind>,
        cfg: &Configuration,
        summaries: &[AggregateSummary],
    ) -> Result<()> {
        let sweep = sweep.map_or("single", SweepKind::name);
        println!("[{}] {}", sweep, cfg);
        for summary in summaries {
            println!(
                "    word {:<5} threads {:<3} avg {:>10.2} ns",
                summary.key.word, summary.record.contributors, summary.average_ns
            );
        }
        println!("    sum of thread averages {:.2} ns", self.averages_sum);
        self.averages_sum = 0.0;
        Ok(())
    }
}
