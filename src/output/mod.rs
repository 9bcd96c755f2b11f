//! Collaborators that receive measurement results: console and result files.
mod console;
mod tsv;

pub use console::ConsoleSink;
pub use tsv::TsvSink;

use crate::{
    aggregator::AggregateSummary,
    config::{Configuration, SweepKind},
    runner::RunReport,
};
use anyhow::Result;

/// Receiver of everything a harness measures.
///
/// `sweep` is `None` for phases run on their own, outside of any sweep.
pub trait ResultSink {
    /// A measurement thread finished its run.
    fn sample(&mut self, _cfg: &Configuration, _thread: usize, _report: &RunReport) -> Result<()> {
        Ok(())
    }

    /// One aggregated bucket of a finished phase.
    fn record(&mut self, sweep: Option<SweepKind>, summary: &AggregateSummary) -> Result<()>;

    /// Every bucket of the phase has been passed to [`ResultSink::record`].
    fn phase_end(
        &mut self,
        _sweep: Option<SweepKind>,
        _cfg: &Configuration,
        _summaries: &[AggregateSummary],
    ) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
impl ResultSink for () {
    fn record(&mut self, _sweep: Option<SweepKind>, _summary: &AggregateSummary) -> Result<()> {
        Ok(())
    }
}

impl<T: ResultSink + ?Sized> ResultSink for &mut T {
    fn sample(&mut self, cfg: &Configuration, thread: usize, report: &RunReport) -> Result<()> {
        (**self).sample(cfg, thread, report)
    }

    fn record(&mut self, sweep: Option<SweepKind>, summary: &AggregateSummary) -> Result<()> {
        (**self).record(sweep, summary)
    }

    fn phase_end(
        &mut self,
        sweep: Option<SweepKind>,
        cfg: &Configuration,
        summaries: &[AggregateSummary],
    ) -> Result<()> {
        (**self).phase_end(sweep, cfg, summaries)
    }
}

/// Forwards to both sinks, first `A` then `B`.
impl<A: ResultSink, B: ResultSink> ResultSink for (A, B) {
    fn sample(&mut self, cfg: &Configuration, thread: usize, report: &RunReport) -> Result<()> {
        self.0.sample(cfg, thread, report)?;
        self.1.sample(cfg, thread, report)
    }

    fn record(&mut self, sweep: Option<SweepKind>, summary: &AggregateSummary) -> Result<()> {
        self.0.record(sweep, summary)?;
        self.1.record(sweep, summary)
    }

    fn phase_end(
        &mut self,
        sweep: Option<SweepKind>,
        cfg: &Configuration,
        summaries: &[AggregateSummary],
    ) -> Result<()> {
        self.0.phase_end(sweep, cfg, summaries)?;
        self.1.phase_end(sweep, cfg, summaries)
    }
}

/// Collects everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub samples: Vec<(Configuration, usize, RunReport)>,
    pub records: Vec<(Option<SweepKind>, AggregateSummary)>,
    pub phases: usize,
}

impl ResultSink for MemorySink {
    fn sample(&mut self, cfg: &Configuration, thread: usize, report: &RunReport) -> Result<()> {
        self.samples.push((*cfg, thread, *report));
        Ok(())
    }

    fn record(&mut self, sweep: Option<SweepKind>, summary: &AggregateSummary) -> Result<()> {
        self.records.push((sweep, *summary));
        Ok(())
    }

    fn phase_end(
        &mut self,
        _sweep: Option<SweepKind>,
        _cfg: &Configuration,
        _summaries: &[AggregateSummary],
    ) -> Result<()> {
        self.phases += 1;
        Ok(())
    }
}
