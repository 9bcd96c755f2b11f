//! The sweep driver: runs phases on pinned threads and exports their results.
use crate::{
    affinity::{pin_current, CorePlan},
    aggregator::{AggregateSummary, ResultAggregator},
    barrier::ReusableBarrier,
    cells::CellRegistry,
    coherence::{CoherenceState, Handshake, Inducer},
    config::{Configuration, HarnessConfig, SweepKind},
    delay::Delay,
    output::{ResultSink, TsvSink},
    runner::{run_timed, RunReport, TimedRun},
};
use anyhow::{anyhow, bail, ensure, Result};
use core_affinity::CoreId;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, ScopedJoinHandle},
};
use tracing::{debug, info, warn};

/// A benchmark session.
///
/// Owns every piece of state the measurement threads share: the cells, the
/// barrier and the result table. Nothing is global, so independent harnesses
/// can run side by side (on disjoint cores, if the numbers are to mean
/// anything).
pub struct Harness {
    config: HarnessConfig,
    cells: CellRegistry,
    barrier: ReusableBarrier,
    aggregator: ResultAggregator,
    cores: CorePlan,
}

impl Harness {
    /// Creates a harness that may use every core available to the process.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        Self::with_cores(config, CorePlan::detect()?)
    }

    pub fn with_cores(config: HarnessConfig, cores: CorePlan) -> Result<Self> {
        config.validate()?;
        let cells = CellRegistry::new(
            config.words_needed()?,
            config.max_threads(),
            config.cas_expected,
        );
        Ok(Self {
            config,
            cells,
            barrier: ReusableBarrier::new(1),
            aggregator: ResultAggregator::new(),
            cores,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn cells(&self) -> &CellRegistry {
        &self.cells
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub fn cores(&self) -> &CorePlan {
        &self.cores
    }

    /// Runs every sweep enabled in the configuration, in order.
    ///
    /// If the configuration names an output directory, the results are also
    /// appended to .tsv files there.
    pub fn run_enabled<S: ResultSink>(&self, sink: &mut S) -> Result<()> {
        self.check_sweeps()?;
        match &self.config.output_dir {
            Some(dir) => {
                let mut tsv = TsvSink::new(dir)?;
                self.run_sweeps(&mut (sink, &mut tsv))
            }
            None => self.run_sweeps(sink),
        }
    }

    fn run_sweeps<S: ResultSink>(&self, sink: &mut S) -> Result<()> {
        for &sweep in &self.config.sweeps {
            self.run_sweep(sweep, sink)?;
        }
        Ok(())
    }

    /// Fails if some phase of the enabled sweeps can not place its
    /// preparation threads, before anything is measured.
    pub fn check_sweeps(&self) -> Result<()> {
        let widest = self
            .config
            .sweeps
            .iter()
            .flat_map(|&sweep| self.config.configurations(sweep))
            .filter(|cfg| cfg.state.is_some_and(CoherenceState::needs_preparation))
            .map(|cfg| cfg.threads)
            .max();
        match widest {
            Some(threads) => self.cores.check_preparation(threads),
            None => Ok(()),
        }
    }

    /// Runs all phases of one sweep, exporting after each of them.
    pub fn run_sweep<S: ResultSink>(&self, sweep: SweepKind, sink: &mut S) -> Result<()> {
        let configurations = self.config.configurations(sweep);
        info!(
            sweep = sweep.name(),
            phases = configurations.len(),
            "starting sweep"
        );
        for cfg in configurations.iter() {
            self.run_phase(cfg, sink)?;
            self.export(Some(sweep), cfg, sink)?;
        }
        Ok(())
    }

    /// Runs a single phase outside of any sweep and exports its buckets.
    pub fn measure<S: ResultSink>(
        &self,
        cfg: &Configuration,
        sink: &mut S,
    ) -> Result<Vec<AggregateSummary>> {
        self.run_phase(cfg, sink)?;
        self.export(None, cfg, sink)
    }

    /// Hands the buckets of `cfg` to `sink` and clears the result table.
    pub fn export<S: ResultSink>(
        &self,
        sweep: Option<SweepKind>,
        cfg: &Configuration,
        sink: &mut S,
    ) -> Result<Vec<AggregateSummary>> {
        let summaries = self
            .aggregator
            .export_and_clear(|key| cfg.matches(key), |x| sink.record(sweep, x))?;
        sink.phase_end(sweep, cfg, &summaries)?;
        Ok(summaries)
    }

    /// Measures one configuration and records the timings into the result table.
    ///
    /// Spawns `cfg.threads` measurement threads pinned to `core = i mod cores`
    /// and, for states that need one, a preparation thread per measurement
    /// thread on a different core. All of them meet at the barrier before the
    /// first timed operation. Returns the report of every measurement thread.
    pub fn run_phase<S: ResultSink>(
        &self,
        cfg: &Configuration,
        sink: &mut S,
    ) -> Result<Vec<RunReport>> {
        cfg.validate()?;
        ensure!(
            cfg.threads <= self.cells.threads(),
            "Phase needs {} threads, harness was built for {}",
            cfg.threads,
            self.cells.threads()
        );

        let threads = cfg.threads;
        let repetitions = self.config.repetitions;
        let preparers = if cfg.state.is_some_and(CoherenceState::needs_preparation) {
            threads
        } else {
            0
        };

        let prep_cores = (0..preparers)
            .map(|i| self.cores.preparation_core(i, threads))
            .collect::<Result<Vec<_>>>()?;
        if threads > self.cores.len() {
            warn!(
                threads,
                cores = self.cores.len(),
                "more measurement threads than cores, some of them share a core"
            );
        }

        let targets = (0..threads)
            .map(|i| self.cells.cell(cfg.target_word(i)))
            .collect::<Result<Vec<_>>>()?;
        let handshakes: Vec<Handshake> = (0..preparers).map(|_| Handshake::new()).collect();
        let mut runs = Vec::with_capacity(threads);
        for (i, &cell) in targets.iter().enumerate() {
            let scratch = self.cells.scratch(i)?;
            runs.push(TimedRun {
                op: cfg.op,
                cell,
                scratch,
                repetitions,
                inducer: Inducer::new(cfg.state, handshakes.get(i))?,
                delay: Delay::new(self.config.delay_mode, cfg.delay, scratch.seed)?,
            });
        }
        let rounds = Inducer::rounds(cfg.state, repetitions);
        let pin_failed = AtomicBool::new(false);

        self.cells.reset_all();
        self.barrier.init(threads + preparers);
        info!(phase = %cfg, repetitions, preparers, "starting phase");

        let reports = thread::scope(|s| -> Result<Vec<RunReport>> {
            let pin_failed = &pin_failed;

            let preparation: Vec<_> = prep_cores
                .iter()
                .zip(handshakes.iter())
                .zip(targets.iter())
                .map(|((&core, handshake), &cell)| {
                    let state = cfg.state;
                    s.spawn(move || -> Result<()> {
                        if self.rendezvous(core, pin_failed)? {
                            if let Some(state) = state {
                                handshake.serve(rounds, cell, state);
                            }
                        }
                        Ok(())
                    })
                })
                .collect();

            let measurement: Vec<_> = runs
                .into_iter()
                .enumerate()
                .map(|(i, run)| {
                    let core = self.cores.measurement_core(i);
                    s.spawn(move || -> Result<Option<RunReport>> {
                        if !self.rendezvous(core, pin_failed)? {
                            return Ok(None);
                        }
                        let report = run_timed(run);
                        self.aggregator
                            .record(cfg.key(i), report.elapsed_ns, report.repetitions);
                        Ok(Some(report))
                    })
                })
                .collect();

            let mut first_error = None;
            for (i, handle) in preparation.into_iter().enumerate() {
                if let Err(e) = join("preparation", i, handle) {
                    first_error.get_or_insert(e);
                }
            }
            let mut reports = Vec::with_capacity(threads);
            for (i, handle) in measurement.into_iter().enumerate() {
                match join("measurement", i, handle) {
                    Ok(Some(report)) => reports.push(report),
                    Ok(None) => {}
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(reports),
            }
        })?;

        if reports.len() != threads {
            bail!("Phase {} was aborted", cfg);
        }
        for (i, report) in reports.iter().enumerate() {
            debug!(
                thread = i,
                elapsed_ns = report.elapsed_ns,
                average_ns = report.average_ns(),
                "measurement thread finished"
            );
            sink.sample(cfg, i, report)?;
        }
        Ok(reports)
    }

    /// Pins the calling thread and waits for the rest of the phase.
    ///
    /// Every thread reaches the barrier even if pinning failed, otherwise the
    /// others would wait forever. Returns `Ok(false)` if some other thread
    /// could not be pinned and the phase must be abandoned.
    fn rendezvous(&self, core: CoreId, pin_failed: &AtomicBool) -> Result<bool> {
        let pinned = pin_current(core);
        if pinned.is_err() {
            pin_failed.store(true, Ordering::Relaxed);
        }
        self.barrier.wait();
        pinned?;
        Ok(!pin_failed.load(Ordering::Relaxed))
    }
}

fn join<T>(role: &str, i: usize, handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{} thread {} panicked", role, i))?
}
