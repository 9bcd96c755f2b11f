//! Thread-to-core pinning.
//!
//! Coherence states are only meaningful if the measurement and preparation
//! threads run on different physical cores, so every failure here is fatal
//! for the phase that asked for it.
use anyhow::{anyhow, bail, ensure, Result};
use core_affinity::CoreId;
use tracing::debug;

/// Cores the current process may run on.
#[derive(Clone, Debug)]
pub struct CorePlan {
    cores: Vec<CoreId>,
}

impl CorePlan {
    /// Queries the cores available to this process.
    pub fn detect() -> Result<Self> {
        let cores = core_affinity::get_core_ids()
            .ok_or_else(|| anyhow!("core_affinity::get_core_ids() failed"))?;
        Self::from_ids(cores.into_iter().map(|x| x.id).collect())
    }

    /// Uses the given core ids, in order. Every id may appear only once.
    pub fn from_ids(ids: Vec<usize>) -> Result<Self> {
        if ids.is_empty() {
            bail!("No cores available for pinning");
        }
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
            bail!("Core {} is listed more than once", w[0]);
        }
        Ok(Self {
            cores: ids.into_iter().map(|id| CoreId { id }).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.cores.iter().map(|x| x.id)
    }

    /// Core of measurement thread `thread`: `thread mod available cores`.
    pub fn measurement_core(&self, thread: usize) -> CoreId {
        self.cores[thread % self.cores.len()]
    }

    /// Core of the preparation thread serving measurement thread `thread`.
    ///
    /// Measurement threads of a phase with preparation take the first
    /// `threads` cores and preparation threads the next `threads`, so no
    /// spinning thread ever shares a core with another one. Fails if the plan
    /// has fewer than `2 * threads` cores.
    pub fn preparation_core(&self, thread: usize, threads: usize) -> Result<CoreId> {
        self.check_preparation(threads)?;
        ensure!(
            thread < threads,
            "Thread {} is outside of a phase with {} threads",
            thread,
            threads
        );
        let meas = self.measurement_core(thread);
        let prep = self.cores[threads + thread];
        ensure!(
            prep.id != meas.id,
            "Preparation and measurement threads would share core {}",
            prep.id
        );
        Ok(prep)
    }

    /// Fails unless `threads` measurement threads and as many preparation
    /// threads can all run on distinct cores.
    pub fn check_preparation(&self, threads: usize) -> Result<()> {
        let n = self.cores.len();
        let needed = threads.saturating_mul(2).max(2);
        if n < needed {
            bail!(
                "Coherence states need two distinct cores per measurement thread: \
                 {} threads need {} cores, only {} available",
                threads,
                needed,
                n
            );
        }
        Ok(())
    }
}

/// Pins the calling thread to `core`.
pub fn pin_current(core: CoreId) -> Result<()> {
    if !core_affinity::set_for_current(core) {
        bail!(
            "core_affinity::set_for_current() failed to pin thread to core {}",
            core.id
        );
    }
    debug!(core = core.id, "pinned thread");
    Ok(())
}
