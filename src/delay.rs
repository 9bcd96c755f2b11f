use anyhow::{anyhow, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::{fmt, hint, str::FromStr, time::Duration};

/// How the pause between two timed repetitions is produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DelayMode {
    /// Busy loop of exactly `units` iterations.
    #[default]
    Spin,
    /// Busy loop with a normally distributed iteration count around `units`.
    JitteredSpin,
    /// Sleep for a normally distributed number of microseconds around `units`.
    ///
    /// Scheduler wake-up latency dominates the signal in this mode; it is kept
    /// for comparison only.
    JitteredSleep,
}

impl DelayMode {
    pub fn name(self) -> &'static str {
        match self {
            DelayMode::Spin => "spin",
            DelayMode::JitteredSpin => "jittered-spin",
            DelayMode::JitteredSleep => "jittered-sleep",
        }
    }
}

impl fmt::Display for DelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DelayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            DelayMode::Spin,
            DelayMode::JitteredSpin,
            DelayMode::JitteredSleep,
        ]
        .into_iter()
        .find(|x| x.name() == s)
        .ok_or_else(|| anyhow!("Unknown delay mode: \"{}\"", s))
    }
}

/// Per-thread delay generator.
pub struct Delay {
    mode: DelayMode,
    units: u64,
    jitter: Option<(ChaCha8Rng, Normal<f64>)>,
}

impl Delay {
    /// Relative standard deviation of the jittered modes.
    const JITTER_FRACTION: f64 = 0.25;

    pub fn new(mode: DelayMode, units: u64, seed: u64) -> Result<Self> {
        let jitter = if mode == DelayMode::Spin || units == 0 {
            None
        } else {
            let mean = units as f64;
            let normal = Normal::new(mean, mean * Self::JITTER_FRACTION)
                .map_err(|e| anyhow!("Invalid delay distribution: {}", e))?;
            Some((ChaCha8Rng::seed_from_u64(seed), normal))
        };
        Ok(Self {
            mode,
            units,
            jitter,
        })
    }

    /// Length of the next pause, in the mode's units.
    pub fn next_units(&mut self) -> u64 {
        match &mut self.jitter {
            None => self.units,
            Some((rng, normal)) => normal.sample(rng).round().max(0.0) as u64,
        }
    }

    /// Pauses the calling thread.
    #[inline]
    pub fn pause(&mut self) {
        if self.units == 0 {
            return;
        }
        let units = self.next_units();
        match self.mode {
            DelayMode::Spin | DelayMode::JitteredSpin => spin(units),
            DelayMode::JitteredSleep => std::thread::sleep(Duration::from_micros(units)),
        }
    }
}

/// Busy loop of `iterations` spin hints.
#[inline]
pub fn spin(iterations: u64) {
    for _ in 0..iterations {
        hint::spin_loop();
    }
}
