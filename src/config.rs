use crate::{
    cells::{DEFAULT_VALUE, LINE_WORDS},
    coherence::{state_label, CoherenceState},
    delay::DelayMode,
    ops::OpKind,
};
use anyhow::{anyhow, ensure, Result};
use std::{fmt, path::PathBuf, str::FromStr};

/// Which cells the threads of a phase operate on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessPattern {
    /// Every thread targets word 0.
    Shared,
    /// Thread `i` targets word `i * stride`.
    #[default]
    NotShared,
}

impl AccessPattern {
    pub fn name(self) -> &'static str {
        match self {
            AccessPattern::Shared => "shared",
            AccessPattern::NotShared => "not-shared",
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccessPattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" => Ok(AccessPattern::Shared),
            "not-shared" => Ok(AccessPattern::NotShared),
            _ => Err(anyhow!("Unknown access pattern: \"{}\"", s)),
        }
    }
}

/// Everything that determines one measurement phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Configuration {
    pub op: OpKind,
    /// `None` leaves the cache line uncontrolled between repetitions.
    pub state: Option<CoherenceState>,
    pub threads: usize,
    /// Pause between repetitions, in units of the harness [`DelayMode`].
    pub delay: u64,
    /// Distance in words between the cells of neighbouring threads.
    pub stride: usize,
    pub pattern: AccessPattern,
}

impl Configuration {
    /// Word targeted by measurement thread `thread`.
    pub fn target_word(&self, thread: usize) -> usize {
        match self.pattern {
            AccessPattern::Shared => 0,
            AccessPattern::NotShared => thread * self.stride,
        }
    }

    /// Highest word index touched by the phase.
    pub fn max_word(&self) -> usize {
        self.target_word(self.threads.saturating_sub(1))
    }

    /// Bucket key of the samples produced by measurement thread `thread`.
    pub fn key(&self, thread: usize) -> SampleKey {
        SampleKey {
            op: self.op,
            state: self.state,
            threads: self.threads,
            delay: self.delay,
            stride: self.stride,
            pattern: self.pattern,
            word: self.target_word(thread),
        }
    }

    /// Whether `key` is a bucket of this configuration.
    pub fn matches(&self, key: &SampleKey) -> bool {
        *key == SampleKey {
            word: key.word,
            ..self.key(0)
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.threads > 0, "Phase must have at least one thread");
        ensure!(
            self.pattern == AccessPattern::Shared || self.stride > 0,
            "Stride must be positive for the not-shared pattern"
        );
        Ok(())
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} state={} threads={} delay={} stride={} {}",
            self.op,
            state_label(self.state),
            self.threads,
            self.delay,
            self.stride,
            self.pattern
        )
    }
}

/// Bucket of the result table: a configuration plus the targeted word.
///
/// Threads that target the same word under the same configuration share a
/// bucket, so a shared-pattern phase yields one bucket and a not-shared phase
/// one bucket per thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub op: OpKind,
    pub state: Option<CoherenceState>,
    pub threads: usize,
    pub delay: u64,
    pub stride: usize,
    pub pattern: AccessPattern,
    pub word: usize,
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/t{}/d{}/s{}/{}/w{}",
            self.op,
            state_label(self.state),
            self.threads,
            self.delay,
            self.stride,
            self.pattern,
            self.word
        )
    }
}

/// Inclusive arithmetic range of a sweep axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepRange {
    pub start: u64,
    pub end: u64,
    pub step: u64,
}

impl SweepRange {
    pub fn new(start: u64, end: u64, step: u64) -> Self {
        Self { start, end, step }
    }

    /// A range holding only `value`.
    pub fn single(value: u64) -> Self {
        Self::new(value, value, 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        let step = self.step.max(1) as usize;
        (self.start..=self.end).step_by(step)
    }

    /// Last value of the range, `None` if it is empty.
    pub fn max(&self) -> Option<u64> {
        let step = self.step.max(1);
        (self.start <= self.end).then(|| self.start + (self.end - self.start) / step * step)
    }

    fn validate(&self, name: &str) -> Result<()> {
        ensure!(self.step > 0, "{} step must be positive", name);
        ensure!(
            self.start <= self.end,
            "{} range is empty: {}..={}",
            name,
            self.start,
            self.end
        );
        Ok(())
    }
}

impl FromStr for SweepRange {
    type Err = anyhow::Error;

    /// Parses `start..end`, `start..end:step` (both inclusive) or a single value.
    fn from_str(s: &str) -> Result<Self> {
        let parse = |x: &str| {
            x.trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("Invalid range bound \"{}\": {}", x, e))
        };
        let (bounds, step) = match s.split_once(':') {
            Some((bounds, step)) => (bounds, parse(step)?),
            None => (s, 1),
        };
        match bounds.split_once("..") {
            Some((start, end)) => Ok(Self::new(parse(start)?, parse(end)?, step)),
            None => Ok(Self::single(parse(bounds)?)),
        }
    }
}

/// Axis a sweep iterates over; also decides the layout of its result files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SweepKind {
    /// For every operation: all thread counts. One file per operation.
    Threads,
    /// For every operation: all delays. One file per operation.
    Delay,
    /// For every operation: all strides. One file per operation.
    Stride,
    /// For every coherence state: all operations. One file per state.
    States,
}

impl SweepKind {
    pub const ALL: [SweepKind; 4] = [
        SweepKind::Threads,
        SweepKind::Delay,
        SweepKind::Stride,
        SweepKind::States,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepKind::Threads => "threads",
            SweepKind::Delay => "delay",
            SweepKind::Stride => "stride",
            SweepKind::States => "states",
        }
    }

    /// Header of the swept column in result files.
    pub fn axis_column(self) -> &'static str {
        match self {
            SweepKind::Threads => "threads",
            SweepKind::Delay => "delay",
            SweepKind::Stride => "stride",
            SweepKind::States => "operation",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SweepKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        SweepKind::ALL
            .into_iter()
            .find(|x| x.name() == s)
            .ok_or_else(|| anyhow!("Unknown sweep: \"{}\"", s))
    }
}

/// Parameters of a whole benchmark session.
///
/// Axes that are not swept by a given [`SweepKind`] take their `*_fixed`
/// value, e.g. the delay sweep runs with `threads_fixed` threads.
#[derive(Clone, Debug, PartialEq)]
pub struct HarnessConfig {
    /// Timed repetitions per thread per phase.
    pub repetitions: u64,
    pub threads: SweepRange,
    pub delays: SweepRange,
    pub strides: SweepRange,
    pub threads_fixed: usize,
    pub delay_fixed: u64,
    pub stride_fixed: usize,
    pub ops: Vec<OpKind>,
    pub sweeps: Vec<SweepKind>,
    pub pattern: AccessPattern,
    /// State induced in the threads, delay and stride sweeps.
    pub state: Option<CoherenceState>,
    pub delay_mode: DelayMode,
    /// Comparand of compare-and-swap; anything but [`DEFAULT_VALUE`] never succeeds.
    pub cas_expected: i64,
    /// Directory of result files; `None` disables them.
    pub output_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            repetitions: 1_000_000,
            threads: SweepRange::new(1, 8, 1),
            delays: SweepRange::new(0, 1000, 100),
            strides: SweepRange::new(1, 2 * LINE_WORDS as u64, 1),
            threads_fixed: 1,
            delay_fixed: 0,
            stride_fixed: LINE_WORDS,
            ops: OpKind::ALL.to_vec(),
            sweeps: SweepKind::ALL.to_vec(),
            pattern: AccessPattern::NotShared,
            state: None,
            delay_mode: DelayMode::Spin,
            cas_expected: DEFAULT_VALUE,
            output_dir: None,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.repetitions > 0, "Repetition count must be positive");
        self.threads.validate("Thread")?;
        self.delays.validate("Delay")?;
        self.strides.validate("Stride")?;
        ensure!(self.threads.start > 0, "Thread range must start at 1 or above");
        ensure!(self.threads_fixed > 0, "Fixed thread count must be positive");
        ensure!(!self.ops.is_empty(), "No atomic operations selected");
        ensure!(
            self.pattern == AccessPattern::Shared
                || (self.stride_fixed > 0 && self.strides.start > 0),
            "Strides must be positive for the not-shared pattern"
        );
        Ok(())
    }

    /// Highest thread count any phase of this session uses.
    pub fn max_threads(&self) -> usize {
        let swept = self.threads.max().unwrap_or(0) as usize;
        swept.max(self.threads_fixed)
    }

    /// Number of words the cell registry must provide.
    pub fn words_needed(&self) -> Result<usize> {
        let max_stride = (self.strides.max().unwrap_or(0) as usize).max(self.stride_fixed);
        self.max_threads()
            .checked_mul(max_stride)
            .and_then(|x| x.checked_add(1))
            .ok_or_else(|| {
                anyhow!(
                    "{} threads with stride {} do not fit in memory",
                    self.max_threads(),
                    max_stride
                )
            })
    }

    /// Configurations of one sweep, in execution order.
    pub fn configurations(&self, sweep: SweepKind) -> Vec<Configuration> {
        let base = |op: OpKind| Configuration {
            op,
            state: self.state,
            threads: self.threads_fixed,
            delay: self.delay_fixed,
            stride: self.stride_fixed,
            pattern: self.pattern,
        };
        let mut result = vec![];
        match sweep {
            SweepKind::Threads => {
                for &op in &self.ops {
                    for threads in self.threads.iter() {
                        result.push(Configuration {
                            threads: threads as usize,
                            ..base(op)
                        });
                    }
                }
            }
            SweepKind::Delay => {
                for &op in &self.ops {
                    for delay in self.delays.iter() {
                        result.push(Configuration { delay, ..base(op) });
                    }
                }
            }
            SweepKind::Stride => {
                for &op in &self.ops {
                    for stride in self.strides.iter() {
                        result.push(Configuration {
                            stride: stride as usize,
                            ..base(op)
                        });
                    }
                }
            }
            SweepKind::States => {
                for state in CoherenceState::ALL {
                    for &op in &self.ops {
                        result.push(Configuration {
                            state: Some(state),
                            ..base(op)
                        });
                    }
                }
            }
        }
        result
    }
}
