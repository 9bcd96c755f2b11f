#![warn(clippy::all)]

mod affinity;
mod aggregator;
mod barrier;
mod cells;
mod coherence;
mod config;
mod delay;
mod harness;
mod ops;
mod output;
mod runner;

pub use affinity::{pin_current, CorePlan};
pub use aggregator::{AggregateRecord, AggregateSummary, ResultAggregator};
pub use barrier::ReusableBarrier;
pub use cells::{CellRegistry, ScratchVars, DEFAULT_VALUE, LINE_WORDS};
pub use coherence::{state_label, CoherenceState, Handshake, Inducer};
pub use config::{AccessPattern, Configuration, HarnessConfig, SampleKey, SweepKind, SweepRange};
pub use delay::{spin, Delay, DelayMode};
pub use harness::Harness;
pub use ops::{AtomicOpFn, OpKind};
pub use output::{ConsoleSink, MemorySink, ResultSink, TsvSink};
pub use runner::{run_timed, RunReport, TimedRun};

pub const VERSION: &str = "0.2.1";
