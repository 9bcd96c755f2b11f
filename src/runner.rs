//! The timed loop of one measurement thread.
use crate::{
    cells::{ScratchVars, DEFAULT_VALUE},
    coherence::Inducer,
    delay::Delay,
    ops::OpKind,
};
use std::{
    hint,
    sync::atomic::{AtomicI64, Ordering},
    time::Instant,
};

/// One thread's share of a phase.
pub struct TimedRun<'a> {
    pub op: OpKind,
    pub cell: &'a AtomicI64,
    pub scratch: &'a ScratchVars,
    pub repetitions: u64,
    pub inducer: Inducer<'a>,
    pub delay: Delay,
}

/// Outcome of a [`TimedRun`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Sum of the durations of all timed operations.
    pub elapsed_ns: u64,
    pub repetitions: u64,
    /// Value returned by the last operation.
    pub last_value: i64,
}

impl RunReport {
    pub fn average_ns(&self) -> f64 {
        if self.repetitions == 0 {
            return 0.0;
        }
        self.elapsed_ns as f64 / self.repetitions as f64
    }
}

/// Times `run.repetitions` executions of `run.op` on `run.cell`.
///
/// Only the operation itself lies between the two clock reads; state
/// induction, the reset of the cell to [`DEFAULT_VALUE`] and the delay happen
/// outside of the timed region.
pub fn run_timed(run: TimedRun<'_>) -> RunReport {
    let TimedRun {
        op,
        cell,
        scratch,
        repetitions,
        inducer,
        mut delay,
    } = run;

    let func = op.func();
    let mut elapsed_ns = 0u64;
    let mut last_value = DEFAULT_VALUE;

    for _ in 0..repetitions {
        hint::black_box(inducer.induce(cell));

        let start = Instant::now();
        let value = func(cell, scratch);
        let elapsed = start.elapsed();

        elapsed_ns += elapsed.as_nanos() as u64;
        last_value = hint::black_box(value);
        cell.store(DEFAULT_VALUE, Ordering::SeqCst);
        delay.pause();
    }

    RunReport {
        elapsed_ns,
        repetitions,
        last_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coherence::{CoherenceState, Handshake},
        delay::DelayMode,
    };

    fn run<'a>(
        op: OpKind,
        cell: &'a AtomicI64,
        scratch: &'a ScratchVars,
        repetitions: u64,
        inducer: Inducer<'a>,
    ) -> RunReport {
        run_timed(TimedRun {
            op,
            cell,
            scratch,
            repetitions,
            inducer,
            delay: Delay::new(DelayMode::Spin, 0, 0).unwrap(),
        })
    }

    #[test]
    fn cell_is_reset_after_every_repetition() {
        let scratch = ScratchVars::new(0, DEFAULT_VALUE);
        for op in OpKind::ALL {
            for state in [None, Some(CoherenceState::Modified)] {
                let cell = AtomicI64::new(DEFAULT_VALUE);
                let inducer = Inducer::new(state, None).unwrap();
                for _ in 0..100 {
                    run(op, &cell, &scratch, 1, inducer);
                    assert_eq!(cell.load(Ordering::SeqCst), DEFAULT_VALUE, "{op}");
                }
            }
        }
    }

    #[test]
    fn every_repetition_sees_default_operands() {
        let scratch = ScratchVars::new(0, DEFAULT_VALUE);
        let cell = AtomicI64::new(DEFAULT_VALUE);
        // without the reset, fetch_add would return a growing value
        let report = run(OpKind::FetchAdd, &cell, &scratch, 1000, Inducer::Uncontrolled);
        assert_eq!(report.last_value, DEFAULT_VALUE);
        assert_eq!(report.repetitions, 1000);
        assert!(report.elapsed_ns > 0);
    }

    #[test]
    fn remote_states_reset_the_cell() {
        let scratch = ScratchVars::new(0, DEFAULT_VALUE);
        for state in [
            CoherenceState::Exclusive,
            CoherenceState::Shared,
            CoherenceState::Invalid,
        ] {
            let cell = AtomicI64::new(DEFAULT_VALUE);
            let handshake = Handshake::new();
            let report = std::thread::scope(|s| {
                s.spawn(|| handshake.serve(500, &cell, state));
                let inducer = Inducer::new(Some(state), Some(&handshake)).unwrap();
                run(OpKind::Swap, &cell, &scratch, 500, inducer)
            });
            assert_eq!(report.last_value, DEFAULT_VALUE);
            assert_eq!(cell.load(Ordering::SeqCst), DEFAULT_VALUE);
        }
    }

    #[test]
    fn failing_cas_is_still_timed() {
        let scratch = ScratchVars::new(0, -1);
        let cell = AtomicI64::new(DEFAULT_VALUE);
        let report = run(
            OpKind::CompareAndSwap,
            &cell,
            &scratch,
            1000,
            Inducer::Uncontrolled,
        );
        assert_eq!(report.last_value, DEFAULT_VALUE);
        assert!(report.average_ns().is_finite());
        assert!(report.average_ns() > 0.0);
    }

    #[test]
    fn empty_run_has_zero_average() {
        let report = RunReport {
            elapsed_ns: 0,
            repetitions: 0,
            last_value: 0,
        };
        assert_eq!(report.average_ns(), 0.0);
    }
}
