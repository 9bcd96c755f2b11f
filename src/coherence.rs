//! Driving the target cache line into a chosen MESI state before it is timed.
//!
//! ## Protocol
//!
//! Modified needs no helper: the measuring thread writes the cell itself.
//! The other states use a dedicated preparation thread pinned to another core
//! and two flags, one per direction:
//!
//! ```text
//!   measurement                         preparation
//!   ───────────                         ───────────
//!   set measurement_ready ───────────▶  spin until measurement_ready
//!                                       clear measurement_ready
//!                                       store cell          (line leaves our core)
//!                                       load cell           (Shared only)
//!   spin until preparation_ready ◀───── set preparation_ready
//!   clear preparation_ready
//!   load cell                           (Exclusive and Shared only)
//!   <timed operation>
//! ```
//!
//! Each flag is set by one side and cleared by the other, so a round can not
//! start before the previous one was fully consumed. All waits are busy polls.
use crate::cells::DEFAULT_VALUE;
use anyhow::{anyhow, bail, Result};
use crossbeam_utils::CachePadded;
use std::{
    fmt, hint,
    str::FromStr,
    sync::atomic::{AtomicBool, AtomicI64, Ordering},
};

/// Cache-line state of the target cell at the start of the timed operation,
/// as seen from the measuring core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoherenceState {
    Modified,
    Exclusive,
    Shared,
    Invalid,
}

impl CoherenceState {
    pub const ALL: [CoherenceState; 4] = [
        CoherenceState::Modified,
        CoherenceState::Exclusive,
        CoherenceState::Shared,
        CoherenceState::Invalid,
    ];

    /// One-letter MESI label.
    pub fn label(self) -> &'static str {
        match self {
            CoherenceState::Modified => "M",
            CoherenceState::Exclusive => "E",
            CoherenceState::Shared => "S",
            CoherenceState::Invalid => "I",
        }
    }

    /// Whether a preparation thread on another core is required.
    pub fn needs_preparation(self) -> bool {
        self != CoherenceState::Modified
    }
}

impl fmt::Display for CoherenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CoherenceState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m" | "modified" => Ok(CoherenceState::Modified),
            "e" | "exclusive" => Ok(CoherenceState::Exclusive),
            "s" | "shared" => Ok(CoherenceState::Shared),
            "i" | "invalid" => Ok(CoherenceState::Invalid),
            _ => Err(anyhow!("Unknown coherence state: \"{}\"", s)),
        }
    }
}

/// Label of an optional state; phases without state control print as `-`.
pub fn state_label(state: Option<CoherenceState>) -> &'static str {
    state.map_or("-", CoherenceState::label)
}

/// Signalling flags shared by one measurement thread and its preparation thread.
#[derive(Debug, Default)]
pub struct Handshake {
    measurement_ready: CachePadded<AtomicBool>,
    preparation_ready: CachePadded<AtomicBool>,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measurement side: announces that the cell may be prepared.
    #[inline]
    pub fn signal_measurement_ready(&self) {
        self.measurement_ready.store(true, Ordering::Release);
    }

    /// Measurement side: waits for the preparation and consumes its signal.
    #[inline]
    pub fn await_preparation(&self) {
        while !self.preparation_ready.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        self.preparation_ready.store(false, Ordering::Relaxed);
    }

    /// Preparation side: waits for the measurement thread and consumes its signal.
    #[inline]
    pub fn await_measurement(&self) {
        while !self.measurement_ready.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        self.measurement_ready.store(false, Ordering::Relaxed);
    }

    /// Preparation side: announces that the cell is prepared.
    #[inline]
    pub fn signal_preparation_ready(&self) {
        self.preparation_ready.store(true, Ordering::Release);
    }

    /// Unconsumed signals, `(measurement_ready, preparation_ready)`.
    pub fn pending(&self) -> (bool, bool) {
        (
            self.measurement_ready.load(Ordering::Acquire),
            self.preparation_ready.load(Ordering::Acquire),
        )
    }

    /// Body of a preparation thread: serves exactly `rounds` rounds for `state`.
    pub fn serve(&self, rounds: u64, cell: &AtomicI64, state: CoherenceState) {
        for _ in 0..rounds {
            self.await_measurement();
            cell.store(DEFAULT_VALUE, Ordering::SeqCst);
            if state == CoherenceState::Shared {
                hint::black_box(cell.load(Ordering::SeqCst));
            }
            self.signal_preparation_ready();
        }
    }
}

/// Measurement-thread half of the state induction, run before every timed operation.
#[derive(Clone, Copy, Debug)]
pub enum Inducer<'a> {
    /// The line is left wherever the previous repetition put it.
    Uncontrolled,
    Modified,
    Remote {
        state: CoherenceState,
        handshake: &'a Handshake,
    },
}

impl<'a> Inducer<'a> {
    pub fn new(state: Option<CoherenceState>, handshake: Option<&'a Handshake>) -> Result<Self> {
        Ok(match (state, handshake) {
            (None, _) => Inducer::Uncontrolled,
            (Some(CoherenceState::Modified), _) => Inducer::Modified,
            (Some(state), Some(handshake)) => Inducer::Remote { state, handshake },
            (Some(state), None) => bail!("State {} requires a preparation thread", state),
        })
    }

    /// Number of handshake rounds a preparation thread must serve for `repetitions`.
    pub fn rounds(state: Option<CoherenceState>, repetitions: u64) -> u64 {
        match state {
            Some(state) if state.needs_preparation() => repetitions,
            _ => 0,
        }
    }

    /// Puts `cell` into the requested state; returns the value read, if any.
    #[inline]
    pub fn induce(&self, cell: &AtomicI64) -> i64 {
        match *self {
            Inducer::Uncontrolled => DEFAULT_VALUE,
            Inducer::Modified => {
                cell.store(DEFAULT_VALUE, Ordering::SeqCst);
                DEFAULT_VALUE
            }
            Inducer::Remote { state, handshake } => {
                handshake.signal_measurement_ready();
                handshake.await_preparation();
                match state {
                    CoherenceState::Exclusive | CoherenceState::Shared => {
                        cell.load(Ordering::SeqCst)
                    }
                    _ => DEFAULT_VALUE,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn labels_parse_back() {
        for state in CoherenceState::ALL {
            assert_eq!(state.label().parse::<CoherenceState>().unwrap(), state);
        }
        assert_eq!(
            "Shared".parse::<CoherenceState>().unwrap(),
            CoherenceState::Shared
        );
        assert!("O".parse::<CoherenceState>().is_err());
        assert_eq!(state_label(None), "-");
    }

    #[test]
    fn remote_state_without_handshake_is_rejected() {
        assert!(Inducer::new(Some(CoherenceState::Invalid), None).is_err());
        assert!(Inducer::new(Some(CoherenceState::Modified), None).is_ok());
        assert!(Inducer::new(None, None).is_ok());
    }

    #[test]
    fn handshake_alternates_strictly() {
        const ROUNDS: u64 = 10_000;

        for state in [
            CoherenceState::Exclusive,
            CoherenceState::Shared,
            CoherenceState::Invalid,
        ] {
            let handshake = Handshake::new();
            let cell = AtomicI64::new(DEFAULT_VALUE);
            let served = AtomicU64::new(0);

            std::thread::scope(|s| {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        handshake.await_measurement();
                        // our previous signal must have been consumed before a new request
                        assert!(!handshake.pending().1);
                        served.fetch_add(1, Ordering::SeqCst);
                        handshake.signal_preparation_ready();
                    }
                });

                let mut observed = 0;
                for round in 0..ROUNDS {
                    assert!(!handshake.pending().0);
                    assert_eq!(served.load(Ordering::SeqCst), round);
                    let inducer = Inducer::new(Some(state), Some(&handshake)).unwrap();
                    inducer.induce(&cell);
                    observed += 1;
                    assert_eq!(served.load(Ordering::SeqCst), round + 1);
                }
                assert_eq!(observed, ROUNDS);
            });

            assert_eq!(served.load(Ordering::SeqCst), ROUNDS);
            assert_eq!(handshake.pending(), (false, false));
        }
    }

    #[test]
    fn serve_runs_exact_number_of_rounds() {
        const ROUNDS: u64 = 1000;
        let handshake = Handshake::new();
        let cell = AtomicI64::new(DEFAULT_VALUE);
        let inducer = Inducer::new(Some(CoherenceState::Shared), Some(&handshake)).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| handshake.serve(ROUNDS, &cell, CoherenceState::Shared));
            for _ in 0..ROUNDS {
                assert_eq!(inducer.induce(&cell), DEFAULT_VALUE);
                cell.store(42, Ordering::SeqCst);
            }
        });
        // the last store happened after the final round
        assert_eq!(cell.load(Ordering::SeqCst), 42);
        assert_eq!(handshake.pending(), (false, false));
    }

    #[test]
    fn preparation_rounds_match_repetitions() {
        assert_eq!(Inducer::rounds(None, 10), 0);
        assert_eq!(Inducer::rounds(Some(CoherenceState::Modified), 10), 0);
        assert_eq!(Inducer::rounds(Some(CoherenceState::Invalid), 10), 10);
    }
}
