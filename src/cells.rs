//! Cache-line isolated atomic cells and per-thread scratch values.
use anyhow::{anyhow, Result};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};

/// Number of atomic words stored in one cache-line block.
pub const LINE_WORDS: usize = 8;
/// Value every cell holds at the start of a timed repetition.
///
/// Writes issued only to move a cache line (Modified setup, preparation
/// threads) store this value too, so every operation sees the same operands
/// whatever the coherence state.
pub const DEFAULT_VALUE: i64 = 0;

type Line = [AtomicI64; LINE_WORDS];

/// Per-thread operands of the atomic operations.
///
/// Only read while measuring, so every thread may keep a copy in its own cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchVars {
    /// Comparand of compare-and-swap.
    pub expected: i64,
    /// New value of compare-and-swap and swap, addend of fetch-and-add.
    pub desired: i64,
    /// Value written by plain stores.
    pub desired2: i64,
    /// Seed for the jittered delays of this thread.
    pub seed: u64,
}

impl ScratchVars {
    pub fn new(thread: usize, cas_expected: i64) -> Self {
        Self {
            expected: cas_expected,
            desired: DEFAULT_VALUE + 1,
            desired2: DEFAULT_VALUE + 2,
            seed: 0x9e37_79b9_7f4a_7c15 ^ thread as u64,
        }
    }
}

/// Storage for the atomics touched by the timed operations.
///
/// Words are grouped into blocks of [`LINE_WORDS`]; every block is padded and
/// aligned by [`CachePadded`], so words from different blocks never share a
/// cache line. Two threads hit the same line only when their word indices fall
/// into the same block, i.e. when the configured stride is below
/// [`LINE_WORDS`].
pub struct CellRegistry {
    lines: Box<[CachePadded<Line>]>,
    scratch: Box<[CachePadded<ScratchVars>]>,
}

impl CellRegistry {
    /// Allocates at least `words` cells and scratch values for `threads` threads.
    pub fn new(words: usize, threads: usize, cas_expected: i64) -> Self {
        let lines = words.max(1).div_ceil(LINE_WORDS);
        Self {
            lines: (0..lines)
                .map(|_| CachePadded::new(std::array::from_fn(|_| AtomicI64::new(DEFAULT_VALUE))))
                .collect(),
            scratch: (0..threads)
                .map(|i| CachePadded::new(ScratchVars::new(i, cas_expected)))
                .collect(),
        }
    }

    /// Number of addressable words.
    pub fn words(&self) -> usize {
        self.lines.len() * LINE_WORDS
    }

    /// Number of threads that have scratch values.
    pub fn threads(&self) -> usize {
        self.scratch.len()
    }

    pub fn cell(&self, word: usize) -> Result<&AtomicI64> {
        self.lines
            .get(word / LINE_WORDS)
            .map(|line| &line[word % LINE_WORDS])
            .ok_or_else(|| anyhow!("word {} is outside of {} allocated cells", word, self.words()))
    }

    pub fn scratch(&self, thread: usize) -> Result<&ScratchVars> {
        self.scratch
            .get(thread)
            .map(|x| &**x)
            .ok_or_else(|| anyhow!("no scratch values for thread {}", thread))
    }

    /// Stores [`DEFAULT_VALUE`] into every cell.
    pub fn reset_all(&self) {
        for line in self.lines.iter() {
            for word in line.iter() {
                word.store(DEFAULT_VALUE, Ordering::Relaxed);
            }
        }
    }
}
