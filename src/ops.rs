use crate::cells::ScratchVars;
use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// An atomic operation applied to a cell; returns the value it observed or wrote.
pub type AtomicOpFn = fn(&AtomicI64, &ScratchVars) -> i64;

/// Kinds of atomic operations the harness can time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    CompareAndSwap,
    Swap,
    FetchAdd,
    Load,
    Store,
}

struct OpEntry {
    kind: OpKind,
    name: &'static str,
    func: AtomicOpFn,
}

/// Operation table, indexed by the discriminant of [`OpKind`]. Everything is `SeqCst`.
const OP_TABLE: [OpEntry; 5] = [
    OpEntry {
        kind: OpKind::CompareAndSwap,
        name: "cas",
        func: |cell, scratch| {
            match cell.compare_exchange(
                scratch.expected,
                scratch.desired,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(x) | Err(x) => x,
            }
        },
    },
    OpEntry {
        kind: OpKind::Swap,
        name: "swap",
        func: |cell, scratch| cell.swap(scratch.desired, Ordering::SeqCst),
    },
    OpEntry {
        kind: OpKind::FetchAdd,
        name: "fetch_add",
        func: |cell, scratch| cell.fetch_add(scratch.desired, Ordering::SeqCst),
    },
    OpEntry {
        kind: OpKind::Load,
        name: "load",
        func: |cell, _| cell.load(Ordering::SeqCst),
    },
    OpEntry {
        kind: OpKind::Store,
        name: "store",
        func: |cell, scratch| {
            cell.store(scratch.desired2, Ordering::SeqCst);
            scratch.desired2
        },
    },
];

impl OpKind {
    pub const ALL: [OpKind; 5] = [
        OpKind::CompareAndSwap,
        OpKind::Swap,
        OpKind::FetchAdd,
        OpKind::Load,
        OpKind::Store,
    ];

    fn entry(self) -> &'static OpEntry {
        let entry = &OP_TABLE[self as usize];
        debug_assert_eq!(entry.kind, self);
        entry
    }

    /// Short name used in file names and console output.
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Function implementing the operation.
    #[inline]
    pub fn func(self) -> AtomicOpFn {
        self.entry().func
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        OP_TABLE
            .iter()
            .find(|entry| entry.name == s)
            .map(|entry| entry.kind)
            .ok_or_else(|| anyhow!("Unknown atomic operation: \"{}\"", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::DEFAULT_VALUE;

    fn scratch() -> ScratchVars {
        ScratchVars::new(0, DEFAULT_VALUE)
    }

    #[test]
    fn table_matches_discriminants() {
        for (i, kind) in OpKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
            assert_eq!(OP_TABLE[i].kind, *kind);
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in OpKind::ALL {
            assert_eq!(kind.name().parse::<OpKind>().unwrap(), kind);
        }
        assert!("xadd".parse::<OpKind>().is_err());
    }

    #[test]
    fn operations_have_expected_effects() {
        let s = scratch();
        let cell = AtomicI64::new(DEFAULT_VALUE);

        assert_eq!(OpKind::CompareAndSwap.func()(&cell, &s), DEFAULT_VALUE);
        assert_eq!(cell.load(Ordering::SeqCst), s.desired);

        cell.store(DEFAULT_VALUE, Ordering::SeqCst);
        assert_eq!(OpKind::Swap.func()(&cell, &s), DEFAULT_VALUE);
        assert_eq!(cell.load(Ordering::SeqCst), s.desired);

        cell.store(DEFAULT_VALUE, Ordering::SeqCst);
        assert_eq!(OpKind::FetchAdd.func()(&cell, &s), DEFAULT_VALUE);
        assert_eq!(cell.load(Ordering::SeqCst), DEFAULT_VALUE + s.desired);

        cell.store(7, Ordering::SeqCst);
        assert_eq!(OpKind::Load.func()(&cell, &s), 7);

        OpKind::Store.func()(&cell, &s);
        assert_eq!(cell.load(Ordering::SeqCst), s.desired2);
    }

    #[test]
    fn mismatched_comparand_never_succeeds() {
        let s = ScratchVars::new(0, -1);
        let cell = AtomicI64::new(DEFAULT_VALUE);
        for _ in 0..100 {
            assert_eq!(OpKind::CompareAndSwap.func()(&cell, &s), DEFAULT_VALUE);
        }
        assert_eq!(cell.load(Ordering::SeqCst), DEFAULT_VALUE);
    }
}
