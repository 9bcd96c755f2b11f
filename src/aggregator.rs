//! Thread-safe accumulation of timing sums, keyed by configuration.
use crate::config::SampleKey;
use ahash::AHashMap as HashMap;
use anyhow::Result;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Accumulated timings of one bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregateRecord {
    pub elapsed_ns: u64,
    /// Timed operations summed into `elapsed_ns`.
    pub samples: u64,
    /// Threads that recorded into this bucket.
    pub contributors: u64,
}

impl AggregateRecord {
    /// Average latency of one operation.
    ///
    /// The divisor is the number of timed operations, i.e. repetitions times
    /// contributors. A not-shared bucket has a single contributor, so its
    /// average is divided by the repetition count only.
    pub fn average_ns(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.elapsed_ns as f64 / self.samples as f64
    }
}

/// A bucket handed to an output collaborator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateSummary {
    pub key: SampleKey,
    pub record: AggregateRecord,
    pub average_ns: f64,
}

/// Result table shared by all measurement threads of a harness.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    table: Mutex<HashMap<SampleKey, AggregateRecord>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one thread's timings of `samples` operations to the bucket of `key`.
    pub fn record(&self, key: SampleKey, elapsed_ns: u64, samples: u64) {
        let mut table = self.lock();
        let entry = table.entry(key).or_default();
        entry.elapsed_ns += elapsed_ns;
        entry.samples += samples;
        entry.contributors += 1;
    }

    /// Hands every bucket accepted by `filter` to `sink` in key order, then
    /// clears the whole table.
    ///
    /// Must be called only after every thread that records into the current
    /// phase has been joined. The table is cleared even if `sink` fails.
    pub fn export_and_clear<P, S>(&self, filter: P, mut sink: S) -> Result<Vec<AggregateSummary>>
    where
        P: Fn(&SampleKey) -> bool,
        S: FnMut(&AggregateSummary) -> Result<()>,
    {
        let mut table = self.lock();
        let mut summaries: Vec<_> = table
            .drain()
            .filter(|(key, _)| filter(key))
            .map(|(key, record)| AggregateSummary {
                key,
                record,
                average_ns: record.average_ns(),
            })
            .collect();
        drop(table);

        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        for summary in summaries.iter() {
            sink(summary)?;
        }
        Ok(summaries)
    }

    /// Copy of the current table, in key order.
    pub fn snapshot(&self) -> Vec<(SampleKey, AggregateRecord)> {
        let mut items: Vec<_> = self.lock().iter().map(|(k, v)| (*k, *v)).collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SampleKey, AggregateRecord>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AccessPattern, Configuration},
        ops::OpKind,
    };
    use anyhow::anyhow;

    fn configuration(pattern: AccessPattern, threads: usize) -> Configuration {
        Configuration {
            op: OpKind::FetchAdd,
            state: None,
            threads,
            delay: 0,
            stride: 8,
            pattern,
        }
    }

    #[test]
    fn same_key_accumulates() {
        let aggregator = ResultAggregator::new();
        let key = configuration(AccessPattern::Shared, 2).key(0);
        aggregator.record(key, 100, 10);
        aggregator.record(key, 300, 10);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot[0].1,
            AggregateRecord {
                elapsed_ns: 400,
                samples: 20,
                contributors: 2
            }
        );
        assert_eq!(snapshot[0].1.average_ns(), 20.0);
    }

    #[test]
    fn concurrent_records_are_never_lost() {
        const THREADS: usize = 8;
        const RECORDS: u64 = 10_000;

        let aggregator = ResultAggregator::new();
        let cfg = configuration(AccessPattern::Shared, THREADS);

        std::thread::scope(|s| {
            for i in 0..THREADS {
                let aggregator = &aggregator;
                s.spawn(move || {
                    for _ in 0..RECORDS {
                        aggregator.record(cfg.key(i), 3, 1);
                    }
                });
            }
        });

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.len(), 1);
        let record = snapshot[0].1;
        assert_eq!(record.elapsed_ns, 3 * RECORDS * THREADS as u64);
        assert_eq!(record.samples, RECORDS * THREADS as u64);
        assert_eq!(record.contributors, RECORDS * THREADS as u64);
    }

    #[test]
    fn export_filters_sorts_and_clears() {
        let aggregator = ResultAggregator::new();
        let cfg = configuration(AccessPattern::NotShared, 3);
        for i in (0..3).rev() {
            aggregator.record(cfg.key(i), 1000 * (i as u64 + 1), 100);
        }
        let mut seen = vec![];
        let exported = aggregator
            .export_and_clear(
                |key| key.word != 0,
                |summary| {
                    seen.push(summary.key.word);
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(seen, [8, 16]);
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].average_ns, 20.0);
        assert_eq!(exported[1].average_ns, 30.0);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn failing_sink_still_clears() {
        let aggregator = ResultAggregator::new();
        aggregator.record(configuration(AccessPattern::Shared, 1).key(0), 1, 1);
        let result = aggregator.export_and_clear(|_| true, |_| Err(anyhow!("disk full")));
        assert!(result.is_err());
        assert_eq!(aggregator.len(), 0);
    }
}
