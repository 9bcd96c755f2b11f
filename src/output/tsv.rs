use super::ResultSink;
use crate::{
    aggregator::AggregateSummary,
    coherence::state_label,
    config::{SampleKey, SweepKind},
};
use anyhow::{Context, Result};
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

/// Appends aggregated averages to tab-separated files, one per sweep and
/// operation (or per sweep and coherence state for the state sweep).
///
/// Each row is `<axis value>\t<average in ns>`. A header row is written
/// only when the file is created. Records outside of a sweep are ignored.
#[derive(Clone, Debug)]
pub struct TsvSink {
    dir: PathBuf,
}

impl TsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// File that collects the rows of `key` in `sweep`.
    pub fn path_for(&self, sweep: SweepKind, key: &SampleKey) -> PathBuf {
        let name = match sweep {
            SweepKind::States => format!("{}_{}.tsv", sweep, state_label(key.state)),
            _ => format!("{}_{}.tsv", sweep, key.op),
        };
        self.dir.join(name)
    }

    fn axis_value(sweep: SweepKind, key: &SampleKey) -> String {
        match sweep {
            SweepKind::Threads => key.threads.to_string(),
            SweepKind::Delay => key.delay.to_string(),
            SweepKind::Stride => key.stride.to_string(),
            SweepKind::States => key.op.to_string(),
        }
    }

    fn append(path: &Path, header: &str, row: &str) -> Result<()> {
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        if is_new {
            writeln!(file, "{}", header)?;
        }
        writeln!(file, "{}", row).with_context(|| format!("Failed to append to {}", path.display()))
    }
}

impl ResultSink for TsvSink {
    fn record(&mut self, sweep: Option<SweepKind>, summary: &AggregateSummary) -> Result<()> {
        let Some(sweep) = sweep else {
            return Ok(());
        };
        let path = self.path_for(sweep, &summary.key);
        let header = format!("{}\tavg_ns", sweep.axis_column());
        let row = format!(
            "{}\t{}",
            Self::axis_value(sweep, &summary.key),
            summary.average_ns
        );
        Self::append(&path, &header, &row)
    }
}
