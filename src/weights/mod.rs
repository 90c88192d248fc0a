//! Work item weight estimation
//!
//! Weighs each item by its recorded runtime when the runtime log covers
//! enough of the items, and by file size otherwise.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::models::{WorkItem, DEFAULT_WEIGHT};

/// Recorded runtimes are trusted when `samples * coverage >= items`
pub const DEFAULT_RUNTIME_COVERAGE: f64 = 1.5;

/// Which source the weights came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightStrategy {
    RecordedRuntime,
    FileSize,
}

impl fmt::Display for WeightStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightStrategy::RecordedRuntime => write!(f, "recorded runtime"),
            WeightStrategy::FileSize => write!(f, "file size"),
        }
    }
}

/// Historical per-item durations, one `identifier:seconds` record per line
#[derive(Clone, Debug, Default)]
pub struct RuntimeLog {
    records: Vec<(String, f64)>,
}

impl RuntimeLog {
    /// Parse log contents; malformed lines are skipped
    pub fn parse(content: &str) -> Self {
        let records = content
            .lines()
            .filter_map(|line| {
                let (id, time) = line.trim().rsplit_once(':')?;
                let time: f64 = time.trim().parse().ok()?;
                if id.is_empty() || !time.is_finite() || time < 0.0 {
                    return None;
                }
                Some((id.to_string(), time))
            })
            .collect();

        Self { records }
    }

    /// Load a runtime log; a missing or unreadable file yields an empty log
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                debug!("No runtime log at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Durations keyed by identifier, optionally prefixed with `root/`
    fn durations(&self, root: Option<&str>) -> HashMap<String, f64> {
        self.records
            .iter()
            .map(|(id, time)| {
                let key = match root {
                    Some(root) => format!("{}/{}", root.trim_end_matches('/'), id),
                    None => id.clone(),
                };
                (key, *time)
            })
            .collect()
    }
}

/// Weighted items plus the strategy that produced them
#[derive(Clone, Debug)]
pub struct Estimate {
    pub strategy: WeightStrategy,
    pub items: Vec<WorkItem>,
}

/// Assigns weights to work items
#[derive(Clone, Debug)]
pub struct WeightEstimator {
    runtime_log: RuntimeLog,
    runtime_root: Option<String>,
    coverage: f64,
}

impl WeightEstimator {
    pub fn new(runtime_log: RuntimeLog) -> Self {
        Self {
            runtime_log,
            runtime_root: None,
            coverage: DEFAULT_RUNTIME_COVERAGE,
        }
    }

    /// Prefix runtime log identifiers with this root when matching items
    pub fn with_runtime_root(mut self, root: impl Into<String>) -> Self {
        self.runtime_root = Some(root.into());
        self
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = coverage;
        self
    }

    /// Pick the strategy for `item_count` items
    pub fn strategy(&self, item_count: usize) -> WeightStrategy {
        let samples = self.runtime_log.len();
        if samples > 0 && samples as f64 * self.coverage >= item_count as f64 {
            WeightStrategy::RecordedRuntime
        } else {
            WeightStrategy::FileSize
        }
    }

    /// Weigh items, reading file sizes from disk for the fallback strategy
    pub fn estimate(&self, ids: &[String]) -> Estimate {
        self.estimate_with(ids, file_size)
    }

    /// Weigh items with a custom size source for the fallback strategy
    pub fn estimate_with<F>(&self, ids: &[String], size_of: F) -> Estimate
    where
        F: Fn(&str) -> Option<u64>,
    {
        let mut ids: Vec<&String> = ids.iter().collect();
        ids.sort();

        let strategy = self.strategy(ids.len());
        info!("Using {} to weigh {} items", strategy, ids.len());

        let items = match strategy {
            WeightStrategy::RecordedRuntime => {
                let durations = self.runtime_log.durations(self.runtime_root.as_deref());
                ids.into_iter()
                    .map(|id| {
                        let weight = durations.get(id.as_str()).copied().unwrap_or(DEFAULT_WEIGHT);
                        WorkItem::new(id.clone(), weight)
                    })
                    .collect()
            }
            WeightStrategy::FileSize => ids
                .into_iter()
                .map(|id| {
                    let weight = size_of(id).map(|s| s as f64).unwrap_or(DEFAULT_WEIGHT);
                    WorkItem::new(id.clone(), weight)
                })
                .collect(),
        };

        Estimate { strategy, items }
    }
}

impl Default for WeightEstimator {
    fn default() -> Self {
        Self::new(RuntimeLog::default())
    }
}

fn file_size(path: &str) -> Option<u64> {
    match std::fs::metadata(path) {
        Ok(metadata) => Some(metadata.len()),
        Err(e) => {
            debug!("Cannot stat {}: {}", path, e);
            None
        }
    }
}
