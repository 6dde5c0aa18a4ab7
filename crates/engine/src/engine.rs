//! State engine facade
//!
//! `StateEngine` installs a `StateConfig` into the process-wide snapshot
//! runtime and wraps the snapshot entry points with usage metrics. The
//! runtime itself is shared: two engines in one process see the same state
//! and the last one opened decides the runtime options.

use crate::config::{StateConfig, CONFIG_FILE_NAME};
use crate::transaction::{retry_on_conflict, with_mutable_snapshot};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_concurrency::{configure_runtime, ReadObserver, Snapshot, SnapshotApplyResult, WriteObserver};
use strata_core::{Error, Result};
use tracing::info;

/// Entry point for snapshot work with a fixed configuration
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering. They are observational only
/// and do not synchronize any other memory operations.
#[derive(Debug)]
pub struct StateEngine {
    config: StateConfig,
    snapshots_taken: AtomicU64,
    applied: AtomicU64,
    conflicted: AtomicU64,
}

impl StateEngine {
    /// Validate `config` and install it into the runtime
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the config is invalid.
    pub fn new(config: StateConfig) -> Result<Self> {
        config.validate()?;
        configure_runtime(config.runtime_options());
        info!(
            target: "strata::snapshot",
            max_reruns = config.retry.max_reruns,
            "State engine started"
        );
        Ok(Self {
            config,
            snapshots_taken: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            conflicted: AtomicU64::new(0),
        })
    }

    /// Start an engine configured from `dir/strata-state.toml`
    ///
    /// Writes the default config file first if the directory has none.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        StateConfig::write_default_if_missing(&path)?;
        Self::new(StateConfig::from_file(&path)?)
    }

    /// Active configuration
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Take a read-only snapshot, nested in the thread's current snapshot
    pub fn take_snapshot(&self, read_observer: Option<ReadObserver>) -> Result<Snapshot> {
        let snapshot = strata_concurrency::take_snapshot(read_observer)?;
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
        Ok(snapshot)
    }

    /// Take a mutable snapshot, nested in the thread's current snapshot
    pub fn take_mutable_snapshot(
        &self,
        read_observer: Option<ReadObserver>,
        write_observer: Option<WriteObserver>,
    ) -> Result<Snapshot> {
        let snapshot = strata_concurrency::take_mutable_snapshot(read_observer, write_observer)?;
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
        Ok(snapshot)
    }

    /// Apply `snapshot`, counting the outcome
    pub fn apply(&self, snapshot: &Snapshot) -> Result<SnapshotApplyResult> {
        let result = snapshot.apply()?;
        let counter = if result.is_success() {
            &self.applied
        } else {
            &self.conflicted
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    /// Run `f` in a mutable snapshot and apply it
    ///
    /// See [`crate::with_mutable_snapshot`].
    pub fn with_mutable_snapshot<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
        let result = with_mutable_snapshot(f);
        match &result {
            Ok(_) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(Error::ApplyConflict { .. }) => {
                self.conflicted.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }
        result
    }

    /// Run `f` in a mutable snapshot, retrying per the configured policy
    pub fn with_mutable_snapshot_retry<R>(&self, f: impl Fn() -> Result<R>) -> Result<R> {
        retry_on_conflict(&self.config.retry, || self.with_mutable_snapshot(&f))
    }

    /// Snapshot usage counters
    pub fn metrics(&self) -> EngineMetrics {
        let applied = self.applied.load(Ordering::Relaxed);
        let conflicted = self.conflicted.load(Ordering::Relaxed);
        let attempted = applied + conflicted;

        EngineMetrics {
            snapshots_taken: self.snapshots_taken.load(Ordering::Relaxed),
            applied,
            conflicted,
            conflict_rate: if attempted > 0 {
                conflicted as f64 / attempted as f64
            } else {
                0.0
            },
        }
    }
}

/// Snapshot usage counters
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMetrics {
    /// Snapshots taken through the engine
    pub snapshots_taken: u64,
    /// Applies that succeeded
    pub applied: u64,
    /// Applies that failed with a conflict
    pub conflicted: u64,
    /// Conflict rate (conflicted / attempted applies)
    pub conflict_rate: f64,
}

impl EngineMetrics {
    /// Applies attempted, successful or not
    pub fn total_applies(&self) -> u64 {
        self.applied + self.conflicted
    }
}
