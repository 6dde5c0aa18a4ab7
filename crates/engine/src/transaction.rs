//! Mutable snapshot blocks and retry logic
//!
//! `with_mutable_snapshot` is the one-shot form: take, enter, apply, dispose.
//! It never retries; a conflict surfaces as `Error::ApplyConflict`.
//! `with_mutable_snapshot_retry` is the opt-in caller policy that reruns the
//! whole block on conflict with exponential backoff.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_concurrency::{take_mutable_snapshot, Snapshot};
use strata_core::{Error, Result};
use tracing::{debug, warn};

// ============================================================================
// Conflict Reruns
// ============================================================================

/// How `with_mutable_snapshot_retry` reruns a block whose apply conflicted
///
/// Before rerun `n` (counting from 0) the caller sleeps
/// `initial_backoff_ms * 2^n`, never longer than `backoff_ceiling_ms`.
///
/// ```toml
/// [retry]
/// max_reruns = 3
/// initial_backoff_ms = 10
/// backoff_ceiling_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reruns after the first conflicting apply (0 surfaces the first conflict)
    pub max_reruns: u32,
    /// Sleep before the first rerun, in milliseconds
    pub initial_backoff_ms: u64,
    /// Longest sleep between reruns, in milliseconds
    pub backoff_ceiling_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_reruns: 3,
            initial_backoff_ms: 10,
            backoff_ceiling_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Surface the first conflict without rerunning
    pub fn disabled() -> Self {
        Self {
            max_reruns: 0,
            ..Self::default()
        }
    }

    /// Rerun up to `max_reruns` times
    pub fn reruns(self, max_reruns: u32) -> Self {
        Self { max_reruns, ..self }
    }

    /// Back off from `initial_ms`, doubling up to `ceiling_ms`
    pub fn backoff(self, initial_ms: u64, ceiling_ms: u64) -> Self {
        Self {
            initial_backoff_ms: initial_ms,
            backoff_ceiling_ms: ceiling_ms,
            ..self
        }
    }

    /// Reject a backoff that starts above its ceiling
    pub fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms > self.backoff_ceiling_ms {
            return Err(Error::Config(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.backoff_ceiling_ms ({})",
                self.initial_backoff_ms, self.backoff_ceiling_ms
            )));
        }
        Ok(())
    }

    /// Sleep before rerun number `rerun`, counting from 0
    pub(crate) fn backoff_before(&self, rerun: u32) -> Duration {
        let factor = 2u64.saturating_pow(rerun);
        let ms = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.backoff_ceiling_ms))
    }
}

// ============================================================================
// Snapshot Blocks
// ============================================================================

/// Disposes the snapshot on every exit path, including unwinding
struct DisposeGuard(Snapshot);

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

/// Run `f` in a new mutable snapshot and apply it
///
/// Inside another mutable snapshot this nests: the writes fold into the
/// enclosing snapshot. The snapshot is disposed however `f` exits.
///
/// # Errors
///
/// - Any error returned by `f`; nothing is applied
/// - `Error::ApplyConflict` if a concurrent change could not be merged
pub fn with_mutable_snapshot<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    let guard = DisposeGuard(take_mutable_snapshot(None, None)?);
    let snapshot = &guard.0;
    let value = snapshot.enter(f)??;
    if let Err(e) = snapshot.apply()?.check() {
        warn!(target: "strata::snapshot", snapshot_id = snapshot.id(), "Mutable snapshot failed to apply");
        return Err(e);
    }
    Ok(value)
}

/// Rerun `attempt` while it fails with a retryable error
pub(crate) fn retry_on_conflict<R>(config: &RetryConfig, mut attempt: impl FnMut() -> Result<R>) -> Result<R> {
    let mut rerun = 0;
    loop {
        match attempt() {
            Err(e) if e.is_retryable() && rerun < config.max_reruns => {
                let backoff = config.backoff_before(rerun);
                debug!(
                    target: "strata::snapshot",
                    rerun = rerun + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rerunning snapshot block after conflict"
                );
                std::thread::sleep(backoff);
                rerun += 1;
            }
            outcome => return outcome,
        }
    }
}

/// Run `f` in a mutable snapshot, retrying the whole block on conflict
///
/// `f` may run several times and must not have side effects outside the
/// snapshot.
pub fn with_mutable_snapshot_retry<R>(config: &RetryConfig, f: impl Fn() -> Result<R>) -> Result<R> {
    retry_on_conflict(config, || with_mutable_snapshot(&f))
}
