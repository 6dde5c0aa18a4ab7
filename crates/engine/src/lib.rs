//! Typed state and snapshot blocks for strata
//!
//! This crate is the caller-facing layer over `strata-concurrency`:
//! - MutableState: typed state objects with mutation policies
//! - with_mutable_snapshot: run a block in a snapshot and apply it
//! - StateConfig: runtime and retry configuration from `strata-state.toml`
//! - StateEngine: configured entry point with usage metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod policy;
pub mod state;
pub mod transaction;

pub use config::{StateConfig, CONFIG_FILE_NAME};
pub use engine::{EngineMetrics, StateEngine};
pub use policy::{
    MergeWith, MutationPolicy, NeverEqualPolicy, ReferentialEqualityPolicy,
    StructuralEqualityPolicy,
};
pub use state::MutableState;
pub use transaction::{with_mutable_snapshot, with_mutable_snapshot_retry, RetryConfig};
