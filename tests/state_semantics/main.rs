//! Snapshot State Semantics Test Suite
//!
//! End-to-end properties of the public surface:
//! - `isolation`: snapshots read the state as of their creation
//! - `atomicity`: applies publish all writes or none
//! - `conflicts`: lost-update detection and merge resolution
//! - `nesting`: nested snapshots fold into their parent
//! - `observers`: apply and global-write notifications
//! - `stress`: randomized concurrent transfers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test state_semantics
//! cargo test --test state_semantics conflicts::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod conflicts;
mod isolation;
mod nesting;
mod observers;
mod stress;
