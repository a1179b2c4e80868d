//! Change assertions for tests against an entity store
//!
//! Snapshot store counts, run an action, then assert that:
//! - counts changed by expected deltas (`ExpectedChanges::count`)
//! - mutating operations were or were not invoked (`ExpectedChanges::was_mutated`)
//!
//! optionally re-checking on a fixed schedule to tolerate delayed writes
//! (`ExpectedChanges::retry`).

pub mod config;
pub mod error;
pub mod interception;
pub mod logging;
pub mod orchestrator;
pub mod predicate;
pub mod snapshot;
pub mod watcher;

pub use config::{CONFIG_ENV_VAR, ChangewatchConfig, RetryPolicy};
pub use error::{AssertionError, Result};
pub use interception::{InterceptionRecord, InterceptionRegistry, OperationStats, TrackingMode};
pub use logging::init_logging;
pub use orchestrator::{
    AssertionPhase, ChangeAssertionRequest, ChangeReport, ExpectedChanges, assert_changes,
    check_counts,
};
pub use predicate::{MutationAssertion, assert_mutation_state};
pub use snapshot::{Expectation, snapshot};
pub use watcher::ChangeWatcher;
