//! Store seam for changewatch
//!
//! This crate provides the pieces a change assertion observes:
//! - `EntityStore`: the raw async store operations for one entity type
//! - `EntityType`: the caller-facing handle that routes mutating calls through
//!   attached `OperationObserver`s
//! - `MutatingOperation`: the closed set of tracked operations
//! - `MemoryStore`: an in-memory store for tests

pub mod entity_type;
pub mod memory_store;
pub mod operation;
pub mod store;

pub use changewatch_api::{record, Filter, Record, Result, StoreError, Value, ID_FIELD};
pub use entity_type::{EntityType, ObserverId, OperationObserver};
pub use memory_store::MemoryStore;
pub use operation::{MutatingOperation, OperationScope};
pub use store::EntityStore;
