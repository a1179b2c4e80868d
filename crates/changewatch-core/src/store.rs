use async_trait::async_trait;
use changewatch_api::{Filter, Record, Result};

/// Raw store operations for one entity type.
///
/// Implementations know nothing about observation; `EntityType` wraps a store
/// and notifies observers around every mutating call.
///
/// Update operations merge the given fields into the matched records. The
/// `_id` field is never overwritten by an update.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn count(&self, filter: &Filter) -> Result<u64>;

    async fn find(&self, filter: &Filter) -> Result<Vec<Record>>;

    /// Update the first matching record, returning it after the update.
    async fn find_one_and_update(&self, filter: &Filter, changes: Record)
        -> Result<Option<Record>>;

    async fn find_by_id_and_update(&self, id: &str, changes: Record) -> Result<Option<Record>>;

    /// Remove the first matching record, returning it.
    async fn find_one_and_remove(&self, filter: &Filter) -> Result<Option<Record>>;

    async fn find_by_id_and_remove(&self, id: &str) -> Result<Option<Record>>;

    /// Remove every matching record, returning how many were removed.
    async fn remove(&self, filter: &Filter) -> Result<u64>;

    /// Update every matching record, returning how many were modified.
    async fn update(&self, filter: &Filter, changes: Record) -> Result<u64>;

    /// Persist a single document. A document with a known `_id` replaces the
    /// stored one, anything else is inserted with a fresh id.
    async fn save(&self, document: Record) -> Result<Record>;
}
