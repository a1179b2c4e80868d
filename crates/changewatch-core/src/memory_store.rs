//! In-memory implementation of `EntityStore`
//!
//! A Vec-backed store for tests and as a reference implementation. It keeps
//! insertion order (so "first matching record" is well defined), enforces
//! unique fields and counts how many count queries it served.

use async_trait::async_trait;
use changewatch_api::{Filter, Record, Result, StoreError, Value, ID_FIELD};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::store::EntityStore;

/// In-memory record storage for a single entity type.
///
/// # Example
///
/// ```rust,no_run
/// use changewatch_core::{record, EntityType, Filter, MemoryStore};
/// use std::sync::Arc;
///
/// async fn example() -> changewatch_core::Result<()> {
///     let store = MemoryStore::new("Item").with_unique_field("uuid");
///     let item = EntityType::new("Item", Arc::new(store));
///
///     item.create(record([("uuid", "a")])).await?;
///     assert_eq!(item.count(&Filter::All).await?, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    entity: String,
    unique_fields: Vec<String>,
    state: RwLock<MemoryState>,
    count_queries: AtomicU64,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    /// Counter for deterministic ID generation (increments with each insert)
    next_id_counter: u64,
}

impl MemoryStore {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            unique_fields: Vec::new(),
            state: RwLock::new(MemoryState::default()),
            count_queries: AtomicU64::new(0),
        }
    }

    /// Reject writes that would give two records the same non-null value for
    /// `field`.
    pub fn with_unique_field(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }

    /// Number of `count` queries served so far.
    pub fn count_queries(&self) -> u64 {
        self.count_queries.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn generate_id(&self, state: &mut MemoryState) -> String {
        let id = format!("local://{}/{}", self.entity, state.next_id_counter);
        state.next_id_counter += 1;
        id
    }

    /// Check `candidate` against every other record's unique fields.
    fn check_unique(&self, state: &MemoryState, candidate: &Record) -> Result<()> {
        let candidate_id = candidate.get(ID_FIELD);
        for field in &self.unique_fields {
            let value = match candidate.get(field) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let clash = state
                .records
                .iter()
                .filter(|other| other.get(ID_FIELD) != candidate_id)
                .any(|other| other.get(field) == Some(value));
            if clash {
                return Err(StoreError::DuplicateKey {
                    entity: self.entity.clone(),
                    field: field.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    fn apply_changes(record: &Record, changes: &Record) -> Record {
        let mut updated = record.clone();
        for (field, value) in changes {
            if field != ID_FIELD {
                updated.insert(field.clone(), value.clone());
            }
        }
        updated
    }

    /// Update the records at `positions`, all or nothing.
    fn update_positions(
        &self,
        state: &mut MemoryState,
        positions: &[usize],
        changes: &Record,
    ) -> Result<Vec<Record>> {
        let updated: Vec<Record> = positions
            .iter()
            .map(|&pos| Self::apply_changes(&state.records[pos], changes))
            .collect();

        // Validate against the post-update state so two updated records
        // cannot end up sharing a unique value either.
        let mut staged = MemoryState {
            records: state.records.clone(),
            next_id_counter: state.next_id_counter,
        };
        for (&pos, record) in positions.iter().zip(&updated) {
            staged.records[pos] = record.clone();
        }
        for record in &updated {
            self.check_unique(&staged, record)?;
        }

        state.records = staged.records;
        Ok(updated)
    }

    fn position_of(state: &MemoryState, filter: &Filter) -> Option<usize> {
        state.records.iter().position(|r| filter.matches(r))
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn count(&self, filter: &Filter) -> Result<u64> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.read_state();
        Ok(state.records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Record>> {
        let state = self.read_state();
        Ok(state
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn find_one_and_update(
        &self,
        filter: &Filter,
        changes: Record,
    ) -> Result<Option<Record>> {
        let mut state = self.write_state();
        let Some(pos) = Self::position_of(&state, filter) else {
            return Ok(None);
        };
        let mut updated = self.update_positions(&mut state, &[pos], &changes)?;
        Ok(updated.pop())
    }

    async fn find_by_id_and_update(&self, id: &str, changes: Record) -> Result<Option<Record>> {
        self.find_one_and_update(&Filter::by_id(id), changes).await
    }

    async fn find_one_and_remove(&self, filter: &Filter) -> Result<Option<Record>> {
        let mut state = self.write_state();
        Ok(Self::position_of(&state, filter).map(|pos| state.records.remove(pos)))
    }

    async fn find_by_id_and_remove(&self, id: &str) -> Result<Option<Record>> {
        self.find_one_and_remove(&Filter::by_id(id)).await
    }

    async fn remove(&self, filter: &Filter) -> Result<u64> {
        let mut state = self.write_state();
        let before = state.records.len();
        state.records.retain(|r| !filter.matches(r));
        Ok((before - state.records.len()) as u64)
    }

    async fn update(&self, filter: &Filter, changes: Record) -> Result<u64> {
        let mut state = self.write_state();
        let positions: Vec<usize> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| filter.matches(r))
            .map(|(pos, _)| pos)
            .collect();
        let updated = self.update_positions(&mut state, &positions, &changes)?;
        Ok(updated.len() as u64)
    }

    async fn save(&self, mut document: Record) -> Result<Record> {
        let mut state = self.write_state();

        let existing = document
            .get(ID_FIELD)
            .and_then(|id| state.records.iter().position(|r| r.get(ID_FIELD) == Some(id)));

        match existing {
            Some(pos) => {
                self.check_unique(&state, &document)?;
                state.records[pos] = document.clone();
            }
            None => {
                if !document.contains_key(ID_FIELD) {
                    let id = self.generate_id(&mut state);
                    document.insert(ID_FIELD.to_string(), Value::String(id));
                }
                self.check_unique(&state, &document)?;
                state.records.push(document.clone());
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changewatch_api::record;

    fn store() -> MemoryStore {
        MemoryStore::new("Item").with_unique_field("uuid")
    }

    #[tokio::test]
    async fn test_save_assigns_deterministic_ids() -> anyhow::Result<()> {
        let store = store();
        let a = store.save(record([("uuid", "a")])).await?;
        let b = store.save(record([("uuid", "b")])).await?;

        assert_eq!(a.get(ID_FIELD), Some(&Value::from("local://Item/0")));
        assert_eq!(b.get(ID_FIELD), Some(&Value::from("local://Item/1")));
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_replaces_existing_document() -> anyhow::Result<()> {
        let store = store();
        let mut doc = store.save(record([("uuid", "a"), ("name", "old")])).await?;
        doc.insert("name".into(), "new".into());

        store.save(doc).await?;

        assert_eq!(store.len(), 1);
        assert_eq!(store.count(&Filter::eq("name", "new")).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_unique_value_is_rejected() -> anyhow::Result<()> {
        let store = store();
        store.save(record([("uuid", "a")])).await?;

        let err = store.save(record([("uuid", "a")])).await.unwrap_err();

        assert_eq!(
            err,
            StoreError::DuplicateKey {
                entity: "Item".into(),
                field: "uuid".into(),
                value: "\"a\"".into(),
            }
        );
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_without_unique_value_do_not_clash() -> anyhow::Result<()> {
        let store = store();
        store.save(Record::new()).await?;
        store.save(Record::new()).await?;
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_is_all_or_nothing() -> anyhow::Result<()> {
        let store = store();
        store.save(record([("uuid", "a"), ("group", "g")])).await?;
        store.save(record([("uuid", "b"), ("group", "g")])).await?;

        let err = store
            .update(&Filter::eq("group", "g"), record([("uuid", "same")]))
            .await;

        assert!(matches!(err, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(store.count(&Filter::eq("uuid", "same")).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_type_level_operations() -> anyhow::Result<()> {
        let store = store();
        let a = store.save(record([("uuid", "a"), ("n", "1")])).await?;
        store.save(record([("uuid", "b"), ("n", "1")])).await?;
        let id = a.get(ID_FIELD).and_then(Value::as_string).unwrap().to_string();

        let updated = store
            .find_by_id_and_update(&id, record([("n", "2")]))
            .await?
            .unwrap();
        assert_eq!(updated.get("n"), Some(&Value::from("2")));

        assert_eq!(store.update(&Filter::All, record([("n", "3")])).await?, 2);
        assert!(store.find_one_and_update(&Filter::eq("uuid", "zz"), Record::new()).await?.is_none());

        let removed = store.find_by_id_and_remove(&id).await?.unwrap();
        assert_eq!(removed.get("uuid"), Some(&Value::from("a")));

        assert_eq!(store.remove(&Filter::eq("do", "notMatch")).await?, 0);
        assert!(store.find_one_and_remove(&Filter::eq("uuid", "b")).await?.is_some());
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_count_queries_are_counted() -> anyhow::Result<()> {
        let store = store();
        store.count(&Filter::All).await?;
        store.count(&Filter::eq("uuid", "a")).await?;
        assert_eq!(store.count_queries(), 2);
        Ok(())
    }
}
