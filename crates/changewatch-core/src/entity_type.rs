//! Caller-facing entity type handle.
//!
//! Every mutating call on an `EntityType` runs through its observer list:
//! observers see the call being entered and whether it returned `Ok`, and
//! nothing else. The wrapped store's arguments and results pass through
//! untouched, so attaching or detaching an observer never changes behavior.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use changewatch_api::{Filter, Record, Result};
use tracing::trace;

use crate::operation::MutatingOperation;
use crate::store::EntityStore;

/// Receives notifications about mutating calls on an entity type.
pub trait OperationObserver: Send + Sync {
    fn on_enter(&self, model_name: &str, operation: MutatingOperation);

    fn on_exit(&self, model_name: &str, operation: MutatingOperation, succeeded: bool);
}

/// Handle returned by `EntityType::attach_observer`, used to detach it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// A named entity type backed by an `EntityStore`.
pub struct EntityType {
    model_name: String,
    store: Arc<dyn EntityStore>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn OperationObserver>)>>,
    next_observer_id: AtomicU64,
}

impl EntityType {
    pub fn new(model_name: impl Into<String>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            model_name: model_name.into(),
            store,
            observers: RwLock::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn attach_observer(&self, observer: Arc<dyn OperationObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, observer));
        id
    }

    /// Returns false if the observer was not attached (already detached).
    pub fn detach_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.store.count(filter).await
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<Record>> {
        self.store.find(filter).await
    }

    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        changes: Record,
    ) -> Result<Option<Record>> {
        self.observed(
            MutatingOperation::FindOneAndUpdate,
            self.store.find_one_and_update(filter, changes),
        )
        .await
    }

    pub async fn find_by_id_and_update(&self, id: &str, changes: Record) -> Result<Option<Record>> {
        self.observed(
            MutatingOperation::FindByIdAndUpdate,
            self.store.find_by_id_and_update(id, changes),
        )
        .await
    }

    pub async fn find_one_and_remove(&self, filter: &Filter) -> Result<Option<Record>> {
        self.observed(
            MutatingOperation::FindOneAndRemove,
            self.store.find_one_and_remove(filter),
        )
        .await
    }

    pub async fn find_by_id_and_remove(&self, id: &str) -> Result<Option<Record>> {
        self.observed(
            MutatingOperation::FindByIdAndRemove,
            self.store.find_by_id_and_remove(id),
        )
        .await
    }

    pub async fn remove(&self, filter: &Filter) -> Result<u64> {
        self.observed(MutatingOperation::Remove, self.store.remove(filter))
            .await
    }

    pub async fn update(&self, filter: &Filter, changes: Record) -> Result<u64> {
        self.observed(MutatingOperation::Update, self.store.update(filter, changes))
            .await
    }

    /// Instance-level save of a single document.
    pub async fn save(&self, document: Record) -> Result<Record> {
        self.observed(MutatingOperation::Save, self.store.save(document))
            .await
    }

    /// Create a new record. Goes through `save`, so observers see a save.
    pub async fn create(&self, fields: Record) -> Result<Record> {
        self.save(fields).await
    }

    fn current_observers(&self) -> Vec<Arc<dyn OperationObserver>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    async fn observed<T, F>(&self, operation: MutatingOperation, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let observers = self.current_observers();
        trace!(
            "[EntityType] {} entered ({} observers)",
            operation.describe(&self.model_name),
            observers.len()
        );

        for observer in &observers {
            observer.on_enter(&self.model_name, operation);
        }

        let result = call.await;

        for observer in &observers {
            observer.on_exit(&self.model_name, operation, result.is_ok());
        }
        result
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("model_name", &self.model_name)
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use changewatch_api::record;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
    }

    impl OperationObserver for EventLog {
        fn on_enter(&self, model_name: &str, operation: MutatingOperation) {
            self.events
                .lock()
                .unwrap()
                .push(format!("enter {}", operation.describe(model_name)));
        }

        fn on_exit(&self, model_name: &str, operation: MutatingOperation, succeeded: bool) {
            self.events.lock().unwrap().push(format!(
                "exit {} ok={}",
                operation.describe(model_name),
                succeeded
            ));
        }
    }

    fn item_type() -> EntityType {
        EntityType::new("Item", Arc::new(MemoryStore::new("Item").with_unique_field("uuid")))
    }

    #[tokio::test]
    async fn test_create_is_observed_as_save() -> anyhow::Result<()> {
        let item = item_type();
        let log = Arc::new(EventLog::default());
        item.attach_observer(log.clone());

        item.create(record([("uuid", "a")])).await?;

        assert_eq!(
            *log.events.lock().unwrap(),
            vec!["enter Item#save()", "exit Item#save() ok=true"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_call_reports_failure_and_passes_error_through() -> anyhow::Result<()> {
        let item = item_type();
        item.create(record([("uuid", "a")])).await?;

        let log = Arc::new(EventLog::default());
        item.attach_observer(log.clone());

        let err = item.create(record([("uuid", "a")])).await.unwrap_err();
        assert!(matches!(err, changewatch_api::StoreError::DuplicateKey { .. }));
        assert_eq!(
            *log.events.lock().unwrap(),
            vec!["enter Item#save()", "exit Item#save() ok=false"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_observer_does_not_change_results() -> anyhow::Result<()> {
        let plain = item_type();
        let observed = item_type();
        observed.attach_observer(Arc::new(EventLog::default()));

        for item in [&plain, &observed] {
            item.create(record([("uuid", "a"), ("name", "x")])).await?;
            item.create(record([("uuid", "b"), ("name", "x")])).await?;
        }

        let filter = Filter::eq("name", "x");
        assert_eq!(
            plain.update(&filter, record([("name", "y")])).await?,
            observed.update(&filter, record([("name", "y")])).await?
        );
        assert_eq!(
            plain.remove(&Filter::eq("uuid", "a")).await?,
            observed.remove(&Filter::eq("uuid", "a")).await?
        );
        assert_eq!(plain.count(&Filter::All).await?, 1);
        assert_eq!(observed.count(&Filter::All).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_detached_observer_sees_nothing() -> anyhow::Result<()> {
        let item = item_type();
        let log = Arc::new(EventLog::default());
        let id = item.attach_observer(log.clone());

        assert!(item.detach_observer(id));
        assert!(!item.detach_observer(id));
        assert_eq!(item.observer_count(), 0);

        item.remove(&Filter::All).await?;
        assert!(log.events.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_reads_are_not_observed() -> anyhow::Result<()> {
        let item = item_type();
        let log = Arc::new(EventLog::default());
        item.attach_observer(log.clone());

        item.count(&Filter::All).await?;
        item.find(&Filter::All).await?;

        assert!(log.events.lock().unwrap().is_empty());
        Ok(())
    }
}
