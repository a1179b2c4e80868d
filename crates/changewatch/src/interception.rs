//! Interception registry
//!
//! Tracks which mutating operations were invoked on each registered entity
//! type. Registration attaches an `Interceptor` to the entity type's observer
//! list; `restore` detaches it again.
//!
//! Lifecycle: `register` → (`reset` between test cases) → `restore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use changewatch_core::{EntityType, MutatingOperation, ObserverId, OperationObserver, OperationScope};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AssertionError, Result};

/// What counts as an invocation of a tracked operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Only calls that returned `Ok`. A write the store rejected (e.g. a
    /// duplicate key) is not an invocation.
    #[default]
    OnSuccess,
    /// Every call that was entered, whatever its outcome.
    OnEntry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub calls: u32,
    pub successes: u32,
    pub failures: u32,
}

impl OperationStats {
    pub fn invocations(&self, mode: TrackingMode) -> u32 {
        match mode {
            TrackingMode::OnSuccess => self.successes,
            TrackingMode::OnEntry => self.calls,
        }
    }

    pub fn invoked(&self, mode: TrackingMode) -> bool {
        self.invocations(mode) > 0
    }
}

/// Invocation history of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptionRecord {
    type_level: HashMap<MutatingOperation, OperationStats>,
    instance: HashMap<MutatingOperation, OperationStats>,
}

impl Default for InterceptionRecord {
    fn default() -> Self {
        Self {
            type_level: zeroed(&MutatingOperation::TYPE_LEVEL),
            instance: zeroed(&MutatingOperation::INSTANCE_LEVEL),
        }
    }
}

fn zeroed(operations: &[MutatingOperation]) -> HashMap<MutatingOperation, OperationStats> {
    operations
        .iter()
        .map(|op| (*op, OperationStats::default()))
        .collect()
}

impl InterceptionRecord {
    pub fn stats(&self, operation: MutatingOperation) -> OperationStats {
        self.scope_map(operation.scope())
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// First invoked operation of `scope`, in declaration order.
    pub fn first_invoked(
        &self,
        scope: OperationScope,
        mode: TrackingMode,
    ) -> Option<MutatingOperation> {
        MutatingOperation::in_scope(scope)
            .iter()
            .copied()
            .find(|op| self.stats(*op).invoked(mode))
    }

    pub fn total_invocations(&self, mode: TrackingMode) -> u32 {
        MutatingOperation::all()
            .map(|op| self.stats(op).invocations(mode))
            .sum()
    }

    fn scope_map(&self, scope: OperationScope) -> &HashMap<MutatingOperation, OperationStats> {
        match scope {
            OperationScope::Type => &self.type_level,
            OperationScope::Instance => &self.instance,
        }
    }

    fn stats_mut(&mut self, operation: MutatingOperation) -> &mut OperationStats {
        let map = match operation.scope() {
            OperationScope::Type => &mut self.type_level,
            OperationScope::Instance => &mut self.instance,
        };
        map.entry(operation).or_default()
    }
}

/// Observer attached to a registered entity type.
struct Interceptor {
    record: Arc<Mutex<InterceptionRecord>>,
}

impl OperationObserver for Interceptor {
    fn on_enter(&self, _model_name: &str, operation: MutatingOperation) {
        let mut record = self.record.lock().unwrap_or_else(|e| e.into_inner());
        record.stats_mut(operation).calls += 1;
    }

    fn on_exit(&self, _model_name: &str, operation: MutatingOperation, succeeded: bool) {
        let mut record = self.record.lock().unwrap_or_else(|e| e.into_inner());
        let stats = record.stats_mut(operation);
        // Entered before the last reset.
        if stats.successes + stats.failures >= stats.calls {
            return;
        }
        if succeeded {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
    }
}

struct Registration {
    entity_type: Arc<EntityType>,
    observer_id: ObserverId,
    record: Arc<Mutex<InterceptionRecord>>,
}

impl Registration {
    fn detach(&self) {
        self.entity_type.detach_observer(self.observer_id);
    }
}

pub struct InterceptionRegistry {
    mode: TrackingMode,
    registrations: Mutex<HashMap<String, Registration>>,
}

impl InterceptionRegistry {
    pub fn new(mode: TrackingMode) -> Self {
        Self {
            mode,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Attach interceptors to every given entity type.
    ///
    /// An entity type that is already registered loses its previous
    /// interceptor and history.
    pub fn register(&self, entity_types: &[Arc<EntityType>]) {
        let mut registrations = self.lock();
        for entity_type in entity_types {
            let name = entity_type.model_name().to_string();
            if let Some(previous) = registrations.remove(&name) {
                previous.detach();
            }

            let record = Arc::new(Mutex::new(InterceptionRecord::default()));
            let observer_id = entity_type.attach_observer(Arc::new(Interceptor {
                record: record.clone(),
            }));
            debug!("[InterceptionRegistry] Registered '{}'", name);

            registrations.insert(
                name,
                Registration {
                    entity_type: entity_type.clone(),
                    observer_id,
                    record,
                },
            );
        }
    }

    pub fn is_registered(&self, model_name: &str) -> bool {
        self.lock().contains_key(model_name)
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn ensure_registered(&self, model_name: &str) -> Result<()> {
        if self.is_registered(model_name) {
            Ok(())
        } else {
            Err(AssertionError::Lookup {
                entity: model_name.to_string(),
            })
        }
    }

    /// Point-in-time copy of an entity type's history.
    pub fn record(&self, model_name: &str) -> Result<InterceptionRecord> {
        self.with_record(model_name, InterceptionRecord::clone)
    }

    pub fn was_invoked(&self, model_name: &str, operation: MutatingOperation) -> Result<bool> {
        let mode = self.mode;
        self.with_record(model_name, |record| record.stats(operation).invoked(mode))
    }

    pub fn any_invoked(
        &self,
        model_name: &str,
        scope: OperationScope,
    ) -> Result<Option<MutatingOperation>> {
        let mode = self.mode;
        self.with_record(model_name, |record| record.first_invoked(scope, mode))
    }

    /// Clear the history of every registered entity type. Interceptors stay
    /// attached.
    ///
    /// A call still in flight during the reset is forgotten entirely: its
    /// completion is not recorded in either tracking mode.
    pub fn reset(&self) {
        for registration in self.lock().values() {
            *registration
                .record
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = InterceptionRecord::default();
        }
    }

    /// Detach every interceptor and forget all entity types. Safe to call
    /// repeatedly.
    pub fn restore(&self) {
        let mut registrations = self.lock();
        for (name, registration) in registrations.drain() {
            registration.detach();
            debug!("[InterceptionRegistry] Restored '{}'", name);
        }
    }

    fn with_record<R>(
        &self,
        model_name: &str,
        f: impl FnOnce(&InterceptionRecord) -> R,
    ) -> Result<R> {
        let registrations = self.lock();
        let registration = registrations
            .get(model_name)
            .ok_or_else(|| AssertionError::Lookup {
                entity: model_name.to_string(),
            })?;
        let record = registration.record.lock().unwrap_or_else(|e| e.into_inner());
        Ok(f(&*record))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Registration>> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InterceptionRegistry {
    fn default() -> Self {
        Self::new(TrackingMode::default())
    }
}
