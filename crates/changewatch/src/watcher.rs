//! `ChangeWatcher`: the public entry point of changewatch.

use std::future::Future;
use std::sync::Arc;

use changewatch_core::EntityType;

use crate::config::ChangewatchConfig;
use crate::error::Result;
use crate::interception::InterceptionRegistry;
use crate::orchestrator::{self, ChangeAssertionRequest, ChangeReport, ExpectedChanges};
use crate::predicate::{self, MutationAssertion};

/// Owns the interception registry for a test suite run.
///
/// # Example
///
/// ```rust,no_run
/// use changewatch::{ChangeWatcher, ExpectedChanges};
/// use changewatch_core::{record, EntityType, Filter, MemoryStore};
/// use std::sync::Arc;
///
/// async fn example() -> anyhow::Result<()> {
///     let item = Arc::new(EntityType::new("Item", Arc::new(MemoryStore::new("Item"))));
///     let watcher = ChangeWatcher::new();
///     watcher.register_models(&[item.clone()]);
///
///     watcher
///         .assert_changes(
///             || item.create(record([("name", "milk")])),
///             ExpectedChanges::new()
///                 .count(&item, Filter::All, 1)
///                 .was_mutated(&item, true),
///         )
///         .await?;
///
///     watcher.restore();
///     Ok(())
/// }
/// ```
pub struct ChangeWatcher {
    registry: InterceptionRegistry,
    config: ChangewatchConfig,
}

impl ChangeWatcher {
    pub fn new() -> Self {
        Self::with_config(ChangewatchConfig::default())
    }

    pub fn with_config(config: ChangewatchConfig) -> Self {
        Self {
            registry: InterceptionRegistry::new(config.tracking),
            config,
        }
    }

    pub fn config(&self) -> &ChangewatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    /// Start tracking mutating operations on these entity types. Must happen
    /// before any assertion that references them.
    pub fn register_models(&self, entity_types: &[Arc<EntityType>]) {
        self.registry.register(entity_types);
    }

    /// Run `action` and assert `expected` against its effects.
    ///
    /// Requests without a retry policy use the configured one.
    pub async fn assert_changes<A, Fut, T, E>(
        &self,
        action: A,
        mut expected: ExpectedChanges,
    ) -> Result<ChangeReport>
    where
        A: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        expected.retry.get_or_insert(self.config.retry);
        orchestrator::assert_changes(&self.registry, ChangeAssertionRequest::new(action, expected))
            .await
    }

    pub fn assert_mutation_state(&self, assertions: &[MutationAssertion]) -> Result<()> {
        predicate::assert_mutation_state(&self.registry, assertions)
    }

    /// Clear invocation history, keeping interceptors. Call between
    /// independent assertions.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Detach all interceptors. Call once at teardown.
    pub fn restore(&self) {
        self.registry.restore();
    }
}

impl Default for ChangeWatcher {
    fn default() -> Self {
        Self::new()
    }
}
