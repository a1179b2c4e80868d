//! Mutation predicate evaluation
//!
//! Decides "was this entity type mutated" from the interception registry's
//! invocation history. The predicate is invocation based: a `remove` whose
//! filter matched nothing still counts as a mutation.

use std::sync::Arc;

use changewatch_core::{EntityType, OperationScope};
use tracing::debug;

use crate::error::{AssertionError, Result};
use crate::interception::InterceptionRegistry;

/// Expected mutation state of one entity type.
#[derive(Debug, Clone)]
pub struct MutationAssertion {
    pub entity_type: Arc<EntityType>,
    pub expected_was_mutated: bool,
}

impl MutationAssertion {
    pub fn new(entity_type: &Arc<EntityType>, expected_was_mutated: bool) -> Self {
        Self {
            entity_type: entity_type.clone(),
            expected_was_mutated,
        }
    }

    pub fn model_name(&self) -> &str {
        self.entity_type.model_name()
    }
}

/// Check every assertion against the registry.
///
/// All assertions are evaluated; the error carries one diagnostic per failing
/// assertion. An unregistered entity type fails with `Lookup` instead.
pub fn assert_mutation_state(
    registry: &InterceptionRegistry,
    assertions: &[MutationAssertion],
) -> Result<()> {
    let mut diagnostics = Vec::new();
    let mut lookup_error = None;

    for assertion in assertions {
        match check_assertion(registry, assertion) {
            Ok(None) => {}
            Ok(Some(diagnostic)) => diagnostics.push(diagnostic),
            Err(err) => {
                lookup_error.get_or_insert(err);
            }
        }
    }

    if let Some(err) = lookup_error {
        return Err(err);
    }
    if diagnostics.is_empty() {
        Ok(())
    } else {
        debug!(
            "[assert_mutation_state] {} of {} assertions failed",
            diagnostics.len(),
            assertions.len()
        );
        Err(AssertionError::MutationState { diagnostics })
    }
}

/// Returns the diagnostic for a failing assertion, `None` when it holds.
fn check_assertion(
    registry: &InterceptionRegistry,
    assertion: &MutationAssertion,
) -> Result<Option<String>> {
    let model_name = assertion.model_name();
    let invoked = match registry.any_invoked(model_name, OperationScope::Instance)? {
        Some(operation) => Some(operation),
        None => registry.any_invoked(model_name, OperationScope::Type)?,
    };

    Ok(match (assertion.expected_was_mutated, invoked) {
        (true, None) => Some(format!("No mutation method called on '{}'.", model_name)),
        (false, Some(operation)) => Some(format!("{} was called.", operation.describe(model_name))),
        _ => None,
    })
}
