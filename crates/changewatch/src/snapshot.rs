//! Count snapshots for a set of expectations.

use std::sync::Arc;

use changewatch_core::{EntityType, Filter};
use futures::future::try_join_all;

use crate::error::Result;

/// Expected change of `entity_type.count(filter)` across an action.
#[derive(Debug, Clone)]
pub struct Expectation {
    pub entity_type: Arc<EntityType>,
    pub filter: Filter,
    pub expected_delta: i64,
}

impl Expectation {
    pub fn new(entity_type: &Arc<EntityType>, filter: Filter, expected_delta: i64) -> Self {
        Self {
            entity_type: entity_type.clone(),
            filter,
            expected_delta,
        }
    }

    pub fn model_name(&self) -> &str {
        self.entity_type.model_name()
    }
}

/// Count the records matching each expectation's filter.
///
/// All queries run concurrently on the current task; the first failing query
/// drops the rest and its error is returned. Counts come back in input order.
pub async fn snapshot(expectations: &[Expectation]) -> Result<Vec<u64>> {
    let counts = try_join_all(
        expectations
            .iter()
            .map(|expectation| expectation.entity_type.count(&expectation.filter)),
    )
    .await?;
    Ok(counts)
}
