//! Change-assertion orchestrator
//!
//! Runs one assertion cycle:
//!
//! ```text
//! SnapshotBefore -> RunAction -> { SnapshotAfter -> Evaluate }* -> Succeeded | Failed
//! ```
//!
//! The before-snapshot is taken once and reused on every attempt; only the
//! after-snapshot is re-fetched, so delayed writes are picked up without
//! running the action again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use changewatch_core::{EntityType, Filter};
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::{AssertionError, Result};
use crate::interception::InterceptionRegistry;
use crate::predicate::{MutationAssertion, assert_mutation_state};
use crate::snapshot::{Expectation, snapshot};

/// Phases of one assertion call, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionPhase {
    SnapshotBefore,
    RunAction,
    SnapshotAfter,
    Evaluate,
    Succeeded,
    Failed,
}

impl fmt::Display for AssertionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssertionPhase::SnapshotBefore => "snapshot_before",
            AssertionPhase::RunAction => "run_action",
            AssertionPhase::SnapshotAfter => "snapshot_after",
            AssertionPhase::Evaluate => "evaluate",
            AssertionPhase::Succeeded => "succeeded",
            AssertionPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// What an action is expected to change.
#[derive(Debug, Clone, Default)]
pub struct ExpectedChanges {
    pub counts: Option<Vec<Expectation>>,
    pub was_mutated: Option<Vec<MutationAssertion>>,
    pub retry: Option<RetryPolicy>,
}

impl ExpectedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `entity_type.count(filter)` to change by `expected_delta`.
    pub fn count(mut self, entity_type: &Arc<EntityType>, filter: Filter, expected_delta: i64) -> Self {
        self.counts
            .get_or_insert_with(Vec::new)
            .push(Expectation::new(entity_type, filter, expected_delta));
        self
    }

    pub fn was_mutated(mut self, entity_type: &Arc<EntityType>, expected: bool) -> Self {
        self.was_mutated
            .get_or_insert_with(Vec::new)
            .push(MutationAssertion::new(entity_type, expected));
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    fn expectations(&self) -> &[Expectation] {
        self.counts.as_deref().unwrap_or(&[])
    }

    fn referenced_names(&self) -> impl Iterator<Item = &str> {
        self.expectations()
            .iter()
            .map(Expectation::model_name)
            .chain(
                self.was_mutated
                    .iter()
                    .flatten()
                    .map(MutationAssertion::model_name),
            )
    }
}

/// One change assertion: an action and what it should change.
pub struct ChangeAssertionRequest<A> {
    pub action: A,
    pub expected_changes: ExpectedChanges,
}

impl<A> ChangeAssertionRequest<A> {
    pub fn new(action: A, expected_changes: ExpectedChanges) -> Self {
        Self {
            action,
            expected_changes,
        }
    }
}

/// Outcome of a successful assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    /// Evaluation attempts used, at least 1
    pub attempts: u32,
    pub before: Vec<u64>,
    pub after: Vec<u64>,
}

impl ChangeReport {
    pub fn deltas(&self) -> Vec<i64> {
        self.before
            .iter()
            .zip(&self.after)
            .map(|(before, after)| delta(*before, *after))
            .collect()
    }
}

/// `after - before`, saturating at the bounds of `i64`.
fn delta(before: u64, after: u64) -> i64 {
    let before = i64::try_from(before).unwrap_or(i64::MAX);
    let after = i64::try_from(after).unwrap_or(i64::MAX);
    after.saturating_sub(before)
}

/// Run `request.action` and assert its expected changes.
///
/// Action errors, unregistered entity types and failing count queries end the
/// call immediately. Count and mutation mismatches are retried according to
/// the request's retry policy (one attempt by default).
#[tracing::instrument(skip_all)]
pub async fn assert_changes<A, Fut, T, E>(
    registry: &InterceptionRegistry,
    request: ChangeAssertionRequest<A>,
) -> Result<ChangeReport>
where
    A: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    let ChangeAssertionRequest {
        action,
        expected_changes: expected,
    } = request;

    for name in expected.referenced_names() {
        registry.ensure_registered(name)?;
    }

    debug!(phase = %AssertionPhase::SnapshotBefore);
    let before = snapshot(expected.expectations()).await?;

    debug!(phase = %AssertionPhase::RunAction);
    if let Err(err) = action().await {
        let err = AssertionError::Action(err.into());
        warn!(phase = %AssertionPhase::Failed, "{}", err);
        return Err(err);
    }

    let policy = expected.retry.unwrap_or_default();
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;

        debug!(phase = %AssertionPhase::SnapshotAfter, attempt);
        let after = snapshot(expected.expectations()).await?;

        debug!(phase = %AssertionPhase::Evaluate, attempt);
        match evaluate(registry, &expected, &before, &after) {
            Ok(()) => {
                info!(
                    phase = %AssertionPhase::Succeeded,
                    "Change assertion held after {}/{} attempts",
                    attempt,
                    attempts
                );
                return Ok(ChangeReport {
                    attempts: attempt,
                    before,
                    after,
                });
            }
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(
                    "Attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, attempts, policy.interval, err
                );
                tokio::time::sleep(policy.interval).await;
            }
            Err(err) => {
                warn!(
                    phase = %AssertionPhase::Failed,
                    "Change assertion failed after {} attempts: {}",
                    attempt,
                    err
                );
                return Err(err);
            }
        }
    }
}

/// Run the mutation check and the count check of one attempt.
fn evaluate(
    registry: &InterceptionRegistry,
    expected: &ExpectedChanges,
    before: &[u64],
    after: &[u64],
) -> Result<()> {
    let mutation_check = match &expected.was_mutated {
        Some(assertions) => assert_mutation_state(registry, assertions),
        None => Ok(()),
    };
    let count_check = check_counts(expected.expectations(), before, after);

    match (mutation_check, count_check) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(mutation), Err(counts)) => {
            if mutation.is_retryable() {
                Err(AssertionError::Unsatisfied(vec![mutation, counts]))
            } else {
                Err(mutation)
            }
        }
    }
}

/// Compare `after - before` with each expectation's delta.
pub fn check_counts(expectations: &[Expectation], before: &[u64], after: &[u64]) -> Result<()> {
    let diagnostics: Vec<String> = expectations
        .iter()
        .zip(before.iter().zip(after))
        .filter_map(|(expectation, (before, after))| {
            let actual = delta(*before, *after);
            (actual != expectation.expected_delta).then(|| {
                format!(
                    "Expected {}.count({}) to change by '{}' instead of '{}'.",
                    expectation.model_name(),
                    expectation.filter,
                    expectation.expected_delta,
                    actual
                )
            })
        })
        .collect();

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(AssertionError::CountMismatch { diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changewatch_core::{MemoryStore, record};
    use proptest::prelude::*;

    fn item_type() -> Arc<EntityType> {
        Arc::new(EntityType::new(
            "Item",
            Arc::new(MemoryStore::new("Item").with_unique_field("uuid")),
        ))
    }

    #[test]
    fn test_count_diagnostic_format() {
        let item = item_type();
        let expectations = vec![
            Expectation::new(&item, Filter::All, 1),
            Expectation::new(&item, Filter::eq("uuid", "a"), 0),
            Expectation::new(&item, Filter::eq("done", true), 2),
        ];

        let err = check_counts(&expectations, &[0, 5, 3], &[1, 4, 3]).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Expected Item.count({\"uuid\":\"a\"}) to change by '0' instead of '-1'.\n\
             Expected Item.count({\"done\":true}) to change by '2' instead of '0'."
        );
    }

    #[test]
    fn test_report_deltas() {
        let report = ChangeReport {
            attempts: 1,
            before: vec![3, 0],
            after: vec![1, 2],
        };
        assert_eq!(report.deltas(), vec![-2, 2]);
    }

    #[test]
    fn test_delta_saturates_for_huge_counts() {
        assert_eq!(delta(0, u64::MAX), i64::MAX);
        assert_eq!(delta(u64::MAX, 0), -i64::MAX);
        assert_eq!(delta(u64::MAX, u64::MAX), 0);
        assert_eq!(delta(i64::MAX as u64, u64::MAX), 0);
        assert_eq!(delta(5, 3), -2);
    }

    proptest! {
        #[test]
        fn prop_count_check_holds_iff_delta_matches(
            before in 0u64..1_000,
            after in 0u64..1_000,
            expected in -1_000i64..1_000,
        ) {
            let item = item_type();
            let expectations = vec![Expectation::new(&item, Filter::All, expected)];
            let actual = after as i64 - before as i64;

            match check_counts(&expectations, &[before], &[after]) {
                Ok(()) => prop_assert_eq!(actual, expected),
                Err(err) => {
                    prop_assert_ne!(actual, expected);
                    let expected_fragment = format!("by '{}'", expected);
                    let actual_fragment = format!("instead of '{}'", actual);
                    let message = err.to_string();
                    prop_assert!(message.contains(&expected_fragment));
                    prop_assert!(message.contains(&actual_fragment));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_action_error_aborts_before_evaluation() {
        let item = item_type();
        let registry = InterceptionRegistry::default();
        registry.register(&[item.clone()]);

        let request = ChangeAssertionRequest::new(
            || async { Err::<(), _>(anyhow::anyhow!("action exploded")) },
            ExpectedChanges::new()
                .count(&item, Filter::All, 1)
                .retry(RetryPolicy::from_millis(1, 5)),
        );

        let err = assert_changes(&registry, request).await.unwrap_err();
        assert!(matches!(err, AssertionError::Action(_)));
        assert!(err.to_string().contains("action exploded"));
    }

    #[tokio::test]
    async fn test_unregistered_entity_fails_before_action() {
        let item = item_type();
        let registry = InterceptionRegistry::default();
        let ran = std::sync::atomic::AtomicBool::new(false);
        let ran_flag = &ran;

        let request = ChangeAssertionRequest::new(
            move || async move {
                ran_flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            },
            ExpectedChanges::new().was_mutated(&item, false),
        );

        let err = assert_changes(&registry, request).await.unwrap_err();
        assert!(matches!(err, AssertionError::Lookup { .. }));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_both_checks_failing_reports_both() {
        let item = item_type();
        let registry = InterceptionRegistry::default();
        registry.register(&[item.clone()]);

        let request = ChangeAssertionRequest::new(
            || async { Ok::<_, anyhow::Error>(()) },
            ExpectedChanges::new()
                .count(&item, Filter::All, 1)
                .was_mutated(&item, true),
        );

        let err = assert_changes(&registry, request).await.unwrap_err();
        assert!(matches!(err, AssertionError::Unsatisfied(_)));
        assert_eq!(
            err.to_string(),
            "No mutation method called on 'Item'.\n\
             Expected Item.count({}) to change by '1' instead of '0'."
        );
    }

    #[tokio::test]
    async fn test_no_expectations_trivially_hold() -> anyhow::Result<()> {
        let registry = InterceptionRegistry::default();
        let report = assert_changes(
            &registry,
            ChangeAssertionRequest::new(|| async { Ok::<_, anyhow::Error>(()) }, ExpectedChanges::new()),
        )
        .await?;
        assert_eq!(report.attempts, 1);
        assert!(report.before.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_delta() -> anyhow::Result<()> {
        let item = item_type();
        let registry = InterceptionRegistry::default();
        registry.register(&[item.clone()]);
        item.create(record([("uuid", "a")])).await?;
        item.create(record([("uuid", "b")])).await?;
        let all = Filter::All;

        let report = assert_changes(
            &registry,
            ChangeAssertionRequest::new(
                || item.remove(&all),
                ExpectedChanges::new()
                    .count(&item, Filter::All, -2)
                    .was_mutated(&item, true),
            ),
        )
        .await?;

        assert_eq!(report.deltas(), vec![-2]);
        Ok(())
    }
}
