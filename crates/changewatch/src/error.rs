use changewatch_api::StoreError;
use thiserror::Error;

/// Failure of a change assertion.
///
/// `CountMismatch`, `MutationState` and `Unsatisfied` are retryable: the
/// orchestrator keeps re-checking until its retry budget runs out. The other
/// variants end the assertion on first occurrence.
#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("Action failed: {0:#}")]
    Action(anyhow::Error),

    #[error("{}", .diagnostics.join("\n"))]
    CountMismatch { diagnostics: Vec<String> },

    #[error("{}", .diagnostics.join("\n"))]
    MutationState { diagnostics: Vec<String> },

    /// Both the mutation check and the count check failed in one attempt.
    #[error("{}", join_errors(.0))]
    Unsatisfied(Vec<AssertionError>),

    #[error("Entity type '{entity}' is not registered")]
    Lookup { entity: String },

    #[error("Count query failed: {0}")]
    Store(#[from] StoreError),
}

impl AssertionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AssertionError::CountMismatch { .. } | AssertionError::MutationState { .. } => true,
            AssertionError::Unsatisfied(errors) => errors.iter().all(AssertionError::is_retryable),
            AssertionError::Action(_) | AssertionError::Lookup { .. } | AssertionError::Store(_) => {
                false
            }
        }
    }

    /// Every diagnostic line carried by this error.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            AssertionError::CountMismatch { diagnostics }
            | AssertionError::MutationState { diagnostics } => diagnostics.clone(),
            AssertionError::Unsatisfied(errors) => {
                errors.iter().flat_map(AssertionError::diagnostics).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

fn join_errors(errors: &[AssertionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, AssertionError>;
