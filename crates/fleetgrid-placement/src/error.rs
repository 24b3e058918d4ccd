use fleetgrid_state::StateError;
use thiserror::Error;

pub type AffinityResult<T> = Result<T, AffinityError>;
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors raised while compiling affinity rules.
#[derive(Debug, Error)]
pub enum AffinityError {
    #[error("invalid affinity rule {rule:?}: {reason}")]
    Parse { rule: String, reason: String },

    #[error("affinity configuration error: {0}")]
    Configuration(String),
}

impl AffinityError {
    pub(crate) fn parse(rule: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Affinity(#[from] AffinityError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("placement configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),
}
