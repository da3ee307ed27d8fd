//! Error taxonomy of the planner
//!
//! Every failure aborts the whole compilation; no partial plan is returned.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::registry::RegistryError;

/// Category of a [`PlanError`], for callers that branch on the kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    Semantic,
    Unsupported,
    InvalidArgument,
    TableNotFound,
    DepthExceeded,
}

#[derive(Debug, Error)]
pub enum PlanError {
    /// Unresolvable field, bad rename target, duplicate fill target, name collision
    #[error("Semantic error: {0}")]
    Semantic(String),

    /// Command or option the planner does not translate
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Option with an out-of-range or wrongly typed value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    TableNotFound(#[from] CatalogError),

    #[error("Plan nesting exceeds the maximum depth of {limit}")]
    DepthExceeded { limit: usize },
}

impl PlanError {
    pub fn kind(&self) -> PlanErrorKind {
        match self {
            PlanError::Semantic(_) => PlanErrorKind::Semantic,
            PlanError::Unsupported(_) => PlanErrorKind::Unsupported,
            PlanError::InvalidArgument(_) => PlanErrorKind::InvalidArgument,
            PlanError::TableNotFound(_) => PlanErrorKind::TableNotFound,
            PlanError::DepthExceeded { .. } => PlanErrorKind::DepthExceeded,
        }
    }

    pub(crate) fn semantic(msg: impl Into<String>) -> Self {
        PlanError::Semantic(msg.into())
    }
}

impl From<RegistryError> for PlanError {
    fn from(err: RegistryError) -> Self {
        PlanError::Semantic(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
