use crate::model::ValueType;

/// Result alias used by every store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the evaluation store.
///
/// None of these are retried internally. `Persistence` wraps whatever the
/// artifact repository or tracking store reported.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "Assessment with name '{name}' has value type '{found}' that does not match \
         the value type '{expected}' of existing assessments with the same name."
    )]
    TypeConflict {
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

pub mod codes {
    pub const E_INVALID_ARGUMENT: &str = "E_INVALID_ARGUMENT";
    pub const E_TYPE_CONFLICT: &str = "E_TYPE_CONFLICT";
    pub const E_NOT_FOUND: &str = "E_NOT_FOUND";
    pub const E_INTEGRITY: &str = "E_INTEGRITY";
    pub const E_PERSISTENCE: &str = "E_PERSISTENCE";
}

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Stable diagnostic code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidArgument(_) => codes::E_INVALID_ARGUMENT,
            StoreError::TypeConflict { .. } => codes::E_TYPE_CONFLICT,
            StoreError::NotFound(_) => codes::E_NOT_FOUND,
            StoreError::Integrity(_) => codes::E_INTEGRITY,
            StoreError::Persistence(_) => codes::E_PERSISTENCE,
        }
    }

    /// True for failures caused by the caller's input or the run's contents,
    /// as opposed to the persistence layer.
    pub fn is_domain(&self) -> bool {
        !matches!(self, StoreError::Persistence(_))
    }
}
