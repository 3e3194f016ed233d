//! The closed error-kind taxonomy shared by every engine and adapter.

/// Result type alias for Cortex operations.
pub type Result<T> = std::result::Result<T, CortexError>;

/// The error kinds an operation may fail with. Closed set: adding a variant
/// is a breaking change to every caller that matches on `kind()`.
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    /// Failed validation before any storage call was attempted. Never retriable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced entity does not exist.
    #[error("not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    /// The entity already exists under a uniqueness constraint.
    #[error("already exists: {resource} {id}")]
    AlreadyExists { resource: String, id: String },

    /// A precondition required by the operation was not met (e.g. missing confirmation).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A collaborator (DocStore, VectorStore, Embedder) is unreachable. Retriable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The operation was cancelled via its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Anything else: bugs, unexpected collaborator responses, serialization failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CortexError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable kind name, used by the dispatcher's `{kind, message, retriable}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::PreconditionFailed(_) => "PreconditionFailed",
            Self::Unavailable(_) => "Unavailable",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal",
        }
    }

    /// Only `Unavailable` is retriable, per the error propagation policy.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for CortexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {e}"))
    }
}

impl From<std::io::Error> for CortexError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                Self::NotFound { resource: "file".into(), id: e.to_string() }
            }
            _ => Self::Internal(format!("io error: {e}")),
        }
    }
}

impl From<anyhow::Error> for CortexError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retriable() {
        assert!(CortexError::unavailable("down").retriable());
        assert!(!CortexError::internal("bug").retriable());
        assert!(!CortexError::invalid_argument("bad").retriable());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(CortexError::invalid_argument("x").kind(), "InvalidArgument");
        assert_eq!(CortexError::not_found("task", "1").kind(), "NotFound");
        assert_eq!(CortexError::Cancelled.kind(), "Cancelled");
    }
}
