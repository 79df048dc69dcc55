//! Cloud engine error types

use thiserror::Error;

/// Errors surfaced by provider agents and the synchronization engine
#[derive(Error, Debug)]
pub enum CloudError {
    /// The provider confirmed the instance no longer exists
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("{provider} does not support {operation}")]
    UnsupportedOperation {
        provider: String,
        operation: String,
    },

    /// Network, API or any other failure class; treated as transient
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("No provider agent registered for account: {0}")]
    AgentNotRegistered(String),

    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid instance snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn unsupported(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        CloudError::UnsupportedOperation {
            provider: provider.into(),
            operation: operation.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::InstanceNotFound(_))
    }

    /// Whether a convergence poll may keep going after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::ProviderUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CloudError::InstanceNotFound("sakura:1".into()).is_not_found());
        assert!(CloudError::ProviderUnavailable("timeout".into()).is_transient());
        assert!(!CloudError::AuthenticationRejected("bad token".into()).is_transient());
        assert!(!CloudError::unsupported("sakura", "reinstall").is_transient());
    }

    #[test]
    fn test_unsupported_message() {
        let err = CloudError::unsupported("sakura", "reinstall");
        assert_eq!(err.to_string(), "sakura does not support reinstall");
    }
}
