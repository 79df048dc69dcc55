//! Sakura Cloud provider error types

use hostdeck_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SakuraError {
    #[error("usacloud not found. Please install: brew install usacloud")]
    UsacloudNotFound,

    #[error("usacloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("usacloud command failed: {0}")]
    CommandFailed(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Resource creation failed: {0}")]
    CreationFailed(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SakuraError {
    /// Classify a failed usacloud invocation from its stderr.
    ///
    /// Never yields `ServerNotFound`: a generic "not found" may name a
    /// zone, an archive or an endpoint rather than a server.
    pub fn from_stderr(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("401") || lower.contains("unauthorized") {
            SakuraError::AuthenticationFailed(stderr.trim().to_string())
        } else {
            SakuraError::CommandFailed(stderr.trim().to_string())
        }
    }

    /// Classify the stderr of a command addressed to one server.
    ///
    /// A not-found answer counts as `ServerNotFound` only when it names
    /// that server's id.
    pub fn from_server_stderr(server_id: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let missing = lower.contains("404") || lower.contains("not found");
        if missing && stderr.contains(server_id) {
            SakuraError::ServerNotFound(server_id.to_string())
        } else {
            Self::from_stderr(stderr)
        }
    }
}

impl From<SakuraError> for CloudError {
    fn from(err: SakuraError) -> Self {
        match err {
            SakuraError::ServerNotFound(id) => CloudError::InstanceNotFound(id),
            SakuraError::AuthenticationFailed(msg) => CloudError::AuthenticationRejected(msg),
            other => CloudError::ProviderUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SakuraError>;
