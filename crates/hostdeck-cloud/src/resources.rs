//! Resources that live and die with an instance
//!
//! The reconciler only drives their lifecycle: a placeholder is seeded when
//! an instance is first seen and torn down when the instance is deleted.

use crate::model::InstanceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Lifecycle hooks for per-instance resources.
///
/// Both hooks run while the store's write guard is held. They must not
/// block and must not read the store.
pub trait DependentResources: Send + Sync {
    /// Called after an instance is inserted into the store
    fn seed(&self, id: &InstanceId);

    /// Called after an instance is deleted from the store
    fn teardown(&self, id: &InstanceId);
}

/// State of a remote-access session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Placeholder; no credential has been supplied yet
    Unauthenticated,
    Connected { user: String },
}

/// Remote-access session registry keyed by instance id
#[derive(Default)]
pub struct SshSessionRegistry {
    sessions: Mutex<HashMap<InstanceId, SessionState>>,
}

impl SshSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &InstanceId) -> Option<SessionState> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// Mark a seeded session as connected. Returns false for unknown instances.
    pub fn connect(&self, id: &InstanceId, user: impl Into<String>) -> bool {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match sessions.get_mut(id) {
            Some(state) => {
                *state = SessionState::Connected { user: user.into() };
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DependentResources for SshSessionRegistry {
    fn seed(&self, id: &InstanceId) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id.clone())
            .or_insert(SessionState::Unauthenticated);
    }

    fn teardown(&self, id: &InstanceId) {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id);
        if let Some(SessionState::Connected { user }) = removed {
            tracing::info!("Dropped ssh session {}@{}", user, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let registry = SshSessionRegistry::new();
        let id = InstanceId::new("sakura", "1");

        assert!(!registry.connect(&id, "root"));

        registry.seed(&id);
        assert_eq!(registry.state(&id), Some(SessionState::Unauthenticated));

        assert!(registry.connect(&id, "root"));
        registry.seed(&id);
        assert_eq!(
            registry.state(&id),
            Some(SessionState::Connected {
                user: "root".to_string()
            })
        );

        registry.teardown(&id);
        assert!(registry.state(&id).is_none());
        assert!(registry.is_empty());
    }
}
