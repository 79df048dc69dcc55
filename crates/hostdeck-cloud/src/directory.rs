//! Account → agent registry

use crate::error::{CloudError, Result};
use crate::model::AccountId;
use crate::provider::ProviderAgent;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Well-known key under which the routing adapter registers itself
pub const ROUTER_KEY: &str = "@router";

/// Process-wide map from account id to its live agent
///
/// At most one agent is registered per account id.
#[derive(Default)]
pub struct AgentDirectory {
    agents: RwLock<HashMap<AccountId, Arc<dyn ProviderAgent>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any previous entry for the account
    pub fn register(&self, id: AccountId, agent: Arc<dyn ProviderAgent>) {
        let mut agents = self
            .agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if agents.insert(id.clone(), agent).is_some() {
            tracing::debug!("Replaced agent for {}", id);
        } else {
            tracing::debug!("Registered agent for {}", id);
        }
    }

    pub fn lookup(&self, id: &AccountId) -> Result<Arc<dyn ProviderAgent>> {
        self.agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::AgentNotRegistered(id.to_string()))
    }

    pub fn deregister(&self, id: &AccountId) -> Option<Arc<dyn ProviderAgent>> {
        let removed = self
            .agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id);
        if removed.is_some() {
            tracing::debug!("Deregistered agent for {}", id);
        }
        removed
    }

    pub fn contains(&self, id: &AccountId) -> bool {
        self.agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(id)
    }

    /// Account-bound agents, excluding the routing adapter entry
    pub fn account_agents(&self) -> Vec<(AccountId, Arc<dyn ProviderAgent>)> {
        let agents = self
            .agents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries: Vec<_> = agents
            .iter()
            .filter(|(id, _)| id.as_str() != ROUTER_KEY)
            .map(|(id, agent)| (id.clone(), agent.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Drop every entry, including the routing adapter's
    pub fn clear(&self) {
        self.agents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::model::{Instance, InstanceId};
    use crate::provider::{AuthStatus, DeployRequest};
    use async_trait::async_trait;

    struct NullAgent;

    #[async_trait]
    impl ProviderAgent for NullAgent {
        fn provider(&self) -> &str {
            "null"
        }
        fn display_name(&self) -> &str {
            "Null"
        }
        async fn check_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus::ok("null"))
        }
        async fn list_instances(&self) -> Result<Vec<Instance>> {
            Ok(Vec::new())
        }
        async fn get_instance(&self, id: &InstanceId) -> Result<Instance> {
            Err(CloudError::InstanceNotFound(id.to_string()))
        }
        async fn start(&self, _id: &InstanceId) -> Result<()> {
            Ok(())
        }
        async fn stop(&self, _id: &InstanceId) -> Result<()> {
            Ok(())
        }
        async fn restart(&self, _id: &InstanceId) -> Result<()> {
            Ok(())
        }
        async fn destroy(&self, _id: &InstanceId) -> Result<()> {
            Ok(())
        }
        async fn deploy(&self, _request: &DeployRequest) -> Result<InstanceId> {
            Err(CloudError::unsupported("null", "deploy"))
        }
    }

    #[test]
    fn test_register_lookup_deregister() {
        let directory = AgentDirectory::new();
        let id = AccountId::from("null-1");

        assert!(matches!(
            directory.lookup(&id),
            Err(CloudError::AgentNotRegistered(_))
        ));

        directory.register(id.clone(), Arc::new(NullAgent));
        assert!(directory.contains(&id));
        assert_eq!(directory.lookup(&id).unwrap().provider(), "null");

        assert!(directory.deregister(&id).is_some());
        assert!(directory.deregister(&id).is_none());
        assert!(directory.lookup(&id).is_err());
    }

    #[test]
    fn test_account_agents_skip_router() {
        let directory = AgentDirectory::new();
        directory.register(AccountId::from(ROUTER_KEY), Arc::new(NullAgent));
        directory.register(AccountId::from("b"), Arc::new(NullAgent));
        directory.register(AccountId::from("a"), Arc::new(NullAgent));

        let ids: Vec<_> = directory
            .account_agents()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        directory.clear();
        assert!(directory.account_agents().is_empty());
    }
}
