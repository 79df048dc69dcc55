//! Provider agent trait definition

use crate::error::{CloudError, Result};
use crate::model::{Account, BillingSnapshot, Instance, InstanceId, SshKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Normalized client for one hosting account
///
/// Every provider family (Sakura Cloud, ...) implements this trait once.
/// Instance actions return as soon as the provider has accepted the
/// request; completion is observed by a convergence tracker.
///
/// Implementations must only surface three error classes to the engine:
/// [`CloudError::InstanceNotFound`], [`CloudError::UnsupportedOperation`]
/// and [`CloudError::ProviderUnavailable`]. Credential failures may be
/// reported as [`CloudError::AuthenticationRejected`].
#[async_trait]
pub trait ProviderAgent: Send + Sync {
    /// Returns the provider family tag (e.g., "sakura")
    fn provider(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check whether the bound credentials are accepted
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Fetch the complete instance list for this account.
    ///
    /// Never returns a partial list: any failure fails the whole call.
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Fetch one instance's live state
    async fn get_instance(&self, id: &InstanceId) -> Result<Instance>;

    async fn start(&self, id: &InstanceId) -> Result<()>;

    async fn stop(&self, id: &InstanceId) -> Result<()>;

    async fn restart(&self, id: &InstanceId) -> Result<()>;

    async fn destroy(&self, id: &InstanceId) -> Result<()>;

    async fn reinstall(&self, id: &InstanceId) -> Result<()> {
        Err(CloudError::unsupported(self.provider(), "reinstall"))
    }

    /// Provision a new instance, returning its id once accepted
    async fn deploy(&self, request: &DeployRequest) -> Result<InstanceId>;

    async fn billing(&self) -> Result<BillingSnapshot> {
        Err(CloudError::unsupported(self.provider(), "billing"))
    }

    async fn ssh_keys(&self) -> Result<Vec<SshKey>> {
        Err(CloudError::unsupported(self.provider(), "ssh-keys"))
    }

    /// Whether a reading is stable enough to be confirmed.
    ///
    /// Providers whose sub-status fields lag behind the headline status
    /// override this.
    fn is_settled(&self, instance: &Instance) -> bool {
        instance.status.is_stable()
    }
}

/// Instance-scoped commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceCommand {
    Start,
    Stop,
    Restart,
    Destroy,
    Reinstall,
}

impl InstanceCommand {
    /// Dispatch this command to an agent
    pub async fn dispatch(self, agent: &dyn ProviderAgent, id: &InstanceId) -> Result<()> {
        match self {
            InstanceCommand::Start => agent.start(id).await,
            InstanceCommand::Stop => agent.stop(id).await,
            InstanceCommand::Restart => agent.restart(id).await,
            InstanceCommand::Destroy => agent.destroy(id).await,
            InstanceCommand::Reinstall => agent.reinstall(id).await,
        }
    }
}

impl std::fmt::Display for InstanceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceCommand::Start => write!(f, "start"),
            InstanceCommand::Stop => write!(f, "stop"),
            InstanceCommand::Restart => write!(f, "restart"),
            InstanceCommand::Destroy => write!(f, "destroy"),
            InstanceCommand::Reinstall => write!(f, "reinstall"),
        }
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Parameters for provisioning a new instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    pub name: String,

    /// Plan identifier in the provider's own vocabulary (e.g., "2core-4gb")
    pub plan: Option<String>,

    pub image: Option<String>,

    /// Region override; the account's default region otherwise. Agents
    /// bound to a single region reject any other.
    pub region: Option<String>,

    pub ssh_key_ids: Vec<String>,

    /// Provider-specific options
    pub options: HashMap<String, serde_json::Value>,
}

impl DeployRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get_option<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.options
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Builds the agent for a persisted account
pub trait AgentFactory: Send + Sync {
    fn build(&self, account: &Account) -> Result<Arc<dyn ProviderAgent>>;
}

impl<F> AgentFactory for F
where
    F: Fn(&Account) -> Result<Arc<dyn ProviderAgent>> + Send + Sync,
{
    fn build(&self, account: &Account) -> Result<Arc<dyn ProviderAgent>> {
        self(account)
    }
}

/// Agent factories keyed by provider family tag
#[derive(Default, Clone)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn AgentFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl Into<String>, factory: Arc<dyn AgentFactory>) {
        self.factories.insert(provider.into(), factory);
    }

    pub fn with(mut self, provider: impl Into<String>, factory: Arc<dyn AgentFactory>) -> Self {
        self.register(provider, factory);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|k| k.as_str())
    }

    /// Build the agent for an account
    pub fn build(&self, account: &Account) -> Result<Arc<dyn ProviderAgent>> {
        let factory = self.factories.get(&account.provider).ok_or_else(|| {
            CloudError::unsupported(account.provider.clone(), "agent construction")
        })?;
        factory.build(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Credentials;

    #[test]
    fn test_deploy_request_options() {
        let mut request = DeployRequest::new("web-01");
        request
            .options
            .insert("disk_size".to_string(), serde_json::json!(40));
        assert_eq!(request.get_option::<i32>("disk_size"), Some(40));
        assert_eq!(request.get_option::<i32>("missing"), None);
    }

    #[test]
    fn test_factory_registry_unknown_provider() {
        let registry = FactoryRegistry::new();
        let account = Account::new("nowhere", "x", Credentials::new("t", None));
        match registry.build(&account) {
            Err(CloudError::UnsupportedOperation { provider, .. }) => {
                assert_eq!(provider, "nowhere")
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_command_display() {
        assert_eq!(InstanceCommand::Reinstall.to_string(), "reinstall");
        assert_eq!(InstanceCommand::Stop.to_string(), "stop");
    }
}
