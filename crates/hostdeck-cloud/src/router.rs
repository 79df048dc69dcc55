//! Instance-id-only entry point
//!
//! Callers such as the presentation layer only know an instance id. The
//! routing adapter looks the owner up in the canonical store and hands the
//! call to that account's agent, so it stays consistent with the store even
//! while accounts come and go.

use crate::directory::{AgentDirectory, ROUTER_KEY};
use crate::error::{CloudError, Result};
use crate::model::{AccountId, Instance, InstanceId};
use crate::provider::{AuthStatus, DeployRequest, InstanceCommand, ProviderAgent};
use crate::reconciler::Reconciler;
use crate::store::InstanceStore;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct RoutingAdapter {
    store: Arc<InstanceStore>,
    directory: Arc<AgentDirectory>,
    reconciler: Arc<Reconciler>,
}

impl RoutingAdapter {
    pub fn new(
        store: Arc<InstanceStore>,
        directory: Arc<AgentDirectory>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            store,
            directory,
            reconciler,
        }
    }

    /// Find the agent owning an instance
    pub fn resolve(&self, id: &InstanceId) -> Result<Arc<dyn ProviderAgent>> {
        let owner = self
            .store
            .owner_of(id)
            .ok_or_else(|| CloudError::InstanceNotFound(id.to_string()))?;

        if owner.as_str() == ROUTER_KEY {
            tracing::error!("Instance {} claims the router as its owner", id);
            return Err(CloudError::AgentNotRegistered(owner.to_string()));
        }

        self.directory.lookup(&owner).map_err(|e| {
            tracing::error!(
                "Instance {} is owned by {} but no agent is registered for it",
                id,
                owner
            );
            e
        })
    }

    /// Route an instance command to its owning agent
    pub async fn execute(&self, id: &InstanceId, command: InstanceCommand) -> Result<()> {
        let agent = self.resolve(id)?;
        tracing::info!("{} {} via {}", command, id, agent.provider());
        let result = command.dispatch(agent.as_ref(), id).await;
        self.recover(id, result)
    }

    /// Fan out over every account registered when the call starts.
    ///
    /// Returns the accounts that were listed together with their
    /// instances; one failure fails the whole listing.
    pub async fn list_accounts(&self) -> Result<(BTreeSet<AccountId>, Vec<Instance>)> {
        let agents = self.directory.account_agents();
        let results = join_all(agents.iter().map(|(_, agent)| agent.list_instances())).await;

        let mut listed = BTreeSet::new();
        let mut instances = Vec::new();
        for ((id, _), result) in agents.iter().zip(results) {
            match result {
                Ok(list) => {
                    listed.insert(id.clone());
                    instances.extend(list);
                }
                Err(e) => {
                    tracing::warn!("Listing {} failed: {}", id, e);
                    return Err(e);
                }
            }
        }
        Ok((listed, instances))
    }

    /// A provider-confirmed deletion is reflected in the store before the
    /// error reaches the caller
    fn recover<T>(&self, id: &InstanceId, result: Result<T>) -> Result<T> {
        match result {
            Err(e) if e.is_not_found() => {
                tracing::info!("{} no longer exists at its provider", id);
                if let Err(reconcile_err) = self.reconciler.delete(id) {
                    tracing::warn!("Failed to delete {}: {}", id, reconcile_err);
                }
                Err(e)
            }
            other => other,
        }
    }
}

#[async_trait]
impl ProviderAgent for RoutingAdapter {
    fn provider(&self) -> &str {
        "router"
    }

    fn display_name(&self) -> &str {
        "All accounts"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        let agents = self.directory.account_agents();
        let results = join_all(agents.iter().map(|(_, agent)| agent.check_auth())).await;

        let mut failed = Vec::new();
        for ((id, _), result) in agents.iter().zip(results) {
            match result {
                Ok(status) if status.authenticated => {}
                Ok(status) => failed.push(format!(
                    "{}: {}",
                    id,
                    status.error.unwrap_or_else(|| "rejected".to_string())
                )),
                Err(e) => failed.push(format!("{}: {}", id, e)),
            }
        }

        if failed.is_empty() {
            Ok(AuthStatus::ok(format!("{} accounts", agents.len())))
        } else {
            Ok(AuthStatus::failed(failed.join("; ")))
        }
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let (_, instances) = self.list_accounts().await?;
        Ok(instances)
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance> {
        let agent = self.resolve(id)?;
        let result = agent.get_instance(id).await;
        self.recover(id, result)
    }

    async fn start(&self, id: &InstanceId) -> Result<()> {
        self.execute(id, InstanceCommand::Start).await
    }

    async fn stop(&self, id: &InstanceId) -> Result<()> {
        self.execute(id, InstanceCommand::Stop).await
    }

    async fn restart(&self, id: &InstanceId) -> Result<()> {
        self.execute(id, InstanceCommand::Restart).await
    }

    async fn destroy(&self, id: &InstanceId) -> Result<()> {
        self.execute(id, InstanceCommand::Destroy).await
    }

    async fn reinstall(&self, id: &InstanceId) -> Result<()> {
        self.execute(id, InstanceCommand::Reinstall).await
    }

    async fn deploy(&self, _request: &DeployRequest) -> Result<InstanceId> {
        Err(CloudError::unsupported(self.provider(), "deploy"))
    }

    fn is_settled(&self, instance: &Instance) -> bool {
        match self.directory.lookup(&instance.account_id) {
            Ok(agent) if instance.account_id.as_str() != ROUTER_KEY => agent.is_settled(instance),
            _ => instance.status.is_stable(),
        }
    }
}
