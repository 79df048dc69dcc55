//! Engine facade wiring the directory, store, reconciler, router and
//! convergence tracker together

use crate::directory::AgentDirectory;
use crate::error::{CloudError, Result};
use crate::model::{Account, AccountId, Instance, InstanceId};
use crate::provider::{DeployRequest, FactoryRegistry, InstanceCommand, ProviderAgent};
use crate::reconciler::{ReconcileReport, ReconcileScope, Reconciler};
use crate::resources::DependentResources;
use crate::router::RoutingAdapter;
use crate::state::AccountRepository;
use crate::store::InstanceStore;
use crate::tracker::{ConvergenceTracker, TrackOutcome, TrackerConfig, TrackerEvent};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

pub struct SyncEngine {
    pub(crate) store: Arc<InstanceStore>,
    pub(crate) directory: Arc<AgentDirectory>,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) router: Arc<RoutingAdapter>,
    pub(crate) tracker: Arc<ConvergenceTracker>,
    pub(crate) factories: FactoryRegistry,
    pub(crate) repository: Arc<dyn AccountRepository>,
    /// Live accounts. Held for reading while a batch is applied so that a
    /// removed account's instances cannot be re-inserted by a late refresh.
    pub(crate) accounts: RwLock<BTreeMap<AccountId, Account>>,
    /// Serializes account add/remove
    pub(crate) lifecycle: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        factories: FactoryRegistry,
        repository: Arc<dyn AccountRepository>,
        resources: Arc<dyn DependentResources>,
        config: TrackerConfig,
    ) -> Self {
        let store = Arc::new(InstanceStore::new());
        let directory = Arc::new(AgentDirectory::new());
        let reconciler = Arc::new(Reconciler::new(store.clone(), resources));
        let router = Arc::new(RoutingAdapter::new(
            store.clone(),
            directory.clone(),
            reconciler.clone(),
        ));
        let tracker = Arc::new(ConvergenceTracker::new(
            router.clone(),
            reconciler.clone(),
            config,
        ));

        Self {
            store,
            directory,
            reconciler,
            router,
            tracker,
            factories,
            repository,
            accounts: RwLock::new(BTreeMap::new()),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<InstanceStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    pub fn router(&self) -> &Arc<RoutingAdapter> {
        &self.router
    }

    pub fn tracker(&self) -> &Arc<ConvergenceTracker> {
        &self.tracker
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.store.all()
    }

    pub fn instance(&self, id: &InstanceId) -> Option<Instance> {
        self.store.get(id)
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn account(&self, id: &AccountId) -> Option<Account> {
        self.accounts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// Apply a fresh snapshot and start trackers for unsettled instances.
    ///
    /// Trackers are spawned on the current Tokio runtime. Called outside a
    /// runtime the snapshot is still applied, but nothing is tracked.
    pub fn reconcile(&self, scope: ReconcileScope, fresh: Vec<Instance>) -> Result<ReconcileReport> {
        let report = {
            let accounts = self
                .accounts
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            let (scope, fresh) = match scope {
                ReconcileScope::Account(id) if !accounts.contains_key(&id) => {
                    return Err(CloudError::AccountNotFound(id.to_string()));
                }
                ReconcileScope::Global => {
                    let fresh = retain_live(&accounts, fresh);
                    (ReconcileScope::Global, fresh)
                }
                ReconcileScope::Accounts(ids) => {
                    // Accounts removed while their listing was in flight
                    let ids = ids
                        .into_iter()
                        .filter(|id| accounts.contains_key(id))
                        .collect();
                    let fresh = retain_live(&accounts, fresh);
                    (ReconcileScope::Accounts(ids), fresh)
                }
                scope => (scope, fresh),
            };

            self.reconciler.reconcile(scope, fresh)?
        };

        for id in &report.unsettled {
            self.tracker.track(id.clone());
        }
        Ok(report)
    }

    /// Refresh every account through the routing adapter.
    ///
    /// Only the accounts the fan-out actually listed are reconciled; an
    /// account added while the fan-out is in flight keeps its instances.
    pub async fn refresh_all(&self) -> Result<ReconcileReport> {
        let (listed, fresh) = self.router.list_accounts().await?;
        self.reconcile(ReconcileScope::Accounts(listed), fresh)
    }

    /// Refresh one account; other accounts' instances are left alone
    pub async fn refresh_account(&self, id: &AccountId) -> Result<ReconcileReport> {
        let agent = self.directory.lookup(id)?;
        let fresh = agent.list_instances().await?;
        self.reconcile(ReconcileScope::Account(id.clone()), fresh)
    }

    /// Route a command and start tracking its completion
    pub async fn execute(
        &self,
        id: &InstanceId,
        command: InstanceCommand,
    ) -> Result<Option<JoinHandle<TrackOutcome>>> {
        self.router.execute(id, command).await?;
        Ok(self.tracker.track(id.clone()))
    }

    /// Route a command and wait until its tracker finishes
    pub async fn execute_and_wait(
        &self,
        id: &InstanceId,
        command: InstanceCommand,
    ) -> Result<TrackOutcome> {
        let mut events = self.tracker.subscribe();
        if let Some(handle) = self.execute(id, command).await? {
            return handle
                .await
                .map_err(|e| CloudError::ProviderUnavailable(format!("tracker failed: {}", e)));
        }

        // Another tracker already owns this instance; wait for its result
        loop {
            match events.recv().await {
                Ok(event) if &event.instance_id == id => return Ok(event.outcome),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Missed {} tracker events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Ok(TrackOutcome::Cancelled);
                }
            }
        }
    }

    /// Start tracking an instance unless a tracker is already running
    pub fn track(&self, id: &InstanceId) -> Option<JoinHandle<TrackOutcome>> {
        self.tracker.track(id.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tracker.subscribe()
    }

    /// Provision an instance on an account and pick it up with a refresh
    pub async fn deploy(&self, account_id: &AccountId, request: &DeployRequest) -> Result<InstanceId> {
        let agent = self.directory.lookup(account_id)?;
        let id = agent.deploy(request).await?;
        tracing::info!("Deploy of {} accepted as {}", request.name, id);

        match self.refresh_account(account_id).await {
            Ok(_) if self.store.contains(&id) => {
                self.tracker.track(id.clone());
            }
            Ok(_) => tracing::info!("{} is not listed yet; not tracking it", id),
            Err(e) => tracing::warn!("Refresh after deploy failed: {}", e),
        }
        Ok(id)
    }

    /// Agent for account-level operations (billing, SSH keys)
    pub fn agent(&self, account_id: &AccountId) -> Result<Arc<dyn ProviderAgent>> {
        self.directory.lookup(account_id)
    }

    /// Drop every agent registration, releasing the router's handle on the
    /// directory
    pub fn shutdown(&self) {
        self.directory.clear();
        tracing::debug!("Engine shut down");
    }
}

fn retain_live(accounts: &BTreeMap<AccountId, Account>, fresh: Vec<Instance>) -> Vec<Instance> {
    fresh
        .into_iter()
        .filter(|instance| {
            let live = accounts.contains_key(&instance.account_id);
            if !live {
                tracing::warn!(
                    "Ignoring {} owned by unknown account {}",
                    instance.id,
                    instance.account_id
                );
            }
            live
        })
        .collect()
}
