use async_trait::async_trait;
use hostdeck_cloud::{
    Account, AccountId, AgentDirectory, AuthStatus, CloudError, Credentials, DependentResources,
    DeployRequest, FactoryRegistry, Instance, InstanceCommand, InstanceId, InstanceStatus,
    MemoryAccountRepository, ProviderAgent, Result, SyncEngine, TrackerConfig, TrackerEvent,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};

pub const PROVIDER: &str = "mock";

/// What the scripted provider answers to a single-instance read
#[derive(Debug, Clone)]
pub enum Reading {
    Status(InstanceStatus),
    NotFound,
    Unavailable,
}

/// Holds one listing until the test releases it
#[derive(Default)]
pub struct ListingGate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory provider whose answers are scripted by the test
pub struct ScriptedAgent {
    account_id: AccountId,
    gate: Mutex<Option<Arc<ListingGate>>>,
    authenticated: AtomicBool,
    listing: Mutex<std::result::Result<Vec<Instance>, String>>,
    readings: Mutex<HashMap<InstanceId, VecDeque<Reading>>>,
    sticky: Mutex<HashMap<InstanceId, Reading>>,
    polls: Mutex<HashMap<InstanceId, usize>>,
    commands: Mutex<Vec<(InstanceCommand, InstanceId)>>,
    command_not_found: AtomicBool,
    lists_deployed: AtomicBool,
}

impl ScriptedAgent {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            gate: Mutex::new(None),
            authenticated: AtomicBool::new(true),
            listing: Mutex::new(Ok(Vec::new())),
            readings: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            polls: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            command_not_found: AtomicBool::new(false),
            lists_deployed: AtomicBool::new(true),
        }
    }

    pub fn instance(&self, native: &str, status: InstanceStatus) -> Instance {
        Instance::new(
            InstanceId::new(PROVIDER, native),
            self.account_id.clone(),
            native,
            status,
        )
    }

    pub fn set_listing(&self, instances: Vec<Instance>) {
        *self.listing.lock().unwrap() = Ok(instances);
    }

    pub fn fail_listing(&self, reason: &str) {
        *self.listing.lock().unwrap() = Err(reason.to_string());
    }

    /// Block the next listing until `release` is notified
    #[allow(dead_code)]
    pub fn hold_listing(&self) -> Arc<ListingGate> {
        let gate = Arc::new(ListingGate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn reject_auth(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
    }

    /// Queue readings; the last one repeats once the queue is drained
    pub fn script(&self, native: &str, readings: Vec<Reading>) {
        self.readings
            .lock()
            .unwrap()
            .insert(InstanceId::new(PROVIDER, native), readings.into());
    }

    /// Accept deploys without showing the new instance in listings
    #[allow(dead_code)]
    pub fn hide_deployed(&self) {
        self.lists_deployed.store(false, Ordering::SeqCst);
    }

    pub fn commands_report_not_found(&self) {
        self.command_not_found.store(true, Ordering::SeqCst);
    }

    pub fn polls(&self, native: &str) -> usize {
        self.polls
            .lock()
            .unwrap()
            .get(&InstanceId::new(PROVIDER, native))
            .copied()
            .unwrap_or(0)
    }

    pub fn commands(&self) -> Vec<(InstanceCommand, InstanceId)> {
        self.commands.lock().unwrap().clone()
    }

    fn next_reading(&self, id: &InstanceId) -> Reading {
        *self.polls.lock().unwrap().entry(id.clone()).or_insert(0) += 1;

        let next = self
            .readings
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        let mut sticky = self.sticky.lock().unwrap();
        match next {
            Some(reading) => {
                sticky.insert(id.clone(), reading.clone());
                reading
            }
            None => sticky.get(id).cloned().unwrap_or(Reading::NotFound),
        }
    }

    fn command(&self, command: InstanceCommand, id: &InstanceId) -> Result<()> {
        self.commands.lock().unwrap().push((command, id.clone()));
        if self.command_not_found.load(Ordering::SeqCst) {
            return Err(CloudError::InstanceNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderAgent for ScriptedAgent {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn display_name(&self) -> &str {
        "Mock Cloud"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(AuthStatus::ok(self.account_id.to_string()))
        } else {
            Ok(AuthStatus::failed("invalid token"))
        }
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.listing
            .lock()
            .unwrap()
            .clone()
            .map_err(CloudError::ProviderUnavailable)
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance> {
        match self.next_reading(id) {
            Reading::Status(status) => Ok(self.instance(id.native_id(), status)),
            Reading::NotFound => Err(CloudError::InstanceNotFound(id.to_string())),
            Reading::Unavailable => Err(CloudError::ProviderUnavailable("timeout".into())),
        }
    }

    async fn start(&self, id: &InstanceId) -> Result<()> {
        self.command(InstanceCommand::Start, id)
    }

    async fn stop(&self, id: &InstanceId) -> Result<()> {
        self.command(InstanceCommand::Stop, id)
    }

    async fn restart(&self, id: &InstanceId) -> Result<()> {
        self.command(InstanceCommand::Restart, id)
    }

    async fn destroy(&self, id: &InstanceId) -> Result<()> {
        self.command(InstanceCommand::Destroy, id)
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<InstanceId> {
        let id = InstanceId::new(PROVIDER, &request.name);
        if !self.lists_deployed.load(Ordering::SeqCst) {
            return Ok(id);
        }
        let mut listing = self.listing.lock().unwrap();
        if let Ok(instances) = listing.as_mut() {
            instances.push(self.instance(&request.name, InstanceStatus::Installing));
        }
        Ok(id)
    }
}

/// Records seed/teardown calls per instance
#[derive(Default)]
pub struct RecordingResources {
    seeded: Mutex<Vec<InstanceId>>,
    torn_down: Mutex<Vec<InstanceId>>,
    watch: Mutex<Option<(Arc<AgentDirectory>, AccountId)>>,
    agent_present_at_teardown: Mutex<Vec<bool>>,
}

impl RecordingResources {
    pub fn seeded(&self) -> Vec<InstanceId> {
        self.seeded.lock().unwrap().clone()
    }

    pub fn torn_down(&self) -> Vec<InstanceId> {
        self.torn_down.lock().unwrap().clone()
    }

    /// Record, at every teardown, whether the account's agent was registered
    pub fn watch_directory(&self, directory: Arc<AgentDirectory>, account: AccountId) {
        *self.watch.lock().unwrap() = Some((directory, account));
    }

    pub fn agent_present_at_teardown(&self) -> Vec<bool> {
        self.agent_present_at_teardown.lock().unwrap().clone()
    }
}

impl DependentResources for RecordingResources {
    fn seed(&self, id: &InstanceId) {
        self.seeded.lock().unwrap().push(id.clone());
    }

    fn teardown(&self, id: &InstanceId) {
        self.torn_down.lock().unwrap().push(id.clone());
        if let Some((directory, account)) = self.watch.lock().unwrap().as_ref() {
            self.agent_present_at_teardown
                .lock()
                .unwrap()
                .push(directory.contains(account));
        }
    }
}

pub fn fast_tracker() -> TrackerConfig {
    TrackerConfig {
        interval: Duration::from_millis(5),
        timeout_ticks: 50,
    }
}

pub fn account(name: &str) -> Account {
    Account::new(PROVIDER, name, Credentials::new(format!("token-{}", name), None))
}

#[allow(dead_code)]
pub struct Harness {
    pub engine: SyncEngine,
    pub resources: Arc<RecordingResources>,
    pub repository: Arc<MemoryAccountRepository>,
    pub agents: HashMap<String, Arc<ScriptedAgent>>,
    pub accounts: HashMap<String, AccountId>,
}

impl Harness {
    /// Engine bootstrapped with one scripted agent per account name
    pub async fn new(names: &[&str], config: TrackerConfig) -> Self {
        Self::with_pending(names, &[], config).await
    }

    /// Like `new`, with agents prepared for accounts that are only added
    /// later through `add_account`
    pub async fn with_pending(names: &[&str], pending: &[&str], config: TrackerConfig) -> Self {
        let all: Vec<&str> = names.iter().chain(pending).copied().collect();
        let prepared: Vec<Account> = all.iter().map(|n| account(n)).collect();
        let accounts: Vec<Account> = prepared[..names.len()].to_vec();

        let mut agents = HashMap::new();
        let mut by_id: HashMap<AccountId, Arc<ScriptedAgent>> = HashMap::new();
        for (name, account) in all.iter().zip(&prepared) {
            let agent = Arc::new(ScriptedAgent::new(account.id.clone()));
            agents.insert(name.to_string(), agent.clone());
            by_id.insert(account.id.clone(), agent);
        }

        let factories = FactoryRegistry::new().with(
            PROVIDER,
            Arc::new(move |account: &Account| -> Result<Arc<dyn ProviderAgent>> {
                match by_id.get(&account.id) {
                    Some(agent) => Ok(agent.clone() as Arc<dyn ProviderAgent>),
                    None => Ok(Arc::new(ScriptedAgent::new(account.id.clone()))),
                }
            }),
        );

        let repository = Arc::new(MemoryAccountRepository::new(accounts.clone()));
        let resources = Arc::new(RecordingResources::default());
        let engine = SyncEngine::new(factories, repository.clone(), resources.clone(), config);
        engine.bootstrap().await.unwrap();

        Self {
            engine,
            resources,
            repository,
            agents,
            accounts: all
                .iter()
                .zip(prepared)
                .map(|(n, a)| (n.to_string(), a.id))
                .collect(),
        }
    }

    pub fn agent(&self, name: &str) -> &Arc<ScriptedAgent> {
        &self.agents[name]
    }

    pub fn account_id(&self, name: &str) -> AccountId {
        self.accounts[name].clone()
    }
}

pub fn id(native: &str) -> InstanceId {
    InstanceId::new(PROVIDER, native)
}

/// Wait for the tracker event of one instance
pub async fn outcome_of(
    events: &mut broadcast::Receiver<TrackerEvent>,
    native: &str,
) -> TrackerEvent {
    let target = id(native);
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.instance_id == target {
                return event;
            }
        }
    })
    .await
    .expect("tracker did not finish in time")
}
