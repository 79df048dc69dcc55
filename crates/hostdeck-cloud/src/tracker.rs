//! Convergence tracking for instances in transition
//!
//! After a command is accepted (or a refresh finds a server booting,
//! resizing, ...), a tracker polls the instance until it settles:
//!
//! ```text
//!            ┌──────────┐ same settled reading twice ┌───────────┐
//!  track ──▶ │ Polling  │ ──────────────────────────▶│ Confirmed │
//!            └──────────┘                            └───────────┘
//!              │  │  │  InstanceNotFound             ┌───────────┐
//!              │  │  └──────────────────────────────▶│ NotFound  │
//!              │  │     tick budget exhausted        ┌───────────┐
//!              │  └─────────────────────────────────▶│ TimedOut  │
//!              │        instance left the store      ┌───────────┐
//!              └────────────────────────────────────▶│ Cancelled │
//!                                                    └───────────┘
//! ```
//!
//! At most one tracker runs per instance id.

use crate::error::CloudError;
use crate::model::{InstanceId, InstanceStatus, Observation};
use crate::reconciler::{ReconcileScope, Reconciler};
use crate::router::RoutingAdapter;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const DEFAULT_INTERVAL_MS: u64 = 3000;
const DEFAULT_TIMEOUT_TICKS: u32 = 120;

/// Polling cadence and budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Delay before each poll
    pub interval: Duration,

    /// Maximum number of polls before giving up
    pub timeout_ticks: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
        }
    }
}

/// How a tracker finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The same settled status was read on two successive polls
    Confirmed(InstanceStatus),
    /// The provider reported the instance gone; it was deleted from the store
    NotFound,
    /// The budget ran out; the last reading stays in the store
    TimedOut { last: Option<InstanceStatus> },
    /// The instance was removed from the store by another path
    Cancelled,
    /// The provider failed with a non-retryable error
    Aborted(String),
}

impl std::fmt::Display for TrackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackOutcome::Confirmed(status) => write!(f, "confirmed {}", status),
            TrackOutcome::NotFound => write!(f, "not found"),
            TrackOutcome::TimedOut { last: Some(status) } => {
                write!(f, "timed out (last seen {})", status)
            }
            TrackOutcome::TimedOut { last: None } => write!(f, "timed out"),
            TrackOutcome::Cancelled => write!(f, "cancelled"),
            TrackOutcome::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// Emitted once per finished tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEvent {
    pub instance_id: InstanceId,
    pub outcome: TrackOutcome,
    pub polls: u32,
}

/// Per-instance polling state
#[derive(Debug)]
struct TrackingTask {
    id: InstanceId,
    previous: Option<Observation>,
    consecutive: u32,
    ticks: u32,
}

impl TrackingTask {
    fn new(id: InstanceId) -> Self {
        Self {
            id,
            previous: None,
            consecutive: 0,
            ticks: 0,
        }
    }

    /// Record a reading, returning true when it differs from the last one
    fn observe(&mut self, observation: Observation) -> bool {
        if self.previous.as_ref() == Some(&observation) {
            self.consecutive += 1;
            false
        } else {
            self.consecutive = 1;
            self.previous = Some(observation);
            true
        }
    }

    fn last_status(&self) -> Option<InstanceStatus> {
        self.previous.as_ref().map(|o| o.status.clone())
    }
}

/// Removes the id from the active set when the tracker task ends
struct ActiveSlot {
    active: Arc<Mutex<HashSet<InstanceId>>>,
    id: InstanceId,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

pub struct ConvergenceTracker {
    router: Arc<RoutingAdapter>,
    reconciler: Arc<Reconciler>,
    config: TrackerConfig,
    active: Arc<Mutex<HashSet<InstanceId>>>,
    events: broadcast::Sender<TrackerEvent>,
}

impl ConvergenceTracker {
    pub fn new(
        router: Arc<RoutingAdapter>,
        reconciler: Arc<Reconciler>,
        config: TrackerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            router,
            reconciler,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
            events,
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Start tracking an instance.
    ///
    /// Returns `None` when a tracker for this id is already running, or
    /// when there is no Tokio runtime to run it on.
    pub fn track(self: &Arc<Self>, id: InstanceId) -> Option<JoinHandle<TrackOutcome>> {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No async runtime; not tracking {}", id);
            return None;
        };

        {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !active.insert(id.clone()) {
                tracing::debug!("Already tracking {}", id);
                return None;
            }
        }

        tracing::debug!("Tracking {}", id);
        let slot = ActiveSlot {
            active: self.active.clone(),
            id: id.clone(),
        };
        let tracker = Arc::clone(self);

        Some(runtime.spawn(async move {
            let _slot = slot;
            let mut task = TrackingTask::new(id);
            let outcome = tracker.run(&mut task).await;
            tracker.finish(&task, &outcome);
            outcome
        }))
    }

    pub fn is_tracking(&self, id: &InstanceId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id)
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    async fn run(&self, task: &mut TrackingTask) -> TrackOutcome {
        let store = self.reconciler.store();

        loop {
            sleep(self.config.interval).await;
            task.ticks += 1;

            if !store.contains(&task.id) {
                return TrackOutcome::Cancelled;
            }

            let agent = match self.router.resolve(&task.id) {
                Ok(agent) => agent,
                Err(CloudError::InstanceNotFound(_)) => return TrackOutcome::Cancelled,
                Err(e) => {
                    tracing::warn!("Cannot poll {}: {}", task.id, e);
                    if task.ticks >= self.config.timeout_ticks {
                        return TrackOutcome::TimedOut {
                            last: task.last_status(),
                        };
                    }
                    continue;
                }
            };

            match agent.get_instance(&task.id).await {
                Ok(reading) => {
                    tracing::debug!(
                        "Poll {} of {}: {}",
                        task.ticks,
                        task.id,
                        reading.status
                    );
                    let settled = agent.is_settled(&reading);
                    if task.observe(reading.observation()) {
                        let scope = ReconcileScope::Instance(task.id.clone());
                        if let Err(e) = self.reconciler.reconcile(scope, vec![reading]) {
                            tracing::warn!("Failed to record reading for {}: {}", task.id, e);
                        }
                    }
                    if settled && task.consecutive >= 2 {
                        return TrackOutcome::Confirmed(task.last_status().unwrap_or_else(
                            || InstanceStatus::Other("unknown".to_string()),
                        ));
                    }
                }
                Err(e) if e.is_not_found() => {
                    if let Err(e) = self.reconciler.delete(&task.id) {
                        tracing::warn!("Failed to delete {}: {}", task.id, e);
                    }
                    return TrackOutcome::NotFound;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Transient failure polling {}: {}", task.id, e);
                }
                Err(e) => return TrackOutcome::Aborted(e.to_string()),
            }

            if task.ticks >= self.config.timeout_ticks {
                return TrackOutcome::TimedOut {
                    last: task.last_status(),
                };
            }
        }
    }

    fn finish(&self, task: &TrackingTask, outcome: &TrackOutcome) {
        match outcome {
            TrackOutcome::TimedOut { .. } => tracing::warn!(
                "Gave up tracking {} after {} polls; keeping last known state",
                task.id,
                task.ticks
            ),
            TrackOutcome::Aborted(reason) => {
                tracing::warn!("Stopped tracking {}: {}", task.id, reason)
            }
            _ => tracing::info!("Tracking {} finished: {}", task.id, outcome),
        }

        // No receivers is fine
        let _ = self.events.send(TrackerEvent {
            instance_id: task.id.clone(),
            outcome: outcome.clone(),
            polls: task.ticks,
        });
    }
}
