//! hostdeck cloud instance synchronization engine
//!
//! This crate keeps one canonical, de-duplicated view of every virtual
//! server across many hosting accounts, each backed by a provider with its
//! own API dialect and status vocabulary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  hostdeck CLI                    │
//! │           (ls / start / stop / deploy)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 SyncEngine                       │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │RoutingAdapter│─▶│ AgentDirectory           │ │
//! │  └──────┬───────┘  │ account id → ProviderAgent│ │
//! │         │          └──────────────────────────┘ │
//! │  ┌──────▼───────┐  ┌──────────────┐             │
//! │  │  Reconciler  │─▶│InstanceStore │             │
//! │  └──────▲───────┘  └──────────────┘             │
//! │  ┌──────┴─────────────┐                         │
//! │  │ ConvergenceTracker │ (one task per instance) │
//! │  └────────────────────┘                         │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ sakura agent  │  ...one crate per provider family
//! └───────────────┘
//! ```
//!
//! Fresh provider listings flow into the [`Reconciler`], which applies a
//! scoped insert/update/delete batch atomically. Instances left in a
//! transitional status are polled by the [`ConvergenceTracker`] until they
//! settle, time out, or disappear.

pub mod action;
pub mod directory;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod router;
pub mod state;
pub mod store;
pub mod tracker;

// Re-exports
pub use action::{Operation, OperationKind, Plan, PlanSummary};
pub use directory::{AgentDirectory, ROUTER_KEY};
pub use engine::SyncEngine;
pub use error::{CloudError, Result};
pub use model::{
    Account, AccountId, AccountSettings, BillingSnapshot, Credentials, Instance, InstanceId,
    InstanceStatus, Observation, SshKey,
};
pub use provider::{
    AgentFactory, AuthStatus, DeployRequest, FactoryRegistry, InstanceCommand, ProviderAgent,
};
pub use reconciler::{ReconcileReport, ReconcileScope, Reconciler};
pub use resources::{DependentResources, SessionState, SshSessionRegistry};
pub use router::RoutingAdapter;
pub use state::{AccountRepository, AccountStore, AccountsDocument, MemoryAccountRepository};
pub use store::InstanceStore;
pub use tracker::{ConvergenceTracker, TrackOutcome, TrackerConfig, TrackerEvent};
