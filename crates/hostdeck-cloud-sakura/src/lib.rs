//! Sakura Cloud provider for hostdeck
//!
//! This crate implements the [`ProviderAgent`](hostdeck_cloud::ProviderAgent)
//! trait for Sakura Cloud by driving the `usacloud` CLI.
//!
//! # Requirements
//!
//! - `usacloud` CLI must be installed
//! - Each account supplies its own access token and secret
//!
//! # Example
//!
//! ```ignore
//! use hostdeck_cloud::{Account, AgentFactory, Credentials};
//! use hostdeck_cloud_sakura::SakuraAgentFactory;
//!
//! let account = Account::new("sakura", "main", Credentials::new(token, Some(secret)));
//! let agent = SakuraAgentFactory::default().build(&account)?;
//!
//! let auth = agent.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! let servers = agent.list_instances().await?;
//! ```

pub mod error;
pub mod provider;
pub mod usacloud;

pub use error::{Result, SakuraError};
pub use provider::{DEFAULT_ZONE, PROVIDER, SakuraAgent, SakuraAgentFactory};
pub use usacloud::{CreateServerConfig, ServerInfo, SshKeyInfo, Usacloud};
