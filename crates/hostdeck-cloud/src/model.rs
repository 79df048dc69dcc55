//! Accounts and instances as seen by the engine
//!
//! Every provider family reports servers in its own vocabulary. Agents
//! normalize those reports into [`Instance`] values before they reach the
//! store, carrying anything provider-specific in [`Instance::extra`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Stable account identifier derived from the credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Derive the id from the provider tag and credential material.
    ///
    /// Re-adding the same credentials always yields the same id.
    pub fn derive(provider: &str, credentials: &Credentials) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(credentials.token.as_bytes());
        hasher.update([0u8]);
        if let Some(secret) = &credentials.secret {
            hasher.update(secret.as_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("{}-{}", provider, &digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential material for one provider account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Credentials {
    pub fn new(token: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            token: token.into(),
            secret,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Provider-specific account settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    /// Region used by providers whose queries are region-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Cached billing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    pub balance: f64,
    pub pending_charges: f64,
    pub currency: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKey {
    pub id: String,
    pub name: String,
    pub public_key: String,
}

/// One set of credentials for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Provider family tag (e.g., "sakura")
    pub provider: String,

    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub credentials: Credentials,

    #[serde(default)]
    pub settings: AccountSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingSnapshot>,

    #[serde(default)]
    pub ssh_keys: Vec<SshKey>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        provider: impl Into<String>,
        display_name: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let provider = provider.into();
        let now = Utc::now();
        Self {
            id: AccountId::derive(&provider, &credentials),
            provider,
            display_name: display_name.into(),
            email: None,
            credentials,
            settings: AccountSettings::default(),
            billing: None,
            ssh_keys: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.settings.default_region = Some(region.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Globally unique instance key: `provider:native-id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(provider: &str, native_id: &str) -> Self {
        Self(format!("{}:{}", provider, native_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn provider(&self) -> &str {
        self.0.split_once(':').map(|(p, _)| p).unwrap_or("")
    }

    /// The provider's own identifier for the server
    pub fn native_id(&self) -> &str {
        self.0.split_once(':').map(|(_, n)| n).unwrap_or(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized instance status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Installing,
    Pending,
    Running,
    Stopped,
    Booting,
    Resizing,
    /// Raw provider status with no normalized equivalent
    Other(String),
}

impl InstanceStatus {
    /// Parse a normalized status name, keeping unknown values verbatim
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "installing" => InstanceStatus::Installing,
            "pending" => InstanceStatus::Pending,
            "running" => InstanceStatus::Running,
            "stopped" => InstanceStatus::Stopped,
            "booting" => InstanceStatus::Booting,
            "resizing" => InstanceStatus::Resizing,
            _ => InstanceStatus::Other(raw.to_string()),
        }
    }

    /// Running and Stopped are the only statuses a tracker may confirm
    pub fn is_stable(&self) -> bool {
        matches!(self, InstanceStatus::Running | InstanceStatus::Stopped)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Installing => write!(f, "installing"),
            InstanceStatus::Pending => write!(f, "pending"),
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Stopped => write!(f, "stopped"),
            InstanceStatus::Booting => write!(f, "booting"),
            InstanceStatus::Resizing => write!(f, "resizing"),
            InstanceStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// The part of an instance a convergence tracker compares between polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub status: InstanceStatus,
    pub power_state: Option<String>,
    pub server_state: Option<String>,
    pub suspended: Option<bool>,
}

/// Canonical representation of one remote server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub account_id: AccountId,
    pub name: String,
    pub status: InstanceStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Opaque provider payload, never interpreted by the engine
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,

    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(
        id: InstanceId,
        account_id: AccountId,
        name: impl Into<String>,
        status: InstanceStatus,
    ) -> Self {
        Self {
            id,
            account_id,
            name: name.into(),
            status,
            power_state: None,
            server_state: None,
            suspended: None,
            ipv4: None,
            ipv6: None,
            location: None,
            plan: None,
            image: None,
            extra: serde_json::Map::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_ipv4(mut self, ip: impl Into<String>) -> Self {
        self.ipv4 = Some(ip.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn observation(&self) -> Observation {
        Observation {
            status: self.status.clone(),
            power_state: self.power_state.clone(),
            server_state: self.server_state.clone(),
            suspended: self.suspended,
        }
    }

    /// Fill fields this fetch left empty from the previously stored copy.
    ///
    /// Name and status always come from the fresh reading.
    pub fn merge_unpopulated(&mut self, previous: &Instance) {
        fn keep(fresh: &mut Option<String>, old: &Option<String>) {
            if fresh.is_none() {
                fresh.clone_from(old);
            }
        }

        keep(&mut self.power_state, &previous.power_state);
        keep(&mut self.server_state, &previous.server_state);
        keep(&mut self.ipv4, &previous.ipv4);
        keep(&mut self.ipv6, &previous.ipv6);
        keep(&mut self.location, &previous.location);
        keep(&mut self.plan, &previous.plan);
        keep(&mut self.image, &previous.image);
        if self.suspended.is_none() {
            self.suspended = previous.suspended;
        }
        for (key, value) in &previous.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Compare everything except the timestamp
    pub fn same_content(&self, other: &Instance) -> bool {
        self.id == other.id
            && self.account_id == other.account_id
            && self.name == other.name
            && self.status == other.status
            && self.power_state == other.power_state
            && self.server_state == other.server_state
            && self.suspended == other.suspended
            && self.ipv4 == other.ipv4
            && self.ipv6 == other.ipv6
            && self.location == other.location
            && self.plan == other.plan
            && self.image == other.image
            && self.extra == other.extra
    }
}
