//! usacloud CLI wrapper
//!
//! Wraps the usacloud CLI commands for Sakura Cloud operations. Credentials
//! are passed per invocation through the environment, so several accounts
//! can be driven from one process.

use crate::error::{Result, SakuraError};
use serde::{Deserialize, Deserializer, Serialize};
use std::process::Stdio;
use tokio::process::Command;

const TOKEN_ENV: &str = "SAKURACLOUD_ACCESS_TOKEN";
const SECRET_ENV: &str = "SAKURACLOUD_ACCESS_TOKEN_SECRET";

/// usacloud CLI wrapper bound to one account and zone
pub struct Usacloud {
    zone: String,
    token: String,
    secret: Option<String>,
}

impl Usacloud {
    pub fn new(zone: impl Into<String>, token: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            zone: zone.into(),
            token: token.into(),
            secret,
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Check if usacloud is installed and authenticated
    pub async fn check_auth(&self) -> Result<UsacloudAuth> {
        let which = Command::new("which").arg("usacloud").output().await?;

        if !which.status.success() {
            return Err(SakuraError::UsacloudNotFound);
        }

        let output = self
            .run_command(&["auth-status", "--output-type", "json"])
            .await?;

        let auth: UsacloudAuth = serde_json::from_str(&output)?;
        Ok(auth)
    }

    /// Run a usacloud command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        self.run(args, None).await
    }

    /// Run a command addressed to one server; only a not-found naming that
    /// server is reported as `ServerNotFound`
    async fn run_server_command(&self, server_id: &str, args: &[&str]) -> Result<String> {
        self.run(args, Some(server_id)).await
    }

    async fn run(&self, args: &[&str], server_id: Option<&str>) -> Result<String> {
        let mut cmd = Command::new("usacloud");
        cmd.arg("--zone").arg(&self.zone);
        cmd.args(args);
        cmd.env(TOKEN_ENV, &self.token);
        if let Some(secret) = &self.secret {
            cmd.env(SECRET_ENV, secret);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: usacloud --zone {} {}", self.zone, args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match server_id {
                Some(id) => SakuraError::from_server_stderr(id, &stderr),
                None => SakuraError::from_stderr(&stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// List all servers in the zone
    pub async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let output = self
            .run_command(&["server", "list", "--output-type", "json"])
            .await?;

        if output.trim().is_empty() || output.trim() == "[]" {
            return Ok(Vec::new());
        }

        let servers: Vec<ServerInfo> = serde_json::from_str(&output)?;
        Ok(servers)
    }

    /// Get server by ID
    pub async fn read_server(&self, id: &str) -> Result<ServerInfo> {
        let output = self
            .run_server_command(id, &["server", "read", id, "--output-type", "json"])
            .await?;

        // `read` answers with a one-element array on some usacloud versions
        let value: serde_json::Value = serde_json::from_str(&output)?;
        let server = match value {
            serde_json::Value::Array(mut items) => match items.pop() {
                Some(item) => serde_json::from_value(item)?,
                None => return Err(SakuraError::ServerNotFound(id.to_string())),
            },
            other => serde_json::from_value(other)?,
        };
        Ok(server)
    }

    /// Create a server
    pub async fn create_server(&self, config: &CreateServerConfig) -> Result<ServerInfo> {
        let core_str = config.core.to_string();
        let memory_str = config.memory.to_string();
        let disk_size_str = config.disk_size.map(|d| d.to_string());

        let mut args = vec![
            "server",
            "create",
            "--name",
            config.name.as_str(),
            "--cpu",
            core_str.as_str(),
            "--memory",
            memory_str.as_str(),
            "--output-type",
            "json",
            "--yes",
        ];

        if let Some(ref disk_size) = disk_size_str {
            args.push("--disk-size");
            args.push(disk_size.as_str());
        }

        if let Some(ref os) = config.os_type {
            args.push("--os-type");
            args.push(os.as_str());
        }

        for id in &config.ssh_key_ids {
            args.push("--disk-edit-ssh-key-ids");
            args.push(id.as_str());
        }

        let output = self.run_command(&args).await?;

        let value: serde_json::Value = serde_json::from_str(&output)?;
        let server = match value {
            serde_json::Value::Array(mut items) => match items.pop() {
                Some(item) => serde_json::from_value(item)?,
                None => return Err(SakuraError::CreationFailed(config.name.clone())),
            },
            other => serde_json::from_value(other)?,
        };
        Ok(server)
    }

    /// Delete a server together with its disks
    pub async fn delete_server(&self, id: &str) -> Result<()> {
        self.run_server_command(
            id,
            &["server", "delete", id, "--with-disks", "--force", "--yes"],
        )
        .await?;
        Ok(())
    }

    /// Power on a server
    pub async fn power_on(&self, id: &str) -> Result<()> {
        self.run_server_command(id, &["server", "boot", id, "--yes"]).await?;
        Ok(())
    }

    /// Power off a server (graceful shutdown)
    pub async fn power_off(&self, id: &str) -> Result<()> {
        self.run_server_command(id, &["server", "shutdown", id, "--yes"]).await?;
        Ok(())
    }

    /// Hard reset a running server
    pub async fn reset(&self, id: &str) -> Result<()> {
        self.run_server_command(id, &["server", "reset", id, "--yes"]).await?;
        Ok(())
    }

    /// List SSH keys
    pub async fn list_ssh_keys(&self) -> Result<Vec<SshKeyInfo>> {
        let output = self
            .run_command(&["ssh-key", "list", "--output-type", "json"])
            .await?;

        if output.trim().is_empty() || output.trim() == "[]" {
            return Ok(Vec::new());
        }

        let keys: Vec<SshKeyInfo> = serde_json::from_str(&output)?;
        Ok(keys)
    }
}

/// Sakura resource ids are numeric in some outputs and strings in others
fn resource_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// Authentication status from usacloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsacloudAuth {
    #[serde(rename = "Account")]
    pub account: Option<AccountInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "ID", deserialize_with = "resource_id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Server information from usacloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "ID", deserialize_with = "resource_id")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "CPU")]
    pub cpu: Option<i32>,

    #[serde(rename = "MemoryMB")]
    pub memory_mb: Option<i32>,

    /// "up", "down", "cleaning", ...
    #[serde(rename = "InstanceStatus")]
    pub instance_status: Option<String>,

    /// "available", "migrating", "failed", ...
    #[serde(rename = "Availability")]
    pub availability: Option<String>,

    #[serde(rename = "Zone")]
    pub zone: Option<ZoneInfo>,

    #[serde(rename = "Interfaces")]
    pub interfaces: Option<Vec<InterfaceInfo>>,
}

impl ServerInfo {
    /// Get the first IP address
    pub fn ip_address(&self) -> Option<String> {
        self.interfaces
            .as_ref()?
            .iter()
            .find_map(|i| i.ip_address.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneInfo {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    #[serde(rename = "IPAddress")]
    pub ip_address: Option<String>,
}

/// Configuration for creating a server
#[derive(Debug, Clone)]
pub struct CreateServerConfig {
    pub name: String,
    pub core: i32,
    pub memory: i32,
    pub disk_size: Option<i32>,
    pub os_type: Option<String>,
    pub ssh_key_ids: Vec<String>,
}

/// SSH key information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyInfo {
    #[serde(rename = "ID", deserialize_with = "resource_id")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "PublicKey")]
    pub public_key: Option<String>,
}
