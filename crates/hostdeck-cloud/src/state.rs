//! Account persistence
//!
//! Manages the `accounts.json` file which holds every account the user has
//! added, together with its cached billing snapshot and SSH keys.

use crate::error::{CloudError, Result};
use crate::model::Account;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

const STATE_VERSION: u32 = 1;
const ACCOUNTS_FILE: &str = "accounts.json";
const BACKUP_SUFFIX: &str = "backup";

/// Where accounts are loaded from and saved to
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn load(&self) -> Result<Vec<Account>>;

    async fn save(&self, accounts: &[Account]) -> Result<()>;
}

/// On-disk accounts document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsDocument {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub accounts: Vec<Account>,
}

impl AccountsDocument {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            accounts,
        }
    }
}

/// JSON file repository with a backup of the previous revision
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store `accounts.json` inside a directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(ACCOUNTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    async fn ensure_parent(&self) -> Result<()> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for AccountStore {
    async fn load(&self) -> Result<Vec<Account>> {
        if !self.path.exists() {
            tracing::debug!("Accounts file not found, starting empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let document: AccountsDocument = serde_json::from_str(&content)?;

        if document.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "Accounts file version {} is newer than supported version {}",
                document.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded {} accounts", document.accounts.len());
        Ok(document.accounts)
    }

    async fn save(&self, accounts: &[Account]) -> Result<()> {
        self.ensure_parent().await?;

        let backup = self.backup_path();
        if self.path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&self.path, &backup).await?;
        }

        let document = AccountsDocument::new(accounts.to_vec());
        let content = serde_json::to_string_pretty(&document)?;
        fs::write(&self.path, content).await?;

        tracing::debug!("Saved {} accounts", accounts.len());
        Ok(())
    }
}

/// Repository that keeps accounts in memory only
#[derive(Default)]
pub struct MemoryAccountRepository {
    accounts: Mutex<Vec<Account>>,
}

impl MemoryAccountRepository {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    pub fn snapshot(&self) -> Vec<Account> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn load(&self) -> Result<Vec<Account>> {
        Ok(self.snapshot())
    }

    async fn save(&self, accounts: &[Account]) -> Result<()> {
        *self
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = accounts.to_vec();
        Ok(())
    }
}
