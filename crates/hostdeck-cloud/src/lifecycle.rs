//! Bootstrap and account lifecycle

use crate::directory::ROUTER_KEY;
use crate::engine::SyncEngine;
use crate::error::{CloudError, Result};
use crate::model::{Account, AccountId};
use chrono::Utc;

impl SyncEngine {
    /// Load persisted accounts and register one agent per account.
    ///
    /// Accounts whose provider has no factory are kept but get no agent;
    /// their instances fail to route with `AgentNotRegistered`. Returns the
    /// number of agents registered.
    pub async fn bootstrap(&self) -> Result<usize> {
        let _guard = self.lifecycle.lock().await;
        let accounts = self.repository.load().await?;

        let mut registered = 0;
        for account in &accounts {
            match self.factories.build(account) {
                Ok(agent) => {
                    self.directory.register(account.id.clone(), agent);
                    registered += 1;
                }
                Err(e) => tracing::warn!(
                    "No agent for {} ({}): {}",
                    account.display_name,
                    account.id,
                    e
                ),
            }
        }

        {
            let mut live = self
                .accounts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            live.clear();
            live.extend(accounts.into_iter().map(|a| (a.id.clone(), a)));
        }

        self.directory
            .register(AccountId::from(ROUTER_KEY), self.router.clone());

        tracing::info!("Bootstrapped {} provider agents", registered);
        Ok(registered)
    }

    /// Authenticate and persist a new account.
    ///
    /// Re-adding the same credentials replaces the existing account.
    pub async fn add_account(&self, mut account: Account) -> Result<AccountId> {
        let _guard = self.lifecycle.lock().await;

        let agent = self.factories.build(&account)?;
        let auth = agent.check_auth().await?;
        if !auth.authenticated {
            return Err(CloudError::AuthenticationRejected(
                auth.error
                    .unwrap_or_else(|| format!("{} rejected the credentials", agent.display_name())),
            ));
        }

        account.updated_at = Utc::now();
        let id = account.id.clone();
        let snapshot = {
            let mut live = self
                .accounts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(existing) = live.get(&id) {
                account.created_at = existing.created_at;
            }
            live.insert(id.clone(), account);
            live.values().cloned().collect::<Vec<_>>()
        };

        self.repository.save(&snapshot).await?;
        self.directory.register(id.clone(), agent);
        tracing::info!("Added account {}", id);
        Ok(id)
    }

    /// Remove an account.
    ///
    /// Its instances are deleted first (tearing down their dependent
    /// resources), then the account, and only then is its agent
    /// deregistered, so the router never resolves a just-removed agent for
    /// an instance that still exists.
    pub async fn remove_account(&self, id: &AccountId) -> Result<usize> {
        let _guard = self.lifecycle.lock().await;

        let (deleted, snapshot) = {
            let mut live = self
                .accounts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !live.contains_key(id) {
                return Err(CloudError::AccountNotFound(id.to_string()));
            }

            let owned = self.store.by_account(id);
            for instance in &owned {
                self.reconciler.delete(&instance.id)?;
            }

            live.remove(id);
            (owned.len(), live.values().cloned().collect::<Vec<_>>())
        };

        let saved = self.repository.save(&snapshot).await;
        self.directory.deregister(id);
        tracing::info!("Removed account {} and {} instances", id, deleted);

        saved.map(|_| deleted)
    }

    /// Refresh the cached billing snapshot and SSH keys of an account.
    ///
    /// Providers that do not offer one of them keep the previous value.
    pub async fn refresh_account_details(&self, id: &AccountId) -> Result<Account> {
        let agent = self.directory.lookup(id)?;

        let billing = match agent.billing().await {
            Ok(billing) => Some(billing),
            Err(CloudError::UnsupportedOperation { .. }) => None,
            Err(e) => return Err(e),
        };
        let ssh_keys = match agent.ssh_keys().await {
            Ok(keys) => Some(keys),
            Err(CloudError::UnsupportedOperation { .. }) => None,
            Err(e) => return Err(e),
        };

        let _guard = self.lifecycle.lock().await;
        let (account, snapshot) = {
            let mut live = self
                .accounts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let account = live
                .get_mut(id)
                .ok_or_else(|| CloudError::AccountNotFound(id.to_string()))?;
            if billing.is_some() {
                account.billing = billing;
            }
            if let Some(keys) = ssh_keys {
                account.ssh_keys = keys;
            }
            account.updated_at = Utc::now();
            (account.clone(), live.values().cloned().collect::<Vec<_>>())
        };

        self.repository.save(&snapshot).await?;
        Ok(account)
    }
}
