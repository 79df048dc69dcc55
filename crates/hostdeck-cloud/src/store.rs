//! Canonical instance store
//!
//! The single in-memory source of truth for every known instance across
//! all accounts. Only the reconciler writes to it; everyone else gets
//! cloned snapshots.

use crate::model::{AccountId, Instance, InstanceId};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use tokio::sync::watch;

pub struct InstanceStore {
    instances: RwLock<HashMap<InstanceId, Instance>>,
    revision: watch::Sender<u64>,
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            instances: RwLock::new(HashMap::new()),
            revision,
        }
    }

    pub fn get(&self, id: &InstanceId) -> Option<Instance> {
        self.read(|instances| instances.get(id).cloned())
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.read(|instances| instances.contains_key(id))
    }

    /// Owning account of an instance, if it is known
    pub fn owner_of(&self, id: &InstanceId) -> Option<AccountId> {
        self.read(|instances| instances.get(id).map(|i| i.account_id.clone()))
    }

    /// All instances, ordered by id
    pub fn all(&self) -> Vec<Instance> {
        self.read(|instances| sorted(instances.values()))
    }

    pub fn by_account(&self, account_id: &AccountId) -> Vec<Instance> {
        self.read(|instances| {
            sorted(
                instances
                    .values()
                    .filter(|instance| &instance.account_id == account_id),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.read(|instances| instances.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of batches applied so far
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver notified after every applied batch
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<InstanceId, Instance>) -> T) -> T {
        let instances = self
            .instances
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&instances)
    }

    /// Exclusive access for one reconciliation batch.
    ///
    /// Holding the guard serializes batches; readers never see a batch
    /// half-applied.
    pub(crate) fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            instances: self
                .instances
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            revision: &self.revision,
            dirty: false,
        }
    }
}

fn sorted<'a>(instances: impl Iterator<Item = &'a Instance>) -> Vec<Instance> {
    let mut list: Vec<Instance> = instances.cloned().collect();
    list.sort_by(|a, b| a.id.cmp(&b.id));
    list
}

pub(crate) struct StoreGuard<'a> {
    instances: RwLockWriteGuard<'a, HashMap<InstanceId, Instance>>,
    revision: &'a watch::Sender<u64>,
    dirty: bool,
}

impl StoreGuard<'_> {
    pub(crate) fn instances(&self) -> &HashMap<InstanceId, Instance> {
        &self.instances
    }

    pub(crate) fn upsert(&mut self, instance: Instance) {
        self.instances.insert(instance.id.clone(), instance);
        self.dirty = true;
    }

    pub(crate) fn remove(&mut self, id: &InstanceId) -> Option<Instance> {
        let removed = self.instances.remove(id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        if self.dirty {
            self.revision.send_modify(|rev| *rev += 1);
        }
    }
}
