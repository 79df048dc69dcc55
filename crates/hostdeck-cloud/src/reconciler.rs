//! Scoped reconciliation of fresh provider snapshots into the store
//!
//! A fresh list is authoritative and complete for its scope: anything the
//! store holds inside that scope but the list does not mention is deleted.
//! Instances outside the scope are never touched, so a single-account
//! refresh cannot remove another account's servers.

use crate::action::{Operation, OperationKind, Plan};
use crate::error::{CloudError, Result};
use crate::model::{AccountId, Instance, InstanceId};
use crate::resources::DependentResources;
use crate::store::InstanceStore;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Which part of the store a fresh snapshot is authoritative for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileScope {
    /// Every instance of every account
    Global,
    /// Instances owned by one account
    Account(AccountId),
    /// Instances owned by any of the listed accounts, as fetched by one
    /// fan-out. Accounts added after the fan-out started are not covered.
    Accounts(BTreeSet<AccountId>),
    /// A single instance, as polled by a convergence tracker.
    ///
    /// A reading for an instance that is no longer stored is dropped
    /// instead of inserted, so a late poll cannot resurrect an instance
    /// another path deleted.
    Instance(InstanceId),
}

impl ReconcileScope {
    pub fn contains(&self, instance: &Instance) -> bool {
        match self {
            ReconcileScope::Global => true,
            ReconcileScope::Account(account_id) => &instance.account_id == account_id,
            ReconcileScope::Accounts(ids) => ids.contains(&instance.account_id),
            ReconcileScope::Instance(id) => &instance.id == id,
        }
    }
}

impl fmt::Display for ReconcileScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileScope::Global => write!(f, "global"),
            ReconcileScope::Account(id) => write!(f, "account {}", id),
            ReconcileScope::Accounts(ids) => write!(f, "{} accounts", ids.len()),
            ReconcileScope::Instance(id) => write!(f, "instance {}", id),
        }
    }
}

/// What one reconciliation did
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub plan: Plan,

    /// Instances left in a non-stable status that should be tracked
    pub unsettled: Vec<InstanceId>,
}

/// Computes and applies store batches
pub struct Reconciler {
    store: Arc<InstanceStore>,
    resources: Arc<dyn DependentResources>,
}

impl Reconciler {
    pub fn new(store: Arc<InstanceStore>, resources: Arc<dyn DependentResources>) -> Self {
        Self { store, resources }
    }

    pub fn store(&self) -> &Arc<InstanceStore> {
        &self.store
    }

    /// Diff `fresh` against the store within `scope` and apply the result
    /// as one batch.
    ///
    /// Either every operation is applied or, on error, none is. Dependent
    /// resources are seeded and torn down before the store guard is
    /// released, so they always follow the store's order of batches.
    pub fn reconcile(&self, scope: ReconcileScope, fresh: Vec<Instance>) -> Result<ReconcileReport> {
        let plan = {
            let mut guard = self.store.lock();
            let plan = diff(guard.instances(), &scope, fresh)?;

            for op in &plan.operations {
                match op {
                    Operation::Insert(instance) | Operation::Update(instance) => {
                        guard.upsert(instance.clone());
                    }
                    Operation::Delete(instance) => {
                        guard.remove(&instance.id);
                    }
                    Operation::NoOp(_) => {}
                }
            }

            for op in &plan.operations {
                match op {
                    Operation::Insert(instance) => self.resources.seed(&instance.id),
                    Operation::Delete(instance) => self.resources.teardown(&instance.id),
                    Operation::Update(_) | Operation::NoOp(_) => {}
                }
            }
            plan
        };

        if plan.has_changes() {
            tracing::info!("Reconciled {}: {}", scope, plan.summary());
        } else {
            tracing::debug!("Reconciled {}: no changes", scope);
        }

        let unsettled = if matches!(scope, ReconcileScope::Instance(_)) {
            Vec::new()
        } else {
            self.unsettled(&plan)
        };

        Ok(ReconcileReport { plan, unsettled })
    }

    /// Remove one instance from the store
    pub fn delete(&self, id: &InstanceId) -> Result<ReconcileReport> {
        self.reconcile(ReconcileScope::Instance(id.clone()), Vec::new())
    }

    fn unsettled(&self, plan: &Plan) -> Vec<InstanceId> {
        plan.operations
            .iter()
            .filter(|op| op.kind() != OperationKind::Delete)
            .filter_map(|op| {
                let id = op.instance_id();
                let status = match op {
                    Operation::Insert(i) | Operation::Update(i) => Some(i.status.clone()),
                    Operation::NoOp(_) => self.store.get(id).map(|i| i.status),
                    Operation::Delete(_) => None,
                }?;
                (!status.is_stable()).then(|| id.clone())
            })
            .collect()
    }
}

/// Compute the operations turning the scoped part of `current` into `fresh`
pub fn diff(
    current: &HashMap<InstanceId, Instance>,
    scope: &ReconcileScope,
    fresh: Vec<Instance>,
) -> Result<Plan> {
    validate(scope, &fresh)?;

    // Ordered so that deletes come out deterministically
    let mut remaining: BTreeMap<&InstanceId, &Instance> = current
        .iter()
        .filter(|(_, instance)| scope.contains(instance))
        .collect();

    let mut operations = Vec::with_capacity(fresh.len() + remaining.len());

    for mut instance in fresh {
        match remaining.remove(&instance.id) {
            Some(previous) => {
                instance.merge_unpopulated(previous);
                if instance.same_content(previous) {
                    operations.push(Operation::NoOp(instance.id));
                } else {
                    operations.push(Operation::Update(instance));
                }
            }
            None if matches!(scope, ReconcileScope::Instance(_)) => {
                tracing::debug!("Dropping reading for untracked instance {}", instance.id);
            }
            None => operations.push(Operation::Insert(instance)),
        }
    }

    operations.extend(
        remaining
            .into_values()
            .map(|gone| Operation::Delete(gone.clone())),
    );

    Ok(Plan::new(operations))
}

fn validate(scope: &ReconcileScope, fresh: &[Instance]) -> Result<()> {
    let mut seen = HashSet::with_capacity(fresh.len());
    for instance in fresh {
        if !seen.insert(&instance.id) {
            return Err(CloudError::InvalidSnapshot(format!(
                "duplicate instance {}",
                instance.id
            )));
        }
        if !scope.contains(instance) {
            return Err(CloudError::InvalidSnapshot(format!(
                "instance {} is outside {}",
                instance.id, scope
            )));
        }
    }
    Ok(())
}
