//! Store operations produced by a reconciliation

use crate::model::{Instance, InstanceId};

/// Kind of store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Instance seen for the first time
    Insert,
    /// Known instance with changed content
    Update,
    /// Instance no longer reported by its scope
    Delete,
    /// Known instance, nothing changed
    NoOp,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::NoOp => write!(f, "no-op"),
        }
    }
}

/// One operation against the canonical store
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert(Instance),
    /// The merged instance that replaces the stored copy
    Update(Instance),
    /// The stored copy being removed
    Delete(Instance),
    NoOp(InstanceId),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert(_) => OperationKind::Insert,
            Operation::Update(_) => OperationKind::Update,
            Operation::Delete(_) => OperationKind::Delete,
            Operation::NoOp(_) => OperationKind::NoOp,
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        match self {
            Operation::Insert(i) | Operation::Update(i) | Operation::Delete(i) => &i.id,
            Operation::NoOp(id) => id,
        }
    }
}

/// The batch computed for one reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Whether applying the plan would change the store
    pub fn has_changes(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.kind() != OperationKind::NoOp)
    }

    pub fn ids_by_kind(&self, kind: OperationKind) -> Vec<&InstanceId> {
        self.operations
            .iter()
            .filter(|op| op.kind() == kind)
            .map(|op| op.instance_id())
            .collect()
    }

    fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            insert: self.count(OperationKind::Insert),
            update: self.count(OperationKind::Update),
            delete: self.count(OperationKind::Delete),
            no_change: self.count(OperationKind::NoOp),
        }
    }
}

/// Summary of a reconciliation batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} deleted, {} unchanged",
            self.insert, self.update, self.delete, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceStatus;

    #[test]
    fn test_plan_summary() {
        let a = Instance::new(
            InstanceId::new("sakura", "a"),
            "x".into(),
            "a",
            InstanceStatus::Running,
        );
        let plan = Plan::new(vec![
            Operation::Insert(a.clone()),
            Operation::Delete(a.clone()),
            Operation::NoOp(a.id.clone()),
        ]);

        assert!(plan.has_changes());
        assert_eq!(
            plan.summary().to_string(),
            "1 inserted, 0 updated, 1 deleted, 1 unchanged"
        );
        assert_eq!(plan.ids_by_kind(OperationKind::Delete), vec![&a.id]);

        let idle = Plan::new(vec![Operation::NoOp(a.id)]);
        assert!(!idle.has_changes());
    }
}
