//! Which cached collections a mutation can affect.
//!
//! A mutation of a record invalidates every collection whose membership
//! could include it: the resource's global and "mine" lists, the lists
//! scoped to the record's parent customer or ticket, and for customers and
//! tickets the child collections scoped to them. When a parent is unknown,
//! every collection of that scope kind is invalidated.

use fieldops_interchange::{Record, ResourceKind, Scope};

use crate::query::QueryKey;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScopeMatch {
    /// `All` and `Mine`.
    Unscoped,
    /// One customer, or any customer when `None`.
    Customer(Option<i64>),
    /// One ticket, or any ticket when `None`.
    Task(Option<i64>),
    /// Every scope.
    Any,
}

impl ScopeMatch {
    fn matches(&self, scope: Scope) -> bool {
        match (self, scope) {
            (ScopeMatch::Any, _) => true,
            (ScopeMatch::Unscoped, Scope::All | Scope::Mine) => true,
            (ScopeMatch::Customer(None), Scope::Customer(_)) => true,
            (ScopeMatch::Customer(Some(want)), Scope::Customer(c)) => *want == c,
            (ScopeMatch::Task(None), Scope::Task(_)) => true,
            (ScopeMatch::Task(Some(want)), Scope::Task(t)) => *want == t,
            _ => false,
        }
    }
}

/// A set of (resource, scope) patterns to invalidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    targets: Vec<(ResourceKind, ScopeMatch)>,
}

impl InvalidationPlan {
    fn push(&mut self, resource: ResourceKind, scope: ScopeMatch) {
        if !self.targets.contains(&(resource, scope.clone())) {
            self.targets.push((resource, scope));
        }
    }

    /// Every collection of `resource`, whatever its scope.
    pub fn whole_resource(resource: ResourceKind) -> Self {
        let mut plan = InvalidationPlan::default();
        plan.push(resource, ScopeMatch::Any);
        plan
    }

    /// The history collection of one ticket.
    pub fn task_history(task_id: i64) -> Self {
        let mut plan = InvalidationPlan::default();
        plan.push(ResourceKind::TaskHistory, ScopeMatch::Task(Some(task_id)));
        plan
    }

    /// Collections affected by a mutation of `resource` touching `records`
    /// (the pre- and/or post-mutation images; empty when unknown).
    pub fn for_mutation(resource: ResourceKind, records: &[&Record]) -> Self {
        let spec = resource.spec();
        let mut plan = InvalidationPlan::default();
        plan.push(resource, ScopeMatch::Unscoped);

        if spec.list_by_customer.is_some() {
            let parents: Vec<i64> = spec
                .customer_field
                .map(|f| records.iter().filter_map(|r| r.i64_field(f)).collect())
                .unwrap_or_default();
            if parents.is_empty() {
                plan.push(resource, ScopeMatch::Customer(None));
            }
            for c in parents {
                plan.push(resource, ScopeMatch::Customer(Some(c)));
            }
        }

        if spec.list_by_task.is_some() {
            let parents: Vec<i64> = spec
                .task_field
                .map(|f| records.iter().filter_map(|r| r.i64_field(f)).collect())
                .unwrap_or_default();
            if parents.is_empty() {
                plan.push(resource, ScopeMatch::Task(None));
                plan.push(ResourceKind::TaskHistory, ScopeMatch::Task(None));
            }
            for t in parents {
                plan.push(resource, ScopeMatch::Task(Some(t)));
                plan.push(ResourceKind::TaskHistory, ScopeMatch::Task(Some(t)));
            }
        }

        match resource {
            ResourceKind::Customers => {
                let ids: Vec<Option<i64>> = if records.is_empty() {
                    vec![None]
                } else {
                    records.iter().map(|r| r.id()).collect()
                };
                for child in ResourceKind::ALL {
                    if child.spec().list_by_customer.is_some() {
                        for id in &ids {
                            plan.push(child, ScopeMatch::Customer(*id));
                        }
                    }
                }
            }
            ResourceKind::Tasks => {
                let ids: Vec<Option<i64>> = if records.is_empty() {
                    vec![None]
                } else {
                    records.iter().map(|r| r.id()).collect()
                };
                for id in ids {
                    plan.push(ResourceKind::TaskHistory, ScopeMatch::Task(id));
                    plan.push(ResourceKind::TaskComments, ScopeMatch::Task(id));
                }
            }
            _ => {}
        }
        plan
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        self.targets
            .iter()
            .any(|(resource, scope)| *resource == key.resource && scope.matches(key.scope))
    }
}
