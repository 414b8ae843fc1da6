//! Consistency checker
//!
//! Walks every stored node and verifies the parent/child links in both
//! directions, optionally also strong references. Runs against any
//! [`EntityStore`], so both layouts share it.
//!
//! ## Fix mode
//!
//! With `fix`, child entries that point at absent nodes are dropped from
//! their parents and the repaired parents are stored through a regular
//! change log. Nothing is ever deleted.

use std::collections::BTreeMap;
use std::fmt;

use stowage_core::{ChangeLog, EntityId, ItemState, NodeState, PropertyId, PropertyType};
use tracing::{info, warn};

use crate::error::PersistenceResult;
use crate::store::EntityStore;

/// One finding of a consistency pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyIssue {
    MissingChild {
        parent: EntityId,
        child: EntityId,
    },
    /// The child exists but names a different parent
    ParentMismatch {
        parent: EntityId,
        child: EntityId,
        actual: Option<EntityId>,
    },
    MissingParent {
        node: EntityId,
        parent: EntityId,
    },
    DanglingReference {
        property: PropertyId,
        target: EntityId,
    },
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyIssue::MissingChild { parent, child } => {
                write!(f, "node {} lists missing child {}", parent, child)
            }
            ConsistencyIssue::ParentMismatch {
                parent,
                child,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "child {} of {} records parent {}",
                    child, parent, actual
                ),
                None => write!(f, "child {} of {} records no parent", child, parent),
            },
            ConsistencyIssue::MissingParent { node, parent } => {
                write!(f, "node {} has missing parent {}", node, parent)
            }
            ConsistencyIssue::DanglingReference { property, target } => {
                write!(f, "property {} references missing node {}", property, target)
            }
        }
    }
}

/// Outcome of a consistency pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// The store was empty and nothing was walked
    pub skipped: bool,
    pub checked: usize,
    pub repaired: usize,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsistencyChecker {
    check_references: bool,
}

impl ConsistencyChecker {
    /// `check_references` also resolves every REFERENCE value
    pub fn new(check_references: bool) -> Self {
        Self { check_references }
    }

    pub async fn run<S>(&self, store: &S, fix: bool) -> PersistenceResult<ConsistencyReport>
    where
        S: EntityStore + ?Sized,
    {
        let mut report = ConsistencyReport::default();
        if store.all_node_ids(None, 1).await?.is_empty() {
            info!("Store is empty; skipping consistency check");
            report.skipped = true;
            return Ok(report);
        }

        let ids = store.all_node_ids(None, 0).await?;
        info!(nodes = ids.len(), fix, "Running consistency check");

        let mut repairs: BTreeMap<EntityId, NodeState> = BTreeMap::new();
        for id in ids {
            let node = match store.load_node(&id).await {
                Ok(node) => node,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            report.checked += 1;

            for child in &node.children {
                match store.load_node(&child.id).await {
                    Ok(state) if state.parent_id == Some(id) => {}
                    Ok(state) => report.issues.push(ConsistencyIssue::ParentMismatch {
                        parent: id,
                        child: child.id,
                        actual: state.parent_id,
                    }),
                    Err(e) if e.is_not_found() => {
                        report.issues.push(ConsistencyIssue::MissingChild {
                            parent: id,
                            child: child.id,
                        });
                        if fix {
                            repairs
                                .entry(id)
                                .or_insert_with(|| node.clone())
                                .remove_child_node_entry(&child.id);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            if let Some(parent) = node.parent_id {
                if !store.exists_node(&parent).await? {
                    report
                        .issues
                        .push(ConsistencyIssue::MissingParent { node: id, parent });
                }
            }

            if self.check_references {
                self.check_node_references(store, &node, &mut report).await?;
            }
        }

        for issue in &report.issues {
            warn!(issue = %issue, "Consistency issue");
        }

        if !repairs.is_empty() {
            let mut changes = ChangeLog::new();
            changes.modified = repairs.into_values().map(ItemState::Node).collect();
            store.store(&mut changes).await?;
            report.repaired = changes.modified.len();
            info!(repaired = report.repaired, "Repaired parent nodes");
        }

        info!(
            checked = report.checked,
            issues = report.issues.len(),
            repaired = report.repaired,
            "Consistency check finished"
        );
        Ok(report)
    }

    async fn check_node_references<S>(
        &self,
        store: &S,
        node: &NodeState,
        report: &mut ConsistencyReport,
    ) -> PersistenceResult<()>
    where
        S: EntityStore + ?Sized,
    {
        for name in &node.property_names {
            let id = PropertyId::new(node.id, name.clone());
            let property = match store.load_property(&id).await {
                Ok(property) => property,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if property.property_type != PropertyType::Reference {
                continue;
            }
            for target in property.reference_targets() {
                if !store.exists_node(&target).await? {
                    report.issues.push(ConsistencyIssue::DanglingReference {
                        property: id.clone(),
                        target,
                    });
                }
            }
        }
        Ok(())
    }
}
