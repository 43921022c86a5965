//! Run reports

use crate::types::{Action, Status};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Why a node did not reach Ready
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    /// Never started because a dependency (or, for deletions, a dependent) did not finish
    Blocked { by: String },
    /// Failed with an error
    Error { message: String },
    /// Stopped by run cancellation
    Cancelled { reason: String },
}

/// Final state of one resource after a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub resource_type: String,
    pub status: Status,
    /// Action decided for the node, if it got that far
    pub action: Option<Action>,
    /// Live identity after the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Outputs visible to dependents
    #[serde(skip_serializing_if = "Value::is_null")]
    pub outputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
    /// Provider attempts made, retries included
    pub attempts: u32,
}

impl NodeReport {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            status: Status::Pending,
            action: None,
            identity: None,
            outputs: Value::Null,
            detail: None,
            attempts: 0,
        }
    }

    /// Blocked by an unfinished resource
    pub fn blocked(mut self, by: impl Into<String>) -> Self {
        self.status = Status::Pending;
        self.detail = Some(Detail::Blocked { by: by.into() });
        self
    }

    /// Stopped by cancellation
    pub fn cancelled(mut self, reason: impl Into<String>) -> Self {
        self.status = Status::Cancelled;
        self.detail = Some(Detail::Cancelled {
            reason: reason.into(),
        });
        self
    }

    /// Failed with an error
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = Status::Failed;
        self.detail = Some(Detail::Error {
            message: message.into(),
        });
        self
    }

    /// Whether the node ended blocked
    pub fn is_blocked(&self) -> bool {
        matches!(self.detail, Some(Detail::Blocked { .. }))
    }

    /// Whether the node finished its work, deleted resources included
    pub fn is_done(&self) -> bool {
        self.status == Status::Ready
    }
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl RunSummary {
    /// Add a node's outcome to the summary
    pub fn add(&mut self, report: &NodeReport) {
        match report.status {
            Status::Ready => match report.action {
                Some(Action::Create) => self.created += 1,
                Some(Action::Update) => self.updated += 1,
                Some(Action::Replace) => self.replaced += 1,
                Some(Action::Delete) => self.deleted += 1,
                Some(Action::NoOp) | None => self.unchanged += 1,
            },
            Status::Failed => self.failed += 1,
            Status::Cancelled => self.cancelled += 1,
            _ if report.is_blocked() => self.blocked += 1,
            _ => {}
        }
    }

    /// Number of resources changed
    pub fn changed(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Whether every node converged
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.blocked == 0 && self.cancelled == 0
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// One entry per logical name, deleted resources included
    pub resources: BTreeMap<String, NodeReport>,
    /// Resolved stack outputs
    pub outputs: BTreeMap<String, Value>,
    pub summary: RunSummary,
}

impl RunReport {
    /// Record a node's final state
    pub fn insert(&mut self, report: NodeReport) {
        self.summary.add(&report);
        self.resources.insert(report.name.clone(), report);
    }

    /// Look up a node
    pub fn get(&self, name: &str) -> Option<&NodeReport> {
        self.resources.get(name)
    }

    /// Whether every node converged
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// Nodes that did not converge
    pub fn problems(&self) -> impl Iterator<Item = &NodeReport> {
        self.resources
            .values()
            .filter(|r| r.status != Status::Ready)
    }
}
