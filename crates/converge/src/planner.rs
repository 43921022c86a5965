//! Execution planner - orders resources into batches

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::state::StateRecord;
use std::collections::{BTreeMap, BTreeSet};

/// An execution plan: batches applied one after the other
///
/// Every resource in a batch depends only on resources in strictly earlier
/// batches, so a batch can run concurrently. Names within a batch are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Batches of declared resources, dependencies first
    pub batches: Vec<Vec<String>>,
    /// Trailing batches of recorded resources that are no longer declared, dependents first
    pub deletions: Vec<Vec<String>>,
}

impl Plan {
    /// Attach deletion batches
    pub fn with_deletions(mut self, deletions: Vec<Vec<String>>) -> Self {
        self.deletions = deletions;
        self
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.batches.iter().chain(&self.deletions).map(Vec::len).sum()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.total_resources() == 0
    }

    /// Names scheduled for deletion
    pub fn doomed(&self) -> BTreeSet<&str> {
        self.deletions.iter().flatten().map(String::as_str).collect()
    }

    /// Batch index of a declared resource
    pub fn batch_of(&self, name: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|n| n == name))
    }
}

/// Compute the batches for a graph
///
/// Fails on the first reference to an undeclared resource, and never returns
/// a partial plan for a graph that still holds a cycle.
pub fn plan(graph: &Graph) -> Result<Plan> {
    if let Some(dangling) = graph.dangling().first() {
        return Err(dangling.to_error());
    }

    let mut remaining: BTreeMap<&str, usize> = graph
        .names()
        .map(|name| (name, graph.dependencies_of(name).count()))
        .collect();
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let batch: Vec<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();

        if batch.is_empty() {
            let cycle = graph.find_cycle().unwrap_or_else(|| {
                remaining.keys().map(|name| (*name).to_string()).collect()
            });
            return Err(Error::Cycle { cycle });
        }

        for name in &batch {
            remaining.remove(name);
        }
        for name in &batch {
            for dependent in graph.dependents_of(name) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                }
            }
        }

        batches.push(batch.into_iter().map(str::to_string).collect());
    }

    log::debug!(
        "Planned {} resources in {} batches",
        graph.len(),
        batches.len()
    );
    Ok(Plan {
        batches,
        deletions: Vec::new(),
    })
}

/// Schedule deletions for recorded resources that are no longer declared
///
/// A resource is deleted only after every doomed resource that depended on
/// it. Recorded dependencies on resources that stay declared are ignored.
pub fn schedule_deletions(
    graph: &Graph,
    records: &BTreeMap<String, StateRecord>,
) -> Vec<Vec<String>> {
    let doomed: BTreeSet<&str> = records
        .keys()
        .map(String::as_str)
        .filter(|name| !graph.contains(name))
        .collect();

    // Count, per doomed resource, the doomed resources still depending on it.
    let mut dependents: BTreeMap<&str, usize> = doomed.iter().map(|name| (*name, 0)).collect();
    for name in &doomed {
        for dep in &records[*name].dependencies {
            if let Some(count) = dependents.get_mut(dep.as_str()) {
                *count += 1;
            }
        }
    }

    let mut batches = Vec::new();
    while !dependents.is_empty() {
        let batch: Vec<&str> = dependents
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();

        if batch.is_empty() {
            // Recorded dependencies can only loop if the records were edited by hand.
            let rest: Vec<String> = dependents.keys().map(|n| (*n).to_string()).collect();
            log::warn!(
                "Recorded dependencies of {} form a cycle; deleting them together",
                rest.join(", ")
            );
            batches.push(rest);
            break;
        }

        for name in &batch {
            dependents.remove(name);
            for dep in &records[*name].dependencies {
                if let Some(count) = dependents.get_mut(dep.as_str()) {
                    *count -= 1;
                }
            }
        }
        batches.push(batch.into_iter().map(str::to_string).collect());
    }

    batches
}
