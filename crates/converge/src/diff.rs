//! Diff computation between desired inputs and recorded state

use crate::provider::{DiffVerdict, ResourceProvider};
use crate::resource::ResourceSpec;
use crate::state::StateRecord;
use crate::types::{Action, Inputs};
use serde::Serialize;
use std::collections::BTreeSet;

/// Hash of a set of resolved inputs
///
/// BLAKE3 over the JSON encoding; `Inputs` is a sorted map, so the encoding
/// is canonical.
pub fn inputs_hash(inputs: &Inputs) -> String {
    let bytes = serde_json::to_vec(inputs).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Input keys whose value differs between `old` and `new`
pub fn changed_properties(old: &Inputs, new: &Inputs) -> BTreeSet<String> {
    old.keys()
        .chain(new.keys())
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect()
}

/// What to do with a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Input keys that changed since the last apply
    pub changed: BTreeSet<String>,
    /// The record only needs refreshing; no provider call is made
    pub refresh_only: bool,
}

impl Decision {
    fn new(action: Action, changed: BTreeSet<String>) -> Self {
        Self {
            action,
            changed,
            refresh_only: false,
        }
    }
}

/// Decide the action for a declared resource
///
/// No record means create and an unchanged hash means no-op. A changed
/// resource type, or a change to a key listed in `replace_on_changes`,
/// forces replacement; anything else is up to the provider.
pub fn decide(
    spec: &ResourceSpec,
    record: Option<&StateRecord>,
    inputs: &Inputs,
    provider: &dyn ResourceProvider,
) -> Decision {
    let Some(record) = record else {
        return Decision::new(Action::Create, inputs.keys().cloned().collect());
    };

    if record.resource_type == spec.resource_type && record.inputs_hash == inputs_hash(inputs) {
        return Decision::new(Action::NoOp, BTreeSet::new());
    }

    let changed = changed_properties(&record.inputs, inputs);
    if record.resource_type != spec.resource_type
        || changed.iter().any(|key| spec.replace_on_changes.contains(key))
    {
        return Decision::new(Action::Replace, changed);
    }

    match provider.diff(&spec.resource_type, &record.inputs, inputs) {
        DiffVerdict::NoChange => Decision {
            action: Action::NoOp,
            changed,
            refresh_only: true,
        },
        DiffVerdict::InPlaceUpdate => Decision::new(Action::Update, changed),
        DiffVerdict::RequiresReplace => Decision::new(Action::Replace, changed),
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to delete
    pub removals: usize,
    /// Number of resources to update in place
    pub modifications: usize,
    /// Number of resources to replace
    pub replacements: usize,
    /// Number of resources left alone
    pub unchanged: usize,
    /// Superseded incarnations still to delete
    pub retired: usize,
}

impl DiffSummary {
    /// Count one planned action
    pub fn add(&mut self, action: Action) {
        match action {
            Action::Create => self.additions += 1,
            Action::Delete => self.removals += 1,
            Action::Update => self.modifications += 1,
            Action::Replace => self.replacements += 1,
            Action::NoOp => self.unchanged += 1,
        }
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.replacements
    }

    /// Check if there are any changes, leftover deletes included
    pub fn has_changes(&self) -> bool {
        self.total() > 0 || self.retired > 0
    }
}

impl FromIterator<Action> for DiffSummary {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut summary = Self::default();
        for action in iter {
            summary.add(action);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockProvider;
    use crate::types::Attributes;
    use serde_json::json;

    fn inputs(pairs: &[(&str, serde_json::Value)]) -> Inputs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn record_of(spec: &ResourceSpec, applied: Inputs) -> StateRecord {
        StateRecord::new(
            spec.resource_type.clone(),
            "live-1",
            applied,
            Attributes::new(),
            BTreeSet::new(),
        )
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = inputs(&[("x", json!(1)), ("y", json!("two"))]);
        let b = inputs(&[("y", json!("two")), ("x", json!(1))]);
        assert_eq!(inputs_hash(&a), inputs_hash(&b));
        assert_ne!(inputs_hash(&a), inputs_hash(&inputs(&[("x", json!(2))])));
    }

    #[test]
    fn test_changed_properties() {
        let old = inputs(&[("x", json!(1)), ("gone", json!(true))]);
        let new = inputs(&[("x", json!(2)), ("added", json!(0))]);
        let changed: Vec<_> = changed_properties(&old, &new).into_iter().collect();
        assert_eq!(changed, vec!["added", "gone", "x"]);
    }

    #[test]
    fn test_decide_create_and_noop() {
        let spec = ResourceSpec::new("a", "thing");
        let provider = MockProvider::new();
        let desired = inputs(&[("x", json!(1))]);

        assert_eq!(decide(&spec, None, &desired, &provider).action, Action::Create);

        let record = record_of(&spec, desired.clone());
        let decision = decide(&spec, Some(&record), &desired, &provider);
        assert_eq!(decision.action, Action::NoOp);
        assert!(!decision.refresh_only);
    }

    #[test]
    fn test_decide_defers_to_provider() {
        let spec = ResourceSpec::new("a", "thing");
        let record = record_of(&spec, inputs(&[("x", json!(1))]));
        let desired = inputs(&[("x", json!(2))]);

        let provider = MockProvider::new().with_verdict(DiffVerdict::InPlaceUpdate);
        assert_eq!(decide(&spec, Some(&record), &desired, &provider).action, Action::Update);

        let provider = MockProvider::new().with_verdict(DiffVerdict::RequiresReplace);
        assert_eq!(decide(&spec, Some(&record), &desired, &provider).action, Action::Replace);

        let provider = MockProvider::new().with_verdict(DiffVerdict::NoChange);
        let decision = decide(&spec, Some(&record), &desired, &provider);
        assert_eq!(decision.action, Action::NoOp);
        assert!(decision.refresh_only);
    }

    #[test]
    fn test_replace_on_changes_overrides_provider() {
        let spec = ResourceSpec::new("alb", "load_balancer").replace_on_changes("subnets");
        let record = record_of(&spec, inputs(&[("subnets", json!(["a"])), ("idle", json!(60))]));
        let provider = MockProvider::new().with_verdict(DiffVerdict::InPlaceUpdate);

        let only_idle = inputs(&[("subnets", json!(["a"])), ("idle", json!(120))]);
        assert_eq!(decide(&spec, Some(&record), &only_idle, &provider).action, Action::Update);

        let subnets = inputs(&[("subnets", json!(["a", "b"])), ("idle", json!(60))]);
        let decision = decide(&spec, Some(&record), &subnets, &provider);
        assert_eq!(decision.action, Action::Replace);
        assert!(decision.changed.contains("subnets"));
    }

    #[test]
    fn test_type_change_forces_replace() {
        let spec = ResourceSpec::new("a", "new_type");
        let desired = inputs(&[("x", json!(1))]);
        let mut record = record_of(&spec, desired.clone());
        record.resource_type = "old_type".to_string();

        let provider = MockProvider::new().with_verdict(DiffVerdict::InPlaceUpdate);
        assert_eq!(decide(&spec, Some(&record), &desired, &provider).action, Action::Replace);
    }

    #[test]
    fn test_summary() {
        let summary: DiffSummary = [Action::Create, Action::Create, Action::NoOp, Action::Delete]
            .into_iter()
            .collect();
        assert_eq!(summary.additions, 2);
        assert_eq!(summary.removals, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.total(), 3);
        assert!(summary.has_changes());
    }
}
