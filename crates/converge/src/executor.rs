//! Reconciler - converges live state toward a declaration
//!
//! A run builds the graph, plans batches, then walks them in order. Within
//! a batch every node runs on a bounded rayon pool: it resolves its deferred
//! inputs, diffs them against the recorded state, calls its provider with
//! retries, and commits the outcome to the state store. A node whose
//! dependency did not reach Ready never starts; independent branches carry on.

use crate::context::{CancelToken, ProgressCallback};
use crate::diff::{Decision, DiffSummary, decide};
use crate::error::{Error, ProviderError, ProviderResult, Result};
use crate::graph::Graph;
use crate::planner::{self, Plan};
use crate::provider::{OpContext, ProviderRegistry, ReplaceStrategy, ResourceProvider};
use crate::report::{Detail, NodeReport, RunReport};
use crate::resolve::Resolver;
use crate::resource::{Declaration, ResourceSpec};
use crate::retry::{LogCallback, RetryCallback, with_retry};
use crate::state::{Retired, StateRecord, StateSession, StateSnapshot, StateStore, outputs_of};
use crate::types::{Action, Attributes, ExecuteOptions, Inputs, Status};
use rayon::prelude::*;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Everything known before the first side effect
struct Prepared {
    graph: Graph,
    snapshot: StateSnapshot,
    plan: Plan,
}

/// Shared, read-only view of a run handed to node tasks
struct RunState<'r> {
    graph: &'r Graph,
    snapshot: &'r StateSnapshot,
    session: StateSession<'r>,
    resolver: Resolver,
    /// For each doomed resource, every recorded resource that depended on it when last applied
    deletion_blockers: BTreeMap<String, BTreeSet<String>>,
}

/// Outcome of one node task
struct NodeOutcome {
    report: NodeReport,
    fatal: Option<Error>,
}

impl From<NodeReport> for NodeOutcome {
    fn from(report: NodeReport) -> Self {
        Self {
            report,
            fatal: None,
        }
    }
}

/// Why a node stopped short of Ready
enum NodeFailure {
    /// A provider call failed or was cancelled
    Provider {
        op: &'static str,
        error: ProviderError,
    },
    /// A superseded resource could not be deleted; it stays recorded
    OldResource {
        identity: String,
        error: ProviderError,
    },
    /// Declaration problem found while applying
    Invalid(String),
    /// The outcome could not be recorded; the run stops
    Fatal(Error),
}

/// Live resource produced by a provider
struct Applied {
    identity: String,
    attributes: Attributes,
    /// Already written to the state store
    committed: bool,
}

/// Predicted outcome for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewEntry {
    pub name: String,
    pub resource_type: String,
    pub action: Action,
    /// Input keys that changed since the last apply
    pub changed: BTreeSet<String>,
    /// Inputs recorded by the last apply
    pub old_inputs: Option<Inputs>,
    /// Inputs that would be applied, unknown values rendered as placeholders
    pub new_inputs: Option<Inputs>,
    /// Input keys whose value is not known until a dependency is provisioned
    pub unknown: BTreeSet<String>,
    /// Identities of earlier incarnations still owed a delete
    pub retired: Vec<String>,
}

/// Side-effect-free prediction of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    #[serde(skip)]
    pub plan: Plan,
    /// One entry per resource, in plan order, deletions last
    pub entries: Vec<PreviewEntry>,
    /// Stack outputs, unknown values rendered as placeholders
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub summary: DiffSummary,
}

/// Converges a declaration against the state store using registered providers
pub struct Reconciler<'a> {
    registry: &'a ProviderRegistry,
    store: &'a dyn StateStore,
    options: ExecuteOptions,
    cancel: CancelToken,
    retry_callback: &'a dyn RetryCallback,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a ProviderRegistry, store: &'a dyn StateStore) -> Self {
        Self {
            registry,
            store,
            options: ExecuteOptions::default(),
            cancel: CancelToken::new(),
            retry_callback: &LogCallback,
        }
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_retry_callback(mut self, callback: &'a dyn RetryCallback) -> Self {
        self.retry_callback = callback;
        self
    }

    /// Handle for cancelling the run from elsewhere
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Pre-flight checks: graph, plan, provider coverage, current state
    fn prepare(&self, declaration: &Declaration) -> Result<Prepared> {
        let graph = Graph::build(declaration.resources.iter().cloned())?;
        let plan = planner::plan(&graph)?;

        for (key, value) in &declaration.outputs {
            if let Some(reference) = value.references().into_iter().find(|r| !graph.contains(&r.resource)) {
                return Err(Error::Plan {
                    resource: key.clone(),
                    message: format!(
                        "stack output references unknown resource `{}`",
                        reference.resource
                    ),
                });
            }
        }

        self.registry.check(&graph)?;
        let snapshot = self.store.load()?;
        let deletions = planner::schedule_deletions(&graph, &snapshot.records);

        Ok(Prepared {
            plan: plan.with_deletions(deletions),
            graph,
            snapshot,
        })
    }

    /// Reconcile the declaration
    ///
    /// Per-resource failures are reported, not returned: the run carries on
    /// with every branch that does not depend on the failure. Pre-flight
    /// errors are returned before any provider is called; state store
    /// failures and concurrent modification cancel the rest of the run and
    /// come back as [`Error::Aborted`] with the report so far.
    pub fn run<P: ProgressCallback>(
        &self,
        declaration: &Declaration,
        progress: &mut P,
    ) -> Result<RunReport> {
        let Prepared {
            graph,
            snapshot,
            plan,
        } = self.prepare(declaration)?;

        if let Some(timeout) = self.options.timeout {
            self.cancel.arm_timeout(timeout);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .build()?;

        let doomed = plan.doomed();
        // Declared resources count too: until they are re-applied, their live
        // incarnation may still point at the doomed one.
        let mut deletion_blockers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, record) in &snapshot.records {
            for dep in record.dependencies.iter().filter(|d| doomed.contains(d.as_str())) {
                deletion_blockers
                    .entry(dep.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        let run = RunState {
            graph: &graph,
            snapshot: &snapshot,
            session: StateSession::new(self.store, snapshot.revision),
            resolver: Resolver::new(),
            deletion_blockers,
        };

        log::info!(
            "Reconciling {} resources ({} to delete) in {} batches",
            graph.len(),
            doomed.len(),
            plan.batches.len() + plan.deletions.len()
        );

        let mut report = RunReport::default();
        let batches = plan
            .batches
            .iter()
            .map(|batch| (batch, false))
            .chain(plan.deletions.iter().map(|batch| (batch, true)));

        for (index, (batch, deleting)) in batches.enumerate() {
            progress.on_batch_start(index, batch, deleting);

            let finished = &report.resources;
            let outcomes: Vec<NodeOutcome> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|name| {
                        if deleting {
                            self.delete_node(&run, finished, name)
                        } else {
                            self.reconcile_node(&run, finished, name)
                        }
                    })
                    .collect()
            });

            let mut fatal = None;
            for outcome in outcomes {
                progress.on_resource_complete(&outcome.report);
                report.insert(outcome.report);
                if fatal.is_none() {
                    fatal = outcome.fatal;
                }
            }
            progress.on_batch_complete();

            if let Some(error) = fatal {
                self.cancel.cancel();
                let reason = format!("run aborted: {error}");
                let mut skipped = 0;
                for name in plan.batches.iter().chain(&plan.deletions).flatten() {
                    if report.resources.contains_key(name) {
                        continue;
                    }
                    let resource_type = graph
                        .spec(name)
                        .map(|spec| spec.resource_type.as_str())
                        .or_else(|| snapshot.get(name).map(|r| r.resource_type.as_str()))
                        .unwrap_or_default();
                    report.insert(NodeReport::new(name.as_str(), resource_type).cancelled(&reason));
                    skipped += 1;
                }
                log::error!("Run aborted, {skipped} resources not attempted: {error}");
                return Err(Error::Aborted {
                    source: Box::new(error),
                    report: Box::new(report),
                });
            }
        }

        report.outputs = run.resolver.resolve_outputs(&declaration.outputs, false);
        log::info!(
            "Run finished: {} changed, {} unchanged, {} failed, {} blocked, {} cancelled",
            report.summary.changed(),
            report.summary.unchanged,
            report.summary.failed,
            report.summary.blocked,
            report.summary.cancelled
        );
        Ok(report)
    }

    /// Reconcile against an empty declaration, deleting everything recorded
    pub fn destroy<P: ProgressCallback>(&self, progress: &mut P) -> Result<RunReport> {
        self.run(&Declaration::new(), progress)
    }

    /// Predict what [`Reconciler::run`] would do without changing anything
    ///
    /// Providers are only asked to classify diffs. Outputs of resources that
    /// would change are unknown, so inputs derived from them are rendered as
    /// placeholders and their dependents are predicted to change too.
    pub fn preview(&self, declaration: &Declaration) -> Result<Preview> {
        let Prepared {
            graph,
            snapshot,
            plan,
        } = self.prepare(declaration)?;
        let resolver = Resolver::new();
        let mut entries = Vec::with_capacity(plan.total_resources());

        for name in plan.batches.iter().flatten() {
            let Some(spec) = graph.spec(name) else {
                continue;
            };
            let Some(provider) = self.registry.get(&spec.resource_type) else {
                continue;
            };
            let record = snapshot.get(name);
            let (inputs, unknown) = resolver.preview_inputs(spec)?;

            let mut decision = decide(spec, record, &inputs, provider);
            if !unknown.is_empty() && decision.action == Action::NoOp {
                decision.action = Action::Update;
            }
            if decision.action == Action::NoOp
                && let Some(record) = record
            {
                resolver.mark_ready(
                    name,
                    outputs_of(&record.live_identity, &inputs, &record.attributes),
                );
            }

            entries.push(PreviewEntry {
                name: name.clone(),
                resource_type: spec.resource_type.clone(),
                action: decision.action,
                changed: decision.changed,
                old_inputs: record.map(|r| r.inputs.clone()),
                new_inputs: Some(inputs),
                unknown,
                retired: retired_identities(record),
            });
        }

        for name in plan.deletions.iter().flatten() {
            let Some(record) = snapshot.get(name) else {
                continue;
            };
            entries.push(PreviewEntry {
                name: name.clone(),
                resource_type: record.resource_type.clone(),
                action: Action::Delete,
                changed: BTreeSet::new(),
                old_inputs: Some(record.inputs.clone()),
                new_inputs: None,
                unknown: BTreeSet::new(),
                retired: retired_identities(Some(record)),
            });
        }

        let mut summary: DiffSummary = entries.iter().map(|e| e.action).collect();
        summary.retired = entries.iter().map(|e| e.retired.len()).sum();
        Ok(Preview {
            outputs: resolver.resolve_outputs(&declaration.outputs, true),
            plan,
            entries,
            summary,
        })
    }

    fn cancel_reason(&self) -> &'static str {
        if self.cancel.timed_out() {
            "run timed out"
        } else {
            "run cancelled"
        }
    }

    /// Converge one declared resource
    fn reconcile_node(
        &self,
        run: &RunState<'_>,
        finished: &BTreeMap<String, NodeReport>,
        name: &str,
    ) -> NodeOutcome {
        let Some(spec) = run.graph.spec(name) else {
            return NodeReport::new(name, "")
                .failed("resource is not declared")
                .into();
        };
        let mut node = NodeReport::new(name, &spec.resource_type);

        if self.cancel.is_cancelled() {
            return node.cancelled(self.cancel_reason()).into();
        }
        if let Some(by) = blocker(finished, run.graph.dependencies_of(name)) {
            log::debug!("{name}: blocked by {by}");
            return node.blocked(by).into();
        }

        let record = match run.snapshot.get(name) {
            Some(record) if !record.retired.is_empty() => {
                match self.delete_retired(run, &mut node, record) {
                    Ok(settled) => Some(Cow::Owned(settled)),
                    Err(failure) => return self.fail(node, failure),
                }
            }
            other => other.map(Cow::Borrowed),
        };
        let record = record.as_deref();

        transition(name, Status::Resolving);
        let inputs = match run.resolver.resolve_inputs(spec) {
            Ok(inputs) => inputs,
            Err(e) => {
                log::warn!("{name}: {e}");
                return node.failed(e.to_string()).into();
            }
        };

        transition(name, Status::Diffing);
        let Some(provider) = self.registry.get(&spec.resource_type) else {
            return node
                .failed(format!("no provider for resource type `{}`", spec.resource_type))
                .into();
        };
        let decision = decide(spec, record, &inputs, provider);
        node.action = Some(decision.action);
        transition(name, decision.action.status());

        match self.apply(run, spec, record, &inputs, &decision, provider, &mut node) {
            Ok(applied) => {
                if !applied.committed {
                    let record = self.record_for(run, spec, &applied, &inputs);
                    if let Err(e) = run.session.commit(name, &record) {
                        log::error!(
                            "{name}: live resource `{}` could not be recorded: {e}",
                            applied.identity
                        );
                        return NodeOutcome {
                            report: node.failed(e.to_string()),
                            fatal: Some(e),
                        };
                    }
                }
                let outputs = outputs_of(&applied.identity, &inputs, &applied.attributes);
                run.resolver.mark_ready(name, outputs.clone());
                node.status = Status::Ready;
                node.identity = Some(applied.identity);
                node.outputs = outputs;
                transition(name, Status::Ready);
                node.into()
            }
            Err(failure) => self.fail(node, failure),
        }
    }

    /// Carry out a decision, returning the live resource
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        run: &RunState<'_>,
        spec: &ResourceSpec,
        record: Option<&StateRecord>,
        inputs: &Inputs,
        decision: &Decision,
        provider: &dyn ResourceProvider,
        node: &mut NodeReport,
    ) -> std::result::Result<Applied, NodeFailure> {
        let name = spec.name.as_str();
        let kind = spec.resource_type.as_str();

        let existing = || {
            record.ok_or_else(|| NodeFailure::Invalid(format!("{name} has no recorded state")))
        };

        match decision.action {
            Action::NoOp => {
                let record = existing()?;
                let dependencies = self.dependencies(run, name);
                Ok(Applied {
                    identity: record.live_identity.clone(),
                    attributes: record.attributes.clone(),
                    // Refresh the record when only non-semantic details moved.
                    committed: !decision.refresh_only && record.dependencies == dependencies,
                })
            }
            Action::Create => {
                let created = self.call(node, kind, "create", |ctx| provider.create(ctx, inputs))?;
                Ok(Applied {
                    identity: created.identity,
                    attributes: created.attributes,
                    committed: false,
                })
            }
            Action::Update => {
                let record = existing()?;
                let attributes = self.call(node, kind, "update", |ctx| {
                    provider.update(ctx, &record.live_identity, &record.inputs, inputs)
                })?;
                Ok(Applied {
                    identity: record.live_identity.clone(),
                    attributes,
                    committed: false,
                })
            }
            Action::Replace => {
                let record = existing()?;
                let old_provider = self.registry.get(&record.resource_type).ok_or_else(|| {
                    NodeFailure::Invalid(format!(
                        "no provider for recorded resource type `{}`",
                        record.resource_type
                    ))
                })?;
                let delete_old = |node: &mut NodeReport| {
                    self.call(node, &record.resource_type, "delete", |ctx| {
                        old_provider.delete(ctx, &record.live_identity, &record.inputs)
                    })
                };

                match provider.replace_strategy(kind) {
                    ReplaceStrategy::DeleteBeforeCreate => {
                        delete_old(&mut *node)?;
                        run.session.remove(name).map_err(NodeFailure::Fatal)?;
                        let created =
                            self.call(node, kind, "create", |ctx| provider.create(ctx, inputs))?;
                        Ok(Applied {
                            identity: created.identity,
                            attributes: created.attributes,
                            committed: false,
                        })
                    }
                    ReplaceStrategy::CreateBeforeDelete => {
                        let created =
                            self.call(node, kind, "create", |ctx| provider.create(ctx, inputs))?;
                        let applied = Applied {
                            identity: created.identity,
                            attributes: created.attributes,
                            committed: false,
                        };
                        // The old resource stays on record until its delete succeeds.
                        let handover = self
                            .record_for(run, spec, &applied, inputs)
                            .with_retired(vec![Retired::from(record)]);
                        run.session
                            .commit(name, &handover)
                            .map_err(NodeFailure::Fatal)?;
                        node.identity = Some(applied.identity.clone());

                        match delete_old(&mut *node) {
                            Ok(()) => Ok(applied),
                            Err(NodeFailure::Provider { error, .. }) => Err(NodeFailure::OldResource {
                                identity: record.live_identity.clone(),
                                error,
                            }),
                            Err(other) => Err(other),
                        }
                    }
                }
            }
            Action::Delete => Err(NodeFailure::Invalid(format!(
                "{name} is declared and cannot be deleted"
            ))),
        }
    }

    /// Delete one recorded resource that is no longer declared
    fn delete_node(
        &self,
        run: &RunState<'_>,
        finished: &BTreeMap<String, NodeReport>,
        name: &str,
    ) -> NodeOutcome {
        let Some(record) = run.snapshot.get(name) else {
            return NodeReport::new(name, "").failed("no recorded state").into();
        };
        let mut node = NodeReport::new(name, &record.resource_type);
        node.action = Some(Action::Delete);
        node.identity = Some(record.live_identity.clone());

        if self.cancel.is_cancelled() {
            return node.cancelled(self.cancel_reason()).into();
        }
        let dependents = run
            .deletion_blockers
            .get(name)
            .into_iter()
            .flat_map(|d| d.iter().map(String::as_str));
        if let Some(by) = blocker(finished, dependents) {
            log::debug!("{name}: deletion blocked by {by}");
            return node.blocked(by).into();
        }

        if !record.retired.is_empty()
            && let Err(failure) = self.delete_retired(run, &mut node, record)
        {
            return self.fail(node, failure);
        }

        let Some(provider) = self.registry.get(&record.resource_type) else {
            return node
                .failed(format!(
                    "no provider for recorded resource type `{}`",
                    record.resource_type
                ))
                .into();
        };

        transition(name, Status::Deleting);
        let deleted = self.call(&mut node, &record.resource_type, "delete", |ctx| {
            provider.delete(ctx, &record.live_identity, &record.inputs)
        });
        if let Err(failure) = deleted {
            return self.fail(node, failure);
        }

        if let Err(e) = run.session.remove(name) {
            return NodeOutcome {
                report: node.failed(e.to_string()),
                fatal: Some(e),
            };
        }
        node.status = Status::Ready;
        node.identity = None;
        transition(name, Status::Ready);
        node.into()
    }

    /// Delete earlier incarnations left behind by a replacement
    ///
    /// Returns the record as committed afterwards. Incarnations that could
    /// not be deleted stay on it for the next run.
    fn delete_retired(
        &self,
        run: &RunState<'_>,
        node: &mut NodeReport,
        record: &StateRecord,
    ) -> std::result::Result<StateRecord, NodeFailure> {
        let name = node.name.clone();
        let mut remaining = Vec::new();
        let mut failure = None;

        for retired in &record.retired {
            if failure.is_some() {
                remaining.push(retired.clone());
                continue;
            }
            transition(&name, Status::Deleting);
            let deleted = match self.registry.get(&retired.resource_type) {
                Some(provider) => self
                    .call(node, &retired.resource_type, "delete", |ctx| {
                        provider.delete(ctx, &retired.live_identity, &retired.inputs)
                    })
                    .map_err(|failure| match failure {
                        NodeFailure::Provider { error, .. } => error,
                        _ => ProviderError::permanent("delete failed"),
                    }),
                None => Err(ProviderError::permanent(format!(
                    "no provider for recorded resource type `{}`",
                    retired.resource_type
                ))),
            };
            match deleted {
                Ok(()) => log::info!("{name}: deleted superseded `{}`", retired.live_identity),
                Err(error) => {
                    remaining.push(retired.clone());
                    failure = Some(NodeFailure::OldResource {
                        identity: retired.live_identity.clone(),
                        error,
                    });
                }
            }
        }

        let settled = record.clone().with_retired(remaining);
        if settled.retired.len() != record.retired.len() {
            run.session
                .commit(&name, &settled)
                .map_err(NodeFailure::Fatal)?;
        }
        match failure {
            Some(failure) => Err(failure),
            None => Ok(settled),
        }
    }

    /// Call a provider operation with retries and cancellation
    fn call<T>(
        &self,
        node: &mut NodeReport,
        resource_type: &str,
        op: &'static str,
        mut operation: impl FnMut(&OpContext<'_>) -> ProviderResult<T>,
    ) -> std::result::Result<T, NodeFailure> {
        let name = node.name.clone();
        log::info!("{op} {name} ({resource_type})");

        let outcome = with_retry(
            &self.options.retry,
            &self.cancel,
            self.retry_callback,
            &name,
            |attempt| {
                let ctx = OpContext {
                    resource: &name,
                    resource_type,
                    cancel: &self.cancel,
                    attempt,
                };
                operation(&ctx)
            },
        );
        node.attempts += outcome.attempts;
        outcome
            .result
            .map_err(|error| NodeFailure::Provider { op, error })
    }

    /// Turn a failure into the node's final report
    fn fail(&self, node: NodeReport, failure: NodeFailure) -> NodeOutcome {
        let name = node.name.clone();
        match failure {
            NodeFailure::OldResource { identity, error } if error.is_cancelled() => {
                let reason = format!(
                    "{}; superseded `{identity}` is still recorded for deletion",
                    self.cancel_reason()
                );
                log::warn!("{name}: {reason}");
                node.cancelled(reason).into()
            }
            NodeFailure::Provider { error, .. } if error.is_cancelled() => {
                log::warn!("{name}: {}", self.cancel_reason());
                node.cancelled(self.cancel_reason()).into()
            }
            NodeFailure::Provider { op, error } => {
                let error = Error::Provider {
                    resource: name.clone(),
                    source: error,
                };
                log::warn!("{name}: {op} failed: {error}");
                node.failed(format!("{op} failed: {}", error_message(&error)))
                    .into()
            }
            NodeFailure::OldResource { identity, error } => {
                log::warn!("{name}: superseded `{identity}` was not deleted: {error}");
                node.failed(format!(
                    "deleting the superseded resource `{identity}` failed: {error}; \
                     it stays recorded and is retried on the next run"
                ))
                .into()
            }
            NodeFailure::Invalid(message) => node.failed(message).into(),
            NodeFailure::Fatal(error) => NodeOutcome {
                report: node.failed(error.to_string()),
                fatal: Some(error),
            },
        }
    }

    fn dependencies(&self, run: &RunState<'_>, name: &str) -> BTreeSet<String> {
        run.graph
            .dependencies_of(name)
            .map(str::to_string)
            .collect()
    }

    fn record_for(
        &self,
        run: &RunState<'_>,
        spec: &ResourceSpec,
        applied: &Applied,
        inputs: &Inputs,
    ) -> StateRecord {
        StateRecord::new(
            spec.resource_type.clone(),
            applied.identity.clone(),
            inputs.clone(),
            applied.attributes.clone(),
            self.dependencies(run, &spec.name),
        )
    }
}

/// Provider message with its retry classification
fn error_message(error: &Error) -> String {
    match error {
        Error::Provider { source, .. } => {
            format!("{} ({})", source.message, source.kind.description().to_lowercase())
        }
        other => other.to_string(),
    }
}

fn retired_identities(record: Option<&StateRecord>) -> Vec<String> {
    record
        .map(|r| r.retired.iter().map(|old| old.live_identity.clone()).collect())
        .unwrap_or_default()
}

fn transition(name: &str, status: Status) {
    log::debug!("{name}: {status}");
}

/// First prerequisite that did not finish, reported by its root cause
fn blocker<'n>(
    finished: &BTreeMap<String, NodeReport>,
    prerequisites: impl Iterator<Item = &'n str>,
) -> Option<String> {
    prerequisites
        .filter_map(|name| match finished.get(name) {
            Some(report) if report.is_done() => None,
            Some(NodeReport {
                detail: Some(Detail::Blocked { by }),
                ..
            }) => Some(by.clone()),
            _ => Some(name.to_string()),
        })
        .next()
}
