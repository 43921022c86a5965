//! Test doubles shared by the unit tests

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{Created, DiffVerdict, OpContext, ReplaceStrategy, ResourceProvider};
use crate::types::{Attributes, Inputs};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Hook = Arc<dyn Fn(&OpContext<'_>) + Send + Sync>;

/// Injected failure for one resource
struct Failure {
    error: ProviderError,
    /// Only this operation fails; `None` fails all of them
    op: Option<String>,
    /// Remaining failures; `None` fails forever
    times: Option<u32>,
}

/// Provider recording every call it receives
///
/// Identities are `<name>-<n>` with `n` counting creates. Attributes are a
/// single `arn` derived from the identity.
#[derive(Default)]
pub struct MockProvider {
    verdict: Option<DiffVerdict>,
    strategy: ReplaceStrategy,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, Failure>>,
    hooks: HashMap<String, Hook>,
    counter: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every diff with `verdict`
    pub fn with_verdict(mut self, verdict: DiffVerdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn with_strategy(mut self, strategy: ReplaceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Fail every operation on `resource`
    pub fn failing(self, resource: &str, error: ProviderError) -> Self {
        self.insert_failure(resource, None, error, None);
        self
    }

    /// Fail the first `times` operations on `resource`
    pub fn failing_times(self, resource: &str, error: ProviderError, times: u32) -> Self {
        self.insert_failure(resource, None, error, Some(times));
        self
    }

    /// Fail only `op` on `resource`, `times` times or forever
    pub fn failing_on(
        self,
        op: &str,
        resource: &str,
        error: ProviderError,
        times: Option<u32>,
    ) -> Self {
        self.insert_failure(resource, Some(op), error, times);
        self
    }

    /// Run `hook` at the start of every operation on `resource`
    pub fn with_hook(
        mut self,
        resource: &str,
        hook: impl Fn(&OpContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(resource.to_string(), Arc::new(hook));
        self
    }

    /// Calls made so far, as `"<op> <resource>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of one kind, in order
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&format!("{op} ")).map(str::to_string))
            .collect()
    }

    fn insert_failure(
        &self,
        resource: &str,
        op: Option<&str>,
        error: ProviderError,
        times: Option<u32>,
    ) {
        self.failures.lock().unwrap().insert(
            resource.to_string(),
            Failure {
                error,
                op: op.map(str::to_string),
                times,
            },
        );
    }

    fn enter(&self, op: &str, ctx: &OpContext<'_>) -> ProviderResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{op} {}", ctx.resource));
        if let Some(hook) = self.hooks.get(ctx.resource) {
            hook(ctx);
        }

        let mut failures = self.failures.lock().unwrap();
        let Some(failure) = failures.get_mut(ctx.resource) else {
            return Ok(());
        };
        if failure.op.as_deref().is_some_and(|only| only != op) {
            return Ok(());
        }
        match failure.times {
            None => Err(failure.error.clone()),
            Some(0) => Ok(()),
            Some(ref mut n) => {
                *n -= 1;
                Err(failure.error.clone())
            }
        }
    }
}

impl ResourceProvider for MockProvider {
    fn create(&self, ctx: &OpContext<'_>, _inputs: &Inputs) -> ProviderResult<Created> {
        self.enter("create", ctx)?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = format!("{}-{n}", ctx.resource);
        Ok(Created {
            attributes: Attributes::from([("arn".to_string(), json!(format!("arn:mock:{identity}")))]),
            identity,
        })
    }

    fn diff(&self, _resource_type: &str, old: &Inputs, new: &Inputs) -> DiffVerdict {
        match self.verdict {
            Some(verdict) => verdict,
            None if old == new => DiffVerdict::NoChange,
            None => DiffVerdict::RequiresReplace,
        }
    }

    fn update(
        &self,
        ctx: &OpContext<'_>,
        identity: &str,
        _old: &Inputs,
        _new: &Inputs,
    ) -> ProviderResult<Attributes> {
        self.enter("update", ctx)?;
        Ok(Attributes::from([("arn".to_string(), json!(format!("arn:mock:{identity}")))]))
    }

    fn delete(&self, ctx: &OpContext<'_>, _identity: &str, _inputs: &Inputs) -> ProviderResult<()> {
        self.enter("delete", ctx)
    }

    fn replace_strategy(&self, _resource_type: &str) -> ReplaceStrategy {
        self.strategy
    }
}
