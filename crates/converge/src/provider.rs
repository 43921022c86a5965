//! Provider adapter contract
//!
//! A provider is the boundary to whatever actually owns the resources: a
//! cloud API, a local command, a test double. The engine only ever talks to
//! providers through [`ResourceProvider`], looked up per resource type in a
//! [`ProviderRegistry`].

use crate::context::CancelToken;
use crate::error::{Error, ProviderResult, Result};
use crate::graph::Graph;
use crate::types::{Attributes, Inputs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a provider classifies a change of inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffVerdict {
    /// Nothing the provider cares about changed
    NoChange,
    /// The live resource can be modified in place
    InPlaceUpdate,
    /// The live resource must be destroyed and recreated
    RequiresReplace,
}

/// Order of operations when replacing a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceStrategy {
    /// Delete the old resource, then create the new one
    #[default]
    DeleteBeforeCreate,
    /// Create the new resource first, then delete the old one
    CreateBeforeDelete,
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Provider assigned identity
    pub identity: String,
    /// Attributes of the new resource
    pub attributes: Attributes,
}

/// Per-call context handed to providers
#[derive(Debug, Clone, Copy)]
pub struct OpContext<'a> {
    /// Logical name of the resource
    pub resource: &'a str,
    /// Resource type
    pub resource_type: &'a str,
    /// Run cancellation; long operations should poll it
    pub cancel: &'a CancelToken,
    /// 1-indexed attempt number
    pub attempt: u32,
}

/// Operations a provider implements for its resource types
///
/// Errors carry their own retry classification; see
/// [`ProviderError`](crate::error::ProviderError).
pub trait ResourceProvider: Send + Sync {
    /// Create a resource from fully resolved inputs
    fn create(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> ProviderResult<Created>;

    /// Classify the change from `old` to `new` inputs
    ///
    /// The default treats any change as requiring replacement.
    fn diff(&self, _resource_type: &str, old: &Inputs, new: &Inputs) -> DiffVerdict {
        if old == new {
            DiffVerdict::NoChange
        } else {
            DiffVerdict::RequiresReplace
        }
    }

    /// Modify a live resource in place, returning its new attributes
    fn update(
        &self,
        ctx: &OpContext<'_>,
        identity: &str,
        old: &Inputs,
        new: &Inputs,
    ) -> ProviderResult<Attributes>;

    /// Destroy a live resource
    fn delete(&self, ctx: &OpContext<'_>, identity: &str, inputs: &Inputs) -> ProviderResult<()>;

    /// Replacement order for a resource type
    fn replace_strategy(&self, _resource_type: &str) -> ReplaceStrategy {
        ReplaceStrategy::DeleteBeforeCreate
    }
}

/// Maps resource types to providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ResourceProvider>>,
    fallback: Option<Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for one resource type
    pub fn register(
        mut self,
        resource_type: impl Into<String>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Self {
        self.providers.insert(resource_type.into(), provider);
        self
    }

    /// Provider used for types without an explicit registration
    pub fn with_fallback(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Look up the provider for a type
    pub fn get(&self, resource_type: &str) -> Option<&dyn ResourceProvider> {
        self.providers
            .get(resource_type)
            .or(self.fallback.as_ref())
            .map(|provider| &**provider)
    }

    /// Registered resource types, ordered
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Fail if any declared resource has a type nobody handles
    pub fn check(&self, graph: &Graph) -> Result<()> {
        match graph.specs().find(|spec| self.get(&spec.resource_type).is_none()) {
            Some(spec) => Err(Error::Plan {
                resource: spec.name.clone(),
                message: format!("no provider for resource type `{}`", spec.resource_type),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.providers.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
