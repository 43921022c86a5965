//! Resource declarations
//!
//! A [`ResourceSpec`] is one unit of desired state: a logical name, a
//! resource type handled by some provider, and input properties, some of
//! which may be [`Deferred`](crate::value::Deferred) outputs of other
//! resources. A [`Declaration`] is the full set of specs applied in one run
//! plus the stack outputs exported from it.

use crate::value::{OutputRef, PropertyValue};
use std::collections::{BTreeMap, BTreeSet};

/// Desired state of a single resource
///
/// # Example
///
/// ```
/// use converge::{Deferred, ResourceSpec, Transform};
///
/// let repo = ResourceSpec::new("app-ecr", "container_registry");
/// let image = ResourceSpec::new("app-image", "container_image")
///     .input("platform", "linux/amd64")
///     .input(
///         "image_name",
///         Deferred::new("app-ecr", "repository_url").then(Transform::Template("{}:latest".into())),
///     );
///
/// assert!(image.dependencies().contains("app-ecr"));
/// assert!(repo.dependencies().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    /// Unique name within a deployment
    pub name: String,
    /// Resource kind, used to pick a provider
    pub resource_type: String,
    /// Input properties
    pub inputs: BTreeMap<String, PropertyValue>,
    /// Resources that must be ready first even without a value reference
    pub depends_on: BTreeSet<String>,
    /// Inputs whose change forces destroy-and-recreate
    pub replace_on_changes: BTreeSet<String>,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            inputs: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            replace_on_changes: BTreeSet::new(),
        }
    }

    /// Set an input property
    pub fn input(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.inputs.insert(key.into(), value.into().normalize());
        self
    }

    /// Declare an explicit dependency
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    /// Force replacement when `key` changes
    pub fn replace_on_changes(mut self, key: impl Into<String>) -> Self {
        self.replace_on_changes.insert(key.into());
        self
    }

    /// Output references used by the inputs, with the input key they appear under
    pub fn references(&self) -> Vec<(&str, &OutputRef)> {
        self.inputs
            .iter()
            .flat_map(|(key, value)| {
                value
                    .references()
                    .into_iter()
                    .map(move |r| (key.as_str(), r))
            })
            .collect()
    }

    /// Every resource this one depends on, explicit or through a value
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.depends_on
            .iter()
            .cloned()
            .chain(self.references().into_iter().map(|(_, r)| r.resource.clone()))
            .collect()
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        format!("{} {}", self.resource_type, self.name)
    }
}

/// Everything applied in one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    /// Declared resources
    pub resources: Vec<ResourceSpec>,
    /// Exported stack outputs, resolved after the run
    pub outputs: BTreeMap<String, PropertyValue>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource
    pub fn resource(mut self, spec: ResourceSpec) -> Self {
        self.resources.push(spec);
        self
    }

    /// Export a stack output
    pub fn output(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.outputs.insert(key.into(), value.into().normalize());
        self
    }

    /// Total number of declared resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if nothing is declared
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
