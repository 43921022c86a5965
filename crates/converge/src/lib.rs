//! # Converge
//!
//! A dependency-graph-driven resource provisioning engine.
//!
//! This crate takes a set of declared resources, some of whose inputs are
//! outputs of other resources that do not exist yet, and converges live
//! state toward them: it builds a dependency graph, orders it into batches,
//! resolves deferred values as their sources become ready, and calls
//! providers to create, update, replace, or delete resources.
//!
//! ## Core Concepts
//!
//! - **ResourceSpec**: desired state of one resource (type, name, inputs)
//! - **PropertyValue**: an input that is either a literal or a [`Deferred`]
//!   output of another resource, optionally transformed
//! - **Graph**: validated dependency graph; rejects duplicates and cycles
//! - **Plan**: batches safe to apply concurrently, plus trailing deletions
//! - **StateStore**: durable record of what exists, with optimistic concurrency
//! - **Reconciler**: walks the plan and drives providers
//!
//! ## Example
//!
//! ```ignore
//! use converge::{
//!     Declaration, Deferred, MemoryStore, NoProgress, ProviderRegistry, Reconciler,
//!     ResourceSpec, Transform,
//! };
//! use std::sync::Arc;
//!
//! let declaration = Declaration::new()
//!     .resource(ResourceSpec::new("app-ecr", "container_registry"))
//!     .resource(
//!         ResourceSpec::new("app-image", "container_image").input(
//!             "image_name",
//!             Deferred::new("app-ecr", "repository_url")
//!                 .then(Transform::Template("{}:latest".into())),
//!         ),
//!     )
//!     .output("image", Deferred::new("app-image", "image_name"));
//!
//! let registry = ProviderRegistry::new().with_fallback(Arc::new(MyCloud::new()));
//! let store = MemoryStore::new();
//! let report = Reconciler::new(&registry, &store).run(&declaration, &mut NoProgress)?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`ResourceProvider`]: creates, diffs, updates and deletes resources
//! - [`StateStore`]: persists records
//! - [`ProgressCallback`]: receives progress updates
//! - [`RetryCallback`]: hears about retried provider calls
//!
//! This allows the crate to be used without hard dependencies on a cloud
//! SDK, a database, or a terminal UI.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod report;
pub mod resolve;
pub mod resource;
pub mod retry;
pub mod state;
pub mod types;
pub mod value;

#[cfg(test)]
mod testkit;

// Re-export main types at crate root
pub use context::{CancelToken, NoProgress, ProgressCallback};
pub use diff::{Decision, DiffSummary, changed_properties, decide, inputs_hash};
pub use error::{Error, ProviderError, ProviderErrorKind, ProviderResult, Result};
pub use executor::{Preview, PreviewEntry, Reconciler};
pub use graph::{DanglingRef, DanglingVia, Graph};
pub use planner::{Plan, plan, schedule_deletions};
pub use provider::{
    Created, DiffVerdict, OpContext, ProviderRegistry, ReplaceStrategy, ResourceProvider,
};
pub use report::{Detail, NodeReport, RunReport, RunSummary};
pub use resolve::Resolver;
pub use resource::{Declaration, ResourceSpec};
pub use retry::{LogCallback, NoCallback, RetryCallback, with_retry};
pub use state::{
    MemoryStore, RECORD_FORMAT, Retired, Revision, StateRecord, StateSession, StateSnapshot,
    StateStore, outputs_of,
};
pub use types::{Action, Attributes, ExecuteOptions, Inputs, RetryConfig, Status};
pub use value::{Deferred, OutputRef, PropertyValue, Transform, UNKNOWN_VALUE, lookup_path};
