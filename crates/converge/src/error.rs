//! Error types for provisioning runs.
//!
//! Errors fall in two groups. Pre-flight errors (`DuplicateResource`, `Cycle`,
//! `Plan`) are raised before any provider is called. Everything else happens
//! while a run is in progress: per-node errors (`Resolution`, `Provider`) are
//! recorded against a single resource, while `ConcurrentModification` and
//! `State` abort the run because the outcome can no longer be recorded. A
//! run hands those back as [`Error::Aborted`], carrying what it got done.

use crate::report::RunReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a provider failure for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Transient condition (throttling, timeouts, eventual consistency)
    Retryable,
    /// The request itself is wrong; retrying will not help
    Permanent,
    /// The operation was interrupted by run cancellation
    Cancelled,
}

impl ProviderErrorKind {
    /// Whether failures of this kind are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable)
    }

    /// Get a user-friendly description of this kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Retryable => "Transient provider failure",
            Self::Permanent => "Provider rejected the operation",
            Self::Cancelled => "Operation cancelled",
        }
    }
}

/// A failure raised by a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Retry classification declared by the provider
    pub kind: ProviderErrorKind,
    /// Provider supplied detail
    pub message: String,
}

impl ProviderError {
    /// A transient failure that should be retried with backoff.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Retryable,
            message: message.into(),
        }
    }

    /// A failure that marks the resource failed immediately.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// The operation stopped because the run was cancelled.
    pub fn cancelled() -> Self {
        Self {
            kind: ProviderErrorKind::Cancelled,
            message: "run cancelled".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::Cancelled)
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur while building, planning or reconciling a deployment.
#[derive(Debug, Error)]
pub enum Error {
    /// Two resources share a logical name
    #[error("duplicate resource name: {name}")]
    DuplicateResource {
        /// The repeated logical name
        name: String,
    },

    /// The dependency graph is not a DAG
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    Cycle {
        /// Resources on the smallest cycle, in dependency order
        cycle: Vec<String>,
    },

    /// A declaration cannot be planned (dangling reference, unknown resource type)
    #[error("cannot plan `{resource}`: {message}")]
    Plan {
        /// Resource whose declaration is at fault
        resource: String,
        /// What is wrong with it
        message: String,
    },

    /// A deferred value was read before its source resource was ready
    #[error("`{resource}` read `{source_ref}` before it was ready")]
    NotReady {
        /// Resource doing the read
        resource: String,
        /// The output reference that is not available yet
        source_ref: String,
    },

    /// A deferred value could not be turned into a literal
    #[error("cannot resolve `{resource}.{property}`: {message}")]
    Resolution {
        /// Resource owning the input
        resource: String,
        /// Input property path
        property: String,
        /// Description of the failure
        message: String,
    },

    /// A provider operation failed
    #[error("provider failed for `{resource}`: {source}")]
    Provider {
        /// Resource being provisioned
        resource: String,
        /// The provider failure
        #[source]
        source: ProviderError,
    },

    /// The state store was written by someone else since this run loaded it
    #[error(
        "state was modified concurrently (expected revision {expected}, found {found}); reload state and re-run"
    )]
    ConcurrentModification {
        /// Revision the run last observed
        expected: u64,
        /// Revision found in the store
        found: u64,
    },

    /// The state store failed to load or persist a record
    #[error("state store error: {0}")]
    State(String),

    /// A run stopped part way through
    #[error("run aborted: {source}")]
    Aborted {
        /// What stopped it
        #[source]
        source: Box<Error>,
        /// Every resource of the plan; those not attempted are cancelled
        report: Box<RunReport>,
    },

    /// Worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is raised before any side effect happens.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResource { .. } | Self::Cycle { .. } | Self::Plan { .. }
        )
    }

    /// Whether this error aborts the whole run rather than a single resource.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. }
                | Self::State(_)
                | Self::WorkerPool(_)
                | Self::Aborted { .. }
        ) || self.is_preflight()
    }

    /// The error that stopped the run, looking through [`Error::Aborted`]
    pub fn cause(&self) -> &Error {
        match self {
            Self::Aborted { source, .. } => source.cause(),
            other => other,
        }
    }

    /// What an aborted run got done before it stopped
    pub fn partial_report(&self) -> Option<&RunReport> {
        match self {
            Self::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Whether the failure is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { source, .. } if source.is_retryable())
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_kinds() {
        assert!(ProviderError::retryable("throttled").is_retryable());
        assert!(!ProviderError::permanent("bad request").is_retryable());
        assert!(ProviderError::cancelled().is_cancelled());
        assert!(!ProviderError::cancelled().is_retryable());
    }

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = Error::Cycle {
            cycle: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_self_cycle_message() {
        let err = Error::Cycle {
            cycle: vec!["a".to_string()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> a");
    }

    #[test]
    fn test_aborted_exposes_cause_and_report() {
        let err = Error::Aborted {
            source: Box::new(Error::ConcurrentModification {
                expected: 2,
                found: 3,
            }),
            report: Box::default(),
        };
        assert!(err.is_fatal());
        assert!(matches!(err.cause(), Error::ConcurrentModification { found: 3, .. }));
        assert!(err.partial_report().is_some());
        assert!(err.to_string().starts_with("run aborted: state was modified concurrently"));
    }

    #[test]
    fn test_error_classification() {
        let plan = Error::Plan {
            resource: "b".to_string(),
            message: "references unknown resource `a`".to_string(),
        };
        assert!(plan.is_preflight());
        assert!(plan.is_fatal());

        let conflict = Error::ConcurrentModification {
            expected: 3,
            found: 4,
        };
        assert!(!conflict.is_preflight());
        assert!(conflict.is_fatal());

        let provider = Error::Provider {
            resource: "a".to_string(),
            source: ProviderError::retryable("timeout"),
        };
        assert!(provider.is_retryable());
        assert!(!provider.is_fatal());
    }
}
