//! Core types for provisioning runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Fully resolved input properties of a resource
pub type Inputs = BTreeMap<String, serde_json::Value>;

/// Attributes reported by a provider for a live resource
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Lifecycle status of a resource node during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for its dependencies
    Pending,
    /// Deferred inputs are being resolved
    Resolving,
    /// Resolved inputs are compared against the recorded state
    Diffing,
    /// Nothing to do
    NoOp,
    Creating,
    Updating,
    Replacing,
    Deleting,
    /// Converged
    Ready,
    /// A provider or resolution error stopped this node
    Failed,
    /// The run was cancelled before this node finished
    Cancelled,
}

impl Status {
    /// Whether the node will not change status again during this run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Diffing => "diffing",
            Self::NoOp => "no-op",
            Self::Creating => "creating",
            Self::Updating => "updating",
            Self::Replacing => "replacing",
            Self::Deleting => "deleting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Operation decided for a node after diffing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Create,
    Update,
    Replace,
    Delete,
}

impl Action {
    /// The in-flight status a node holds while this action runs
    pub fn status(&self) -> Status {
        match self {
            Self::NoOp => Status::NoOp,
            Self::Create => Status::Creating,
            Self::Update => Status::Updating,
            Self::Replace => Status::Replacing,
            Self::Delete => Status::Deleting,
        }
    }

    /// Check if the action changes live state
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }

    /// Short marker used in plan listings
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Configuration for retry behavior on transient provider errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for a reconciliation run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of resources provisioned concurrently within a batch
    pub jobs: usize,
    /// Backoff policy for retryable provider errors
    pub retry: RetryConfig,
    /// Cancel the run once this much time has passed
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            retry: RetryConfig::default(),
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_backoff() {
        let config = RetryConfig::new(5, Duration::from_secs(1), 2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(10),
            backoff_factor: 10.0,
            max_delay: Duration::from_secs(30),
        };
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(30));
    }

    #[test]
    fn test_action_status() {
        assert_eq!(Action::Create.status(), Status::Creating);
        assert_eq!(Action::Delete.status(), Status::Deleting);
        assert!(!Action::NoOp.is_change());
        assert!(Action::Replace.is_change());
    }

    #[test]
    fn test_terminal_status() {
        assert!(Status::Ready.is_terminal());
        assert!(Status::Cancelled.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Diffing.is_terminal());
    }
}
