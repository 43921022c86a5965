//! Declaration file (`keel.toml`) loading
//!
//! The file has four top-level tables:
//!
//! - `[settings]` - concurrency, retry policy, timeout, state location
//! - `[types.<type>]` - which provider adapter handles a resource type
//! - `[[resources]]` - the declared resources
//! - `[outputs]` - stack outputs resolved after a run
//!
//! Input values are plain TOML, except that a table with a string `ref`
//! key is a reference to another resource's output:
//!
//! ```toml
//! image_name = { ref = "app-ecr.repository_url", template = "{}:latest" }
//! ```
//!
//! Its `field`, `index`, `template` and `to_json` keys are applied in that
//! order when the reference is resolved.

use converge::{
    Declaration, Deferred, ExecuteOptions, OutputRef, PropertyValue, ReplaceStrategy,
    ResourceSpec, RetryConfig, Transform,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default declaration file name
pub const DEFAULT_FILE: &str = "keel.toml";

/// Keys of a reference table
const REF_KEYS: [&str; 5] = ["ref", "field", "index", "template", "to_json"];

/// Errors raised while loading a declaration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid declaration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{location}: invalid reference `{reference}` (expected `resource.property`)")]
    BadReference { location: String, reference: String },

    #[error("{location}: {message}")]
    BadValue { location: String, message: String },

    #[error("invalid setting `{key}`: {message}")]
    BadSetting { key: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// File Structures
// ============================================================================

/// Parsed declaration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub types: BTreeMap<String, TypeConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default)]
    pub outputs: BTreeMap<String, toml::Value>,
}

/// `[settings]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Project name; picks the default state file
    pub project: Option<String>,
    /// Resources provisioned concurrently within a batch
    pub jobs: Option<usize>,
    /// State database path, relative to the declaration file
    pub state: Option<String>,
    /// Cancel a run after this many seconds
    pub timeout_secs: Option<u64>,
    /// Adapter for resource types without a `[types]` entry
    pub default_provider: Option<ProviderKind>,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// `[settings.retry]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub max_delay_ms: Option<u64>,
}

/// Provider adapters available from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// In-process adapter that mints identities itself
    #[default]
    Simulated,
    /// Shells out to user supplied commands
    Command,
}

/// `[types.<type>]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Inputs whose change forces replacement
    #[serde(default)]
    pub replace_on: Vec<String>,
    pub replace_strategy: Option<ReplaceStrategy>,
    /// Attribute templates reported by the simulated adapter
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Simulated provisioning latency
    pub delay_ms: Option<u64>,
    /// Shell commands run by the command adapter
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
    /// Extra environment for the commands
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Seconds a single command may run
    pub command_timeout_secs: Option<u64>,
}

/// `[[resources]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub replace_on_changes: Vec<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, toml::Value>,
}

// ============================================================================
// Loading
// ============================================================================

impl DeclarationFile {
    /// Read and parse a declaration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(
            "Loaded {} resources and {} types from {}",
            file.resources.len(),
            file.types.len(),
            path.display()
        );
        Ok(file)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Build the engine declaration
    pub fn declaration(&self) -> Result<Declaration> {
        let mut declaration = Declaration::new();
        for entry in &self.resources {
            declaration = declaration.resource(entry.spec()?);
        }
        for (key, value) in &self.outputs {
            let location = format!("outputs.{key}");
            declaration = declaration.output(key.clone(), property_value(&location, value)?);
        }
        Ok(declaration)
    }

    /// Engine options, with an optional override of `jobs`
    pub fn execute_options(&self, jobs: Option<usize>) -> Result<ExecuteOptions> {
        let defaults = ExecuteOptions::default();
        let jobs = jobs.or(self.settings.jobs).unwrap_or(defaults.jobs);
        if jobs == 0 {
            return Err(ConfigError::BadSetting {
                key: "jobs",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(ExecuteOptions {
            jobs,
            retry: self.settings.retry.config()?,
            timeout: self.settings.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Adapter configuration for a resource type
    pub fn type_config(&self, resource_type: &str) -> Option<&TypeConfig> {
        self.types.get(resource_type)
    }
}

impl RetrySettings {
    fn config(&self) -> Result<RetryConfig> {
        let defaults = RetryConfig::default();
        let config = RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self
                .base_delay_ms
                .map_or(defaults.base_delay, Duration::from_millis),
            backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
            max_delay: self
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
        };
        if config.max_attempts == 0 {
            return Err(ConfigError::BadSetting {
                key: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
            return Err(ConfigError::BadSetting {
                key: "retry.backoff_factor",
                message: format!("must be a number >= 1.0, got {}", config.backoff_factor),
            });
        }
        Ok(config)
    }
}

impl ResourceEntry {
    fn spec(&self) -> Result<ResourceSpec> {
        let mut spec = ResourceSpec::new(&self.name, &self.resource_type);
        for (key, value) in &self.inputs {
            let location = format!("resource `{}` input `{key}`", self.name);
            spec = spec.input(key.clone(), property_value(&location, value)?);
        }
        for dep in &self.depends_on {
            spec = spec.depends_on(dep.clone());
        }
        for key in &self.replace_on_changes {
            spec = spec.replace_on_changes(key.clone());
        }
        Ok(spec)
    }
}

// ============================================================================
// Values
// ============================================================================

/// Convert a TOML value into an input property
fn property_value(location: &str, value: &toml::Value) -> Result<PropertyValue> {
    let converted = match value {
        toml::Value::Table(table) => match table.get("ref") {
            Some(toml::Value::String(reference)) => {
                PropertyValue::Deferred(deferred(location, reference, table)?)
            }
            _ => PropertyValue::Object(
                table
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), property_value(&format!("{location}.{k}"), v)?)))
                    .collect::<Result<_>>()?,
            ),
        },
        toml::Value::Array(items) => PropertyValue::List(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| property_value(&format!("{location}.{i}"), v))
                .collect::<Result<_>>()?,
        ),
        scalar => PropertyValue::Literal(scalar_to_json(location, scalar)?),
    };
    Ok(converted.normalize())
}

fn deferred(location: &str, reference: &str, table: &toml::Table) -> Result<Deferred> {
    let bad_value = |message: String| ConfigError::BadValue {
        location: location.to_string(),
        message,
    };

    if let Some(key) = table.keys().find(|k| !REF_KEYS.contains(&k.as_str())) {
        return Err(bad_value(format!("unknown key `{key}` in reference")));
    }

    let source = OutputRef::parse(reference).ok_or_else(|| ConfigError::BadReference {
        location: location.to_string(),
        reference: reference.to_string(),
    })?;
    let mut deferred = Deferred::new(source.resource, source.property);

    if let Some(field) = table.get("field") {
        let field = field
            .as_str()
            .ok_or_else(|| bad_value("`field` must be a string".to_string()))?;
        deferred = deferred.then(Transform::Field(field.to_string()));
    }
    if let Some(index) = table.get("index") {
        let index = index
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| bad_value("`index` must be a non-negative integer".to_string()))?;
        deferred = deferred.then(Transform::Index(index));
    }
    if let Some(template) = table.get("template") {
        let template = template
            .as_str()
            .filter(|t| t.contains("{}"))
            .ok_or_else(|| bad_value("`template` must be a string containing `{}`".to_string()))?;
        deferred = deferred.then(Transform::Template(template.to_string()));
    }
    match table.get("to_json") {
        None | Some(toml::Value::Boolean(false)) => {}
        Some(toml::Value::Boolean(true)) => deferred = deferred.then(Transform::ToJson),
        Some(_) => return Err(bad_value("`to_json` must be a boolean".to_string())),
    }

    Ok(deferred)
}

fn scalar_to_json(location: &str, value: &toml::Value) -> Result<serde_json::Value> {
    Ok(match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| ConfigError::BadValue {
                location: location.to_string(),
                message: format!("{f} is not representable in JSON"),
            })?,
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            return Err(ConfigError::BadValue {
                location: location.to_string(),
                message: "expected a scalar".to_string(),
            });
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
