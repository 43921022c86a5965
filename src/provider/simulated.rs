//! In-process provider adapter
//!
//! Nothing leaves the machine: identities are derived from the resource's
//! type, name and inputs, and attributes are rendered from the type's
//! `outputs` templates. Useful for rehearsing a declaration before it is
//! pointed at real adapters.

use anyhow::{Context as _, Result};
use converge::{
    Attributes, Created, DiffVerdict, Inputs, OpContext, ProviderError, ProviderResult,
    ReplaceStrategy, ResourceProvider, inputs_hash, lookup_path,
};
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

use crate::config::TypeConfig;

/// Length of the hash suffix in minted identities
const ID_HASH_LEN: usize = 12;

/// Provider that fabricates live resources
#[derive(Debug)]
pub struct SimulatedProvider {
    label: String,
    config: TypeConfig,
    placeholder: Regex,
}

impl SimulatedProvider {
    /// Create an adapter for `resource_type` (used only in log messages)
    pub fn new(resource_type: &str, config: TypeConfig) -> Result<Self> {
        let placeholder = Regex::new(r"\{(name|id|type|input\.[A-Za-z0-9_.\-]+)\}")
            .context("Failed to compile output template pattern")?;
        Ok(Self {
            label: resource_type.to_string(),
            config,
            placeholder,
        })
    }

    /// Stable identity for a resource with the given inputs
    pub fn identity(resource_type: &str, name: &str, inputs: &Inputs) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(resource_type.as_bytes());
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(inputs_hash(inputs).as_bytes());
        let hex = hasher.finalize().to_hex();
        format!("{resource_type}-{}", &hex[..ID_HASH_LEN])
    }

    /// Render the `outputs` templates
    fn attributes(
        &self,
        ctx: &OpContext<'_>,
        identity: &str,
        inputs: &Inputs,
    ) -> ProviderResult<Attributes> {
        let inputs_value = Value::Object(inputs.clone().into_iter().collect());
        let mut attributes = Attributes::new();

        for (key, template) in &self.config.outputs {
            let mut missing = None;
            let rendered = self.placeholder.replace_all(template, |caps: &regex::Captures<'_>| {
                match &caps[1] {
                    "name" => ctx.resource.to_string(),
                    "id" => identity.to_string(),
                    "type" => ctx.resource_type.to_string(),
                    other => {
                        let path = other.trim_start_matches("input.");
                        match lookup_path(&inputs_value, path) {
                            Some(Value::String(s)) => s.clone(),
                            Some(value) => value.to_string(),
                            None => {
                                missing.get_or_insert_with(|| path.to_string());
                                String::new()
                            }
                        }
                    }
                }
            });
            if let Some(path) = missing {
                return Err(ProviderError::permanent(format!(
                    "output `{key}` references missing input `{path}`"
                )));
            }
            attributes.insert(key.clone(), Value::String(rendered.into_owned()));
        }

        Ok(attributes)
    }

    /// Pretend to talk to something slow
    fn wait(&self, ctx: &OpContext<'_>) -> ProviderResult<()> {
        match self.config.delay_ms {
            Some(ms) if !ctx.cancel.sleep(Duration::from_millis(ms)) => {
                Err(ProviderError::cancelled())
            }
            _ => Ok(()),
        }
    }
}

impl ResourceProvider for SimulatedProvider {
    fn create(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> ProviderResult<Created> {
        self.wait(ctx)?;
        let identity = Self::identity(ctx.resource_type, ctx.resource, inputs);
        let attributes = self.attributes(ctx, &identity, inputs)?;
        log::debug!("[{}] minted {identity} for {}", self.label, ctx.resource);
        Ok(Created {
            identity,
            attributes,
        })
    }

    fn diff(&self, _resource_type: &str, old: &Inputs, new: &Inputs) -> DiffVerdict {
        super::classify(&self.config, old, new, true)
    }

    fn update(
        &self,
        ctx: &OpContext<'_>,
        identity: &str,
        _old: &Inputs,
        new: &Inputs,
    ) -> ProviderResult<Attributes> {
        self.wait(ctx)?;
        self.attributes(ctx, identity, new)
    }

    fn delete(&self, ctx: &OpContext<'_>, identity: &str, _inputs: &Inputs) -> ProviderResult<()> {
        self.wait(ctx)?;
        log::debug!("[{}] released {identity}", self.label);
        Ok(())
    }

    fn replace_strategy(&self, _resource_type: &str) -> ReplaceStrategy {
        self.config.replace_strategy.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::CancelToken;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn inputs(pairs: &[(&str, Value)]) -> Inputs {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    fn simulated(outputs: &[(&str, &str)]) -> SimulatedProvider {
        let config = TypeConfig {
            outputs: outputs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        };
        SimulatedProvider::new("bucket", config).unwrap()
    }

    fn ctx<'a>(cancel: &'a CancelToken) -> OpContext<'a> {
        OpContext {
            resource: "assets",
            resource_type: "bucket",
            cancel,
            attempt: 1,
        }
    }

    #[test]
    fn test_identity_is_stable() {
        let a = inputs(&[("region", json!("us-east-1"))]);
        let first = SimulatedProvider::identity("bucket", "assets", &a);
        assert_eq!(first, SimulatedProvider::identity("bucket", "assets", &a));
        assert!(first.starts_with("bucket-"));
        assert_eq!(first.len(), "bucket-".len() + ID_HASH_LEN);

        let b = inputs(&[("region", json!("eu-west-1"))]);
        assert_ne!(first, SimulatedProvider::identity("bucket", "assets", &b));
        assert_ne!(first, SimulatedProvider::identity("bucket", "logs", &a));
    }

    #[test]
    fn test_create_renders_outputs() {
        let provider = simulated(&[
            ("arn", "arn:keel:{type}:{name}/{id}"),
            ("url", "https://{input.domain}/{input.tags.0}"),
            ("port", "{input.port}"),
        ]);
        let cancel = CancelToken::new();
        let created = provider
            .create(
                &ctx(&cancel),
                &inputs(&[
                    ("domain", json!("example.com")),
                    ("tags", json!(["v1"])),
                    ("port", json!(8080)),
                ]),
            )
            .unwrap();

        assert_eq!(
            created.attributes["arn"],
            json!(format!("arn:keel:bucket:assets/{}", created.identity))
        );
        assert_eq!(created.attributes["url"], json!("https://example.com/v1"));
        assert_eq!(created.attributes["port"], json!("8080"));
    }

    #[test]
    fn test_missing_input_is_permanent() {
        let provider = simulated(&[("url", "https://{input.domain}")]);
        let cancel = CancelToken::new();
        let err = provider.create(&ctx(&cancel), &Inputs::new()).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message.contains("domain"));
    }

    #[test]
    fn test_update_keeps_identity() {
        let provider = simulated(&[("arn", "arn:{id}:{input.size}")]);
        let cancel = CancelToken::new();
        let attributes = provider
            .update(&ctx(&cancel), "bucket-1", &Inputs::new(), &inputs(&[("size", json!(2))]))
            .unwrap();
        assert_eq!(attributes["arn"], json!("arn:bucket-1:2"));
    }

    #[test]
    fn test_cancelled_while_waiting() {
        let config = TypeConfig {
            delay_ms: Some(10_000),
            ..Default::default()
        };
        let provider = SimulatedProvider::new("bucket", config).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = provider.delete(&ctx(&cancel), "bucket-1", &Inputs::new()).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_replace_strategy_from_config() {
        let config = TypeConfig {
            replace_strategy: Some(ReplaceStrategy::CreateBeforeDelete),
            ..Default::default()
        };
        let provider = SimulatedProvider::new("bucket", config).unwrap();
        assert_eq!(provider.replace_strategy("bucket"), ReplaceStrategy::CreateBeforeDelete);
        assert_eq!(
            simulated(&[]).replace_strategy("bucket"),
            ReplaceStrategy::DeleteBeforeCreate
        );
    }
}
