//! Deferred value resolution
//!
//! The [`Resolver`] holds the outputs of every resource that became ready
//! during a run and turns deferred inputs into literals. Resolution is
//! memoized per dependent resource and input path, so a value read twice in
//! one run is computed once and always yields the same literal.

use crate::error::{Error, Result};
use crate::resource::ResourceSpec;
use crate::state::StateRecord;
use crate::types::Inputs;
use crate::value::{Deferred, PropertyValue, UNKNOWN_VALUE};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError, RwLock};

/// Outputs of ready resources, shared by the node tasks of a run
#[derive(Debug, Default)]
pub struct Resolver {
    ready: RwLock<HashMap<String, Value>>,
    memo: Mutex<HashMap<(String, String), Value>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver that sees every recorded resource as ready
    pub fn from_records(records: &BTreeMap<String, StateRecord>) -> Self {
        let resolver = Self::new();
        for (name, record) in records {
            resolver.mark_ready(name, record.outputs());
        }
        resolver
    }

    /// Publish the outputs of a resource that reached Ready
    pub fn mark_ready(&self, name: &str, outputs: Value) {
        self.ready
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), outputs);
    }

    /// Check if a resource's outputs are available
    pub fn is_ready(&self, name: &str) -> bool {
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Outputs of a ready resource
    pub fn outputs_of(&self, name: &str) -> Option<Value> {
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Resolve one deferred value read by `dependent` at input path `property`
    pub fn resolve(&self, dependent: &str, property: &str, deferred: &Deferred) -> Result<Value> {
        let key = (dependent.to_string(), property.to_string());
        if let Some(value) = self
            .memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(value.clone());
        }

        let value = {
            let ready = self.ready.read().unwrap_or_else(PoisonError::into_inner);
            let outputs = ready
                .get(&deferred.source.resource)
                .ok_or_else(|| Error::NotReady {
                    resource: dependent.to_string(),
                    source_ref: deferred.source.to_string(),
                })?;
            deferred
                .resolve_from(outputs)
                .map_err(|message| Error::Resolution {
                    resource: dependent.to_string(),
                    property: property.to_string(),
                    message,
                })?
        };

        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());
        Ok(value)
    }

    /// Resolve a property value, descending into lists and objects
    pub fn resolve_value(&self, dependent: &str, path: &str, value: &PropertyValue) -> Result<Value> {
        match value {
            PropertyValue::Literal(literal) => Ok(literal.clone()),
            PropertyValue::Deferred(deferred) => self.resolve(dependent, path, deferred),
            PropertyValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve_value(dependent, &format!("{path}.{i}"), item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            PropertyValue::Object(fields) => fields
                .iter()
                .map(|(key, field)| {
                    self.resolve_value(dependent, &format!("{path}.{key}"), field)
                        .map(|v| (key.clone(), v))
                })
                .collect::<Result<serde_json::Map<_, _>>>()
                .map(Value::Object),
        }
    }

    /// Resolve every input of a resource
    pub fn resolve_inputs(&self, spec: &ResourceSpec) -> Result<Inputs> {
        spec.inputs
            .iter()
            .map(|(key, value)| {
                self.resolve_value(&spec.name, key, value)
                    .map(|v| (key.clone(), v))
            })
            .collect()
    }

    /// Resolve what is known ahead of a run
    ///
    /// Values whose source is not ready are replaced by [`UNKNOWN_VALUE`];
    /// the top-level keys affected are returned alongside.
    pub fn preview_inputs(&self, spec: &ResourceSpec) -> Result<(Inputs, BTreeSet<String>)> {
        let mut unknown = BTreeSet::new();
        let mut inputs = Inputs::new();
        for (key, value) in &spec.inputs {
            let (resolved, known) = self.preview_value(&spec.name, key, value)?;
            if !known {
                unknown.insert(key.clone());
            }
            inputs.insert(key.clone(), resolved);
        }
        Ok((inputs, unknown))
    }

    fn preview_value(&self, dependent: &str, path: &str, value: &PropertyValue) -> Result<(Value, bool)> {
        match value {
            PropertyValue::Literal(literal) => Ok((literal.clone(), true)),
            PropertyValue::Deferred(deferred) if !self.is_ready(&deferred.source.resource) => {
                Ok((Value::String(UNKNOWN_VALUE.to_string()), false))
            }
            PropertyValue::Deferred(deferred) => {
                self.resolve(dependent, path, deferred).map(|v| (v, true))
            }
            PropertyValue::List(items) => {
                let mut known = true;
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let (v, k) = self.preview_value(dependent, &format!("{path}.{i}"), item)?;
                    known &= k;
                    values.push(v);
                }
                Ok((Value::Array(values), known))
            }
            PropertyValue::Object(fields) => {
                let mut known = true;
                let mut map = serde_json::Map::new();
                for (key, field) in fields {
                    let (v, k) = self.preview_value(dependent, &format!("{path}.{key}"), field)?;
                    known &= k;
                    map.insert(key.clone(), v);
                }
                Ok((Value::Object(map), known))
            }
        }
    }

    /// Resolve exported stack outputs
    ///
    /// Outputs whose sources are not ready are skipped with a warning; with
    /// `placeholders` they are rendered as [`UNKNOWN_VALUE`] instead.
    pub fn resolve_outputs(
        &self,
        outputs: &BTreeMap<String, PropertyValue>,
        placeholders: bool,
    ) -> BTreeMap<String, Value> {
        let mut resolved = BTreeMap::new();
        for (key, value) in outputs {
            let result = if placeholders {
                self.preview_value(STACK, key, value).map(|(v, _)| v)
            } else {
                self.resolve_value(STACK, key, value)
            };
            match result {
                Ok(v) => {
                    resolved.insert(key.clone(), v);
                }
                Err(e) => log::warn!("Stack output `{key}` is unavailable: {e}"),
            }
        }
        resolved
    }
}

/// Pseudo resource name stack outputs are resolved under
const STACK: &str = "<stack>";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Transform;
    use serde_json::json;

    #[test]
    fn test_resolve_requires_ready_source() {
        let resolver = Resolver::new();
        let deferred = Deferred::new("a", "x");
        let err = resolver.resolve("b", "input", &deferred).unwrap_err();
        assert!(matches!(
            err,
            Error::NotReady { resource, source_ref } if resource == "b" && source_ref == "a.x"
        ));

        resolver.mark_ready("a", json!({"x": 5, "id": "a-1"}));
        assert_eq!(resolver.resolve("b", "input", &deferred).unwrap(), json!(5));
    }

    #[test]
    fn test_resolution_is_memoized() {
        let resolver = Resolver::new();
        resolver.mark_ready("a", json!({"x": 5}));
        let deferred = Deferred::new("a", "x");
        assert_eq!(resolver.resolve("b", "input", &deferred).unwrap(), json!(5));

        // A later publish does not change what this run already resolved.
        resolver.mark_ready("a", json!({"x": 6}));
        assert_eq!(resolver.resolve("b", "input", &deferred).unwrap(), json!(5));
        assert_eq!(resolver.resolve("c", "input", &deferred).unwrap(), json!(6));
    }

    #[test]
    fn test_transform_failure_attributed_to_dependent() {
        let resolver = Resolver::new();
        resolver.mark_ready("a", json!({"x": "not-a-number"}));
        let deferred = Deferred::new("a", "x").then(Transform::custom("double", |v| {
            v.as_i64()
                .map(|n| json!(n * 2))
                .ok_or_else(|| "not an integer".to_string())
        }));

        let spec = ResourceSpec::new("b", "t").input("y", deferred);
        match resolver.resolve_inputs(&spec).unwrap_err() {
            Error::Resolution {
                resource, property, ..
            } => {
                assert_eq!(resource, "b");
                assert_eq!(property, "y");
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_nested_structures() {
        let resolver = Resolver::new();
        resolver.mark_ready("sg", json!({"id": "sg-1"}));
        resolver.mark_ready("tg", json!({"arn": "arn:tg"}));

        let spec = ResourceSpec::new("listener", "t").input(
            "actions",
            PropertyValue::List(vec![PropertyValue::Object(BTreeMap::from([
                ("type".to_string(), PropertyValue::literal("forward")),
                ("target".to_string(), PropertyValue::output("tg", "arn")),
            ]))]),
        );
        let spec = spec.input(
            "security_groups",
            PropertyValue::List(vec![PropertyValue::output("sg", "id")]),
        );

        let inputs = resolver.resolve_inputs(&spec).unwrap();
        assert_eq!(
            inputs["actions"],
            json!([{"type": "forward", "target": "arn:tg"}])
        );
        assert_eq!(inputs["security_groups"], json!(["sg-1"]));
    }

    #[test]
    fn test_preview_marks_unknowns() {
        let resolver = Resolver::new();
        resolver.mark_ready("vpc", json!({"id": "vpc-1"}));
        let spec = ResourceSpec::new("sg", "t")
            .input("vpc_id", PropertyValue::output("vpc", "id"))
            .input("lb", PropertyValue::List(vec![PropertyValue::output("lb", "arn")]))
            .input("port", 443);

        let (inputs, unknown) = resolver.preview_inputs(&spec).unwrap();
        assert_eq!(inputs["vpc_id"], json!("vpc-1"));
        assert_eq!(inputs["lb"], json!([UNKNOWN_VALUE]));
        assert_eq!(inputs["port"], json!(443));
        assert_eq!(unknown.into_iter().collect::<Vec<_>>(), vec!["lb"]);
    }

    #[test]
    fn test_stack_outputs() {
        let resolver = Resolver::new();
        resolver.mark_ready("image", json!({"image_name": "repo:latest"}));
        let outputs = BTreeMap::from([
            ("image".to_string(), PropertyValue::output("image", "image_name")),
            ("lb".to_string(), PropertyValue::output("lb", "dns_name")),
        ]);

        let resolved = resolver.resolve_outputs(&outputs, false);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["image"], json!("repo:latest"));

        let previewed = resolver.resolve_outputs(&outputs, true);
        assert_eq!(previewed["lb"], json!(UNKNOWN_VALUE));
    }

    #[test]
    fn test_from_records() {
        let record = StateRecord::new(
            "t",
            "a-1",
            Inputs::from([("x".to_string(), json!(1))]),
            crate::types::Attributes::new(),
            BTreeSet::new(),
        );
        let resolver = Resolver::from_records(&BTreeMap::from([("a".to_string(), record)]));
        assert!(resolver.is_ready("a"));
        assert_eq!(resolver.outputs_of("a").unwrap()["id"], json!("a-1"));
    }
}
