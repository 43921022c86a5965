//! Property values: literals known at declaration time and deferred
//! references to outputs of other resources.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Placeholder rendered for values that are unknown until a resource is provisioned
pub const UNKNOWN_VALUE: &str = "<computed>";

/// Reference to an output property of another resource
///
/// The property may be a dotted path into structured outputs, e.g.
/// `aliases.0.name`. The reserved property `id` is the live identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    /// Logical name of the producing resource
    pub resource: String,
    /// Output property path
    pub property: String,
}

impl OutputRef {
    pub fn new(resource: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            property: property.into(),
        }
    }

    /// Parse `"resource.property.path"`
    ///
    /// Logical names cannot contain dots, so the resource name ends at the first one.
    pub fn parse(reference: &str) -> Option<Self> {
        let (resource, property) = reference.split_once('.')?;
        if resource.is_empty() || property.is_empty() {
            return None;
        }
        Some(Self::new(resource, property))
    }

    /// Look the property path up in a resource's outputs
    pub fn lookup<'v>(&self, outputs: &'v Value) -> Option<&'v Value> {
        lookup_path(outputs, &self.property)
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.property)
    }
}

/// Walk a dotted path through objects and arrays
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Signature of a caller supplied transform
pub type TransformFn = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

/// A pure function applied to a deferred value when it is resolved
#[derive(Clone)]
pub enum Transform {
    /// Select a key of an object
    Field(String),
    /// Select an element of an array
    Index(usize),
    /// Interpolate the value into a template at `{}`
    Template(String),
    /// Serialize the value into a JSON string
    ToJson,
    /// Caller supplied function
    Custom {
        name: String,
        func: Arc<TransformFn>,
    },
}

impl Transform {
    /// Wrap a closure as a named transform
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Apply the transform
    pub fn apply(&self, value: &Value) -> Result<Value, String> {
        match self {
            Self::Field(key) => value
                .get(key.as_str())
                .cloned()
                .ok_or_else(|| format!("expected an object with field `{key}`, got {}", kind(value))),
            Self::Index(index) => value
                .get(*index)
                .cloned()
                .ok_or_else(|| format!("expected an array with index {index}, got {}", kind(value))),
            Self::Template(template) => {
                if !template.contains("{}") {
                    return Err(format!("template `{template}` has no `{{}}` placeholder"));
                }
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => return Err("cannot interpolate null".to_string()),
                    other => other.to_string(),
                };
                Ok(Value::String(template.replace("{}", &rendered)))
            }
            Self::ToJson => serde_json::to_string(value)
                .map(Value::String)
                .map_err(|e| e.to_string()),
            Self::Custom { func, .. } => func(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(key) => write!(f, "field({key})"),
            Self::Index(index) => write!(f, "index({index})"),
            Self::Template(template) => write!(f, "template({template:?})"),
            Self::ToJson => f.write_str("to_json"),
            Self::Custom { name, .. } => write!(f, "{name}"),
        }
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Field(a), Self::Field(b)) => a == b,
            (Self::Index(a), Self::Index(b)) => a == b,
            (Self::Template(a), Self::Template(b)) => a == b,
            (Self::ToJson, Self::ToJson) => true,
            (Self::Custom { name: a, .. }, Self::Custom { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An output of another resource, unknown until that resource is provisioned
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    /// Where the value comes from
    pub source: OutputRef,
    /// Transforms applied in order at resolution time
    pub transforms: Vec<Transform>,
}

impl Deferred {
    pub fn new(resource: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            source: OutputRef::new(resource, property),
            transforms: Vec::new(),
        }
    }

    /// Append a transform to the chain
    pub fn then(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Resolve against the source's outputs
    ///
    /// Errors are plain messages; the caller attributes them to a resource and property.
    pub fn resolve_from(&self, outputs: &Value) -> Result<Value, String> {
        let base = self
            .source
            .lookup(outputs)
            .cloned()
            .ok_or_else(|| format!("`{}` has no output `{}`", self.source.resource, self.source.property))?;
        self.transforms.iter().try_fold(base, |value, transform| {
            transform
                .apply(&value)
                .map_err(|e| format!("transform {transform:?} failed: {e}"))
        })
    }
}

/// A resource input property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Known at declaration time
    Literal(Value),
    /// Output of another resource
    Deferred(Deferred),
    /// Array containing deferred values
    List(Vec<PropertyValue>),
    /// Object containing deferred values
    Object(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// A literal value
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A reference to `resource`'s output `property`
    pub fn output(resource: impl Into<String>, property: impl Into<String>) -> Self {
        Self::Deferred(Deferred::new(resource, property))
    }

    /// Whether the value is fully known without provisioning anything
    pub fn is_known(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Deferred(_) => false,
            Self::List(items) => items.iter().all(Self::is_known),
            Self::Object(fields) => fields.values().all(Self::is_known),
        }
    }

    /// All output references contained in this value
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a OutputRef>) {
        match self {
            Self::Literal(_) => {}
            Self::Deferred(deferred) => refs.push(&deferred.source),
            Self::List(items) => items.iter().for_each(|item| item.collect_references(refs)),
            Self::Object(fields) => fields.values().for_each(|v| v.collect_references(refs)),
        }
    }

    /// Collapse structures that contain no deferred values into literals
    pub fn normalize(self) -> Self {
        match self {
            Self::List(items) => {
                let items: Vec<_> = items.into_iter().map(Self::normalize).collect();
                if items.iter().all(|i| matches!(i, Self::Literal(_))) {
                    Self::Literal(Value::Array(items.into_iter().map(Self::into_literal).collect()))
                } else {
                    Self::List(items)
                }
            }
            Self::Object(fields) => {
                let fields: BTreeMap<_, _> =
                    fields.into_iter().map(|(k, v)| (k, v.normalize())).collect();
                if fields.values().all(|v| matches!(v, Self::Literal(_))) {
                    Self::Literal(Value::Object(
                        fields.into_iter().map(|(k, v)| (k, v.into_literal())).collect(),
                    ))
                } else {
                    Self::Object(fields)
                }
            }
            other => other,
        }
    }

    fn into_literal(self) -> Value {
        match self {
            Self::Literal(value) => value,
            _ => Value::Null,
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<Deferred> for PropertyValue {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}
