//! Schemaless object model.
//!
//! Rendered manifests and aggregation artifacts are handled as generic
//! structured documents. `DynamicObject` wraps a `serde_json::Value` that is
//! known to be a mapping carrying `apiVersion`, `kind` and `metadata.name`,
//! and offers the handful of accessors the engine needs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::meta::OwnerReference;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Namespace + name. An empty namespace denotes a cluster-scoped object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        ObjectKey {
            namespace: String::new(),
            name: name.into(),
        }
    }

    /// Parse `namespace/name` or a bare `name`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (namespace, name) = match s.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => ("", s),
        };
        if name.is_empty() || name.contains('/') {
            return Err(format!("invalid object key '{}'", s));
        }
        Ok(ObjectKey::namespaced(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Full identity of a managed object: (group, version, kind, namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ObjectRef {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// API group; empty for the core group (`v1`).
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key())
    }
}

// ---------------------------------------------------------------------------
// DynamicObject
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DynamicObject(Map<String, Value>);

impl TryFrom<Value> for DynamicObject {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        DynamicObject::from_value(value)
    }
}

impl From<DynamicObject> for Value {
    fn from(obj: DynamicObject) -> Self {
        Value::Object(obj.0)
    }
}

impl DynamicObject {
    /// Validate that `value` looks like a cluster object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Err("empty document".into()),
            other => return Err(format!("expected a mapping, found {}", type_name(&other))),
        };
        let obj = DynamicObject(map);
        if obj.api_version().is_empty() {
            return Err("missing apiVersion".into());
        }
        if obj.kind().is_empty() {
            return Err("missing kind".into());
        }
        if obj.name().is_empty() {
            return Err(format!("{} without metadata.name", obj.kind()));
        }
        Ok(obj)
    }

    /// Build an object from its identity with empty metadata otherwise.
    pub fn new(object: &ObjectRef) -> Self {
        let mut metadata = Map::new();
        metadata.insert("name".into(), Value::String(object.name.clone()));
        if !object.namespace.is_empty() {
            metadata.insert("namespace".into(), Value::String(object.namespace.clone()));
        }
        let mut map = Map::new();
        map.insert("apiVersion".into(), Value::String(object.api_version.clone()));
        map.insert("kind".into(), Value::String(object.kind.clone()));
        map.insert("metadata".into(), Value::Object(metadata));
        DynamicObject(map)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn api_version(&self) -> &str {
        self.0.get("apiVersion").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.0.get("kind").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.meta_str("name")
    }

    pub fn namespace(&self) -> &str {
        self.meta_str("namespace")
    }

    pub fn resource_version(&self) -> Option<&str> {
        let rv = self.meta_str("resourceVersion");
        if rv.is_empty() {
            None
        } else {
            Some(rv)
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.api_version(), self.kind(), self.namespace(), self.name())
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(self.namespace(), self.name())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Walk a path of mapping keys, e.g. `["spec", "domain"]`.
    pub fn pointer(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        let labels = self
            .metadata_mut()
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !labels.is_object() {
            *labels = Value::Object(Map::new());
        }
        if let Value::Object(labels) = labels {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.metadata()
            .and_then(|m| m.get("ownerReferences"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Install `owner` as the controlling owner, replacing any earlier
    /// controller reference and keeping non-controller references.
    pub fn set_controller_reference(&mut self, owner: &OwnerReference) {
        let mut refs: Vec<OwnerReference> = self
            .owner_references()
            .into_iter()
            .filter(|r| r.uid != owner.uid && !r.controller.unwrap_or(false))
            .collect();
        refs.push(owner.clone());
        let value = serde_json::to_value(&refs).unwrap_or(Value::Array(Vec::new()));
        self.metadata_mut().insert("ownerReferences".into(), value);
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".into(), Value::String(namespace.to_string()));
    }

    pub fn set_resource_version(&mut self, rv: &str) {
        self.metadata_mut()
            .insert("resourceVersion".into(), Value::String(rv.to_string()));
    }

    pub fn set_meta(&mut self, field: &str, value: Value) {
        self.metadata_mut().insert(field.to_string(), value);
    }

    pub fn remove_meta(&mut self, field: &str) -> Option<Value> {
        self.metadata_mut().remove(field)
    }

    /// The object with server-managed metadata and status removed, for
    /// comparing a desired object against what the store holds.
    pub fn comparable(&self) -> Value {
        let mut copy = self.clone();
        copy.remove("status");
        for field in SERVER_MANAGED_METADATA {
            copy.remove_meta(field);
        }
        copy.into_value()
    }

    fn meta_str(&self, field: &str) -> &str {
        self.metadata()
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just normalized to a mapping"),
        }
    }
}

const SERVER_MANAGED_METADATA: [&str; 5] = [
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
];

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
