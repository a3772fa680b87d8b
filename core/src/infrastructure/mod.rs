//! Object store seam.
//!
//! The cluster's object storage is an external collaborator. The engine only
//! needs get/list/create/update plus a status write, expressed by the
//! `ObjectStore` trait. `memory::MemoryStore` is the in-process implementation
//! used by tests and the CLI.

pub mod memory;

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::object::{DynamicObject, ObjectRef};

/// Narrowing applied by [`ObjectStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Restrict to one namespace. `None` lists across all namespaces.
    pub namespace: Option<String>,
    /// Every label here must be present with the same value.
    pub labels: BTreeMap<String, String>,
}

impl ListFilter {
    pub fn all() -> Self {
        ListFilter::default()
    }

    pub fn in_namespace(namespace: &str) -> Self {
        ListFilter {
            namespace: Some(namespace.to_string()),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn matches(&self, obj: &DynamicObject) -> bool {
        if let Some(ns) = &self.namespace {
            if obj.namespace() != ns {
                return false;
            }
        }
        if self.labels.is_empty() {
            return true;
        }
        let labels = obj.labels();
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).map(|actual| actual == v).unwrap_or(false))
    }
}

/// Generic structured-object store.
///
/// Implementations must be safe to share between concurrent invocations;
/// the engine keeps no state of its own between calls.
pub trait ObjectStore: Send + Sync {
    /// Fetch one object by identity.
    fn get(&self, object: &ObjectRef) -> Result<DynamicObject, StoreError>;

    /// List objects of one kind.
    fn list(
        &self,
        api_version: &str,
        kind: &str,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    /// Create a new object. Fails with `AlreadyExists` if the identity is taken.
    fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace an existing object. A `metadata.resourceVersion` on `object`
    /// that does not match the stored one fails with `Conflict`.
    fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace only the status subresource.
    fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;
}

/// `get` with "not found" mapped to `None`.
pub fn get_optional(
    store: &dyn ObjectStore,
    object: &ObjectRef,
) -> Result<Option<DynamicObject>, StoreError> {
    match store.get(object) {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
