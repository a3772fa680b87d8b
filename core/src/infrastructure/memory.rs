//! In-memory object store.
//!
//! Behaves like the cluster store as far as the engine can observe: identities
//! are version-agnostic, every write bumps `metadata.resourceVersion`, updates
//! carrying a stale version fail with `Conflict`, and a no-op update leaves the
//! version untouched. Every call is journaled so tests can assert which writes
//! were (or were not) issued, and one-shot faults can be injected.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{ListFilter, ObjectStore};
use crate::error::StoreError;
use crate::types::object::{DynamicObject, ObjectRef};

/// Operation kinds, used for fault injection and journal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
}

/// One journaled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        matches!(self.op, StoreOp::Create | StoreOp::Update | StoreOp::UpdateStatus)
    }
}

struct Fault {
    op: StoreOp,
    kind: String,
    error: StoreError,
}

/// (group, kind, namespace, name)
type StoreKey = (String, String, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<StoreKey, DynamicObject>,
    last_version: u64,
    calls: Vec<StoreCall>,
    faults: Vec<Fault>,
}

impl Inner {
    fn record(&mut self, op: StoreOp, object: &ObjectRef) -> Result<(), StoreError> {
        self.calls.push(StoreCall {
            op,
            kind: object.kind.clone(),
            namespace: object.namespace.clone(),
            name: object.name.clone(),
        });
        let fault = self
            .faults
            .iter()
            .position(|f| f.op == op && f.kind == object.kind);
        match fault {
            Some(idx) => Err(self.faults.remove(idx).error),
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn stamp_new(&mut self, obj: &mut DynamicObject) {
        let version = self.next_version();
        obj.set_meta("uid", Value::String(format!("uid-{}", version)));
        obj.set_meta("generation", Value::from(1));
        obj.set_resource_version(&version);
    }

    /// Stamp a seeded object, keeping any identity it already carries.
    /// Numeric versions it brings along push the counter past them so fresh
    /// uids cannot collide with kept ones.
    fn stamp_seeded(&mut self, obj: &mut DynamicObject) {
        if let Some(seen) = obj.resource_version().and_then(|rv| rv.parse::<u64>().ok()) {
            self.last_version = self.last_version.max(seen);
        }
        let version = self.next_version();
        if obj.pointer(&["metadata", "uid"]).and_then(Value::as_str).map_or(true, str::is_empty) {
            obj.set_meta("uid", Value::String(format!("uid-{}", version)));
        }
        if obj.pointer(&["metadata", "generation"]).and_then(Value::as_i64).is_none() {
            obj.set_meta("generation", Value::from(1));
        }
        obj.set_resource_version(&version);
    }
}

fn store_key(object: &ObjectRef) -> StoreKey {
    (
        object.group().to_string(),
        object.kind.clone(),
        object.namespace.clone(),
        object.name.clone(),
    )
}

fn check_version(current: &DynamicObject, desired: &DynamicObject) -> Result<(), StoreError> {
    match desired.resource_version() {
        Some(rv) if Some(rv) != current.resource_version() => Err(StoreError::Conflict {
            object: desired.object_ref(),
            message: format!(
                "resourceVersion {} is stale (current {})",
                rv,
                current.resource_version().unwrap_or("none")
            ),
        }),
        _ => Ok(()),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryStore")
            .field("objects", &inner.objects.len())
            .field("last_version", &inner.last_version)
            .field("calls", &inner.calls.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Create a store pre-populated with `objects` (not journaled).
    pub fn with_objects(objects: impl IntoIterator<Item = DynamicObject>) -> Self {
        let store = MemoryStore::new();
        for obj in objects {
            store.insert(obj);
        }
        store
    }

    /// Seed or overwrite an object outside the journal, as an external actor
    /// would. An existing `uid` and `generation` are kept; only missing ones
    /// are stamped.
    pub fn insert(&self, mut obj: DynamicObject) -> DynamicObject {
        let mut inner = self.lock();
        inner.stamp_seeded(&mut obj);
        inner.objects.insert(store_key(&obj.object_ref()), obj.clone());
        obj
    }

    /// Delete an object outside the journal.
    pub fn remove(&self, object: &ObjectRef) -> Option<DynamicObject> {
        self.lock().objects.remove(&store_key(object))
    }

    /// Look up an object without journaling the read.
    pub fn peek(&self, object: &ObjectRef) -> Option<DynamicObject> {
        self.lock().objects.get(&store_key(object)).cloned()
    }

    /// All stored objects, ordered by (group, kind, namespace, name).
    pub fn objects(&self) -> Vec<DynamicObject> {
        self.lock().objects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Journaled create/update/status calls only.
    pub fn writes(&self) -> Vec<StoreCall> {
        self.lock().calls.iter().filter(|c| c.is_write()).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail the next `op` against an object of `kind` with `error`.
    pub fn fail_next(&self, op: StoreOp, kind: &str, error: StoreError) {
        self.lock().faults.push(Fault {
            op,
            kind: kind.to_string(),
            error,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, object: &ObjectRef) -> Result<DynamicObject, StoreError> {
        let mut inner = self.lock();
        inner.record(StoreOp::Get, object)?;
        inner
            .objects
            .get(&store_key(object))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(object.clone()))
    }

    fn list(
        &self,
        api_version: &str,
        kind: &str,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let probe = ObjectRef::new(
            api_version,
            kind,
            filter.namespace.clone().unwrap_or_default(),
            "",
        );
        let mut inner = self.lock();
        inner.record(StoreOp::List, &probe)?;
        let group = probe.group();
        Ok(inner
            .objects
            .iter()
            .filter(|((g, k, _, _), obj)| g == group && k == kind && filter.matches(obj))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let r = object.object_ref();
        let mut inner = self.lock();
        inner.record(StoreOp::Create, &r)?;
        let key = store_key(&r);
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(r));
        }
        let mut stored = object.clone();
        stored.remove_meta("resourceVersion");
        inner.stamp_new(&mut stored);
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }

    fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let r = object.object_ref();
        let mut inner = self.lock();
        inner.record(StoreOp::Update, &r)?;
        let key = store_key(&r);
        let current = match inner.objects.get(&key) {
            Some(current) => current.clone(),
            None => return Err(StoreError::NotFound(r)),
        };
        check_version(&current, object)?;

        let mut stored = object.clone();
        stored.remove("status");
        if let Some(status) = current.get("status") {
            stored.set("status", status.clone());
        }
        for field in ["uid", "creationTimestamp", "generation"] {
            stored.remove_meta(field);
            if let Some(v) = current.pointer(&["metadata", field]) {
                stored.set_meta(field, v.clone());
            }
        }
        if stored.comparable() == current.comparable() {
            return Ok(current);
        }
        if stored.get("spec") != current.get("spec") {
            let generation = current
                .pointer(&["metadata", "generation"])
                .and_then(Value::as_i64)
                .unwrap_or(0);
            stored.set_meta("generation", Value::from(generation + 1));
        }
        let version = inner.next_version();
        stored.set_resource_version(&version);
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }

    fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let r = object.object_ref();
        let mut inner = self.lock();
        inner.record(StoreOp::UpdateStatus, &r)?;
        let key = store_key(&r);
        let current = match inner.objects.get(&key) {
            Some(current) => current.clone(),
            None => return Err(StoreError::NotFound(r)),
        };
        check_version(&current, object)?;

        let mut stored = current.clone();
        match object.get("status") {
            Some(status) => stored.set("status", status.clone()),
            None => {
                stored.remove("status");
            }
        }
        if stored.get("status") == current.get("status") {
            return Ok(current);
        }
        let version = inner.next_version();
        stored.set_resource_version(&version);
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }
}
