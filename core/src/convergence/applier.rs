//! Convergence applier: create/update/skip for one managed object.
//!
//! The applier owns the ownership rules: an object in its owner's namespace
//! gets a controller reference, anything else (other namespace, cluster
//! scope) gets descriptive labels. Updates are whole-object replaces carrying
//! the current `resourceVersion`; a stale version surfaces as an error and is
//! left to the next invocation.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::CancelToken;
use crate::error::EngineError;
use crate::infrastructure::{get_optional, ObjectStore};
use crate::types::meta::OwnerReference;
use crate::types::object::{DynamicObject, ObjectKey};
use crate::types::platform::MaasPlatform;

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "maas-operator";
pub const LABEL_PLATFORM_NAME: &str = "maas.opendatahub.io/platform-name";
pub const LABEL_PLATFORM_NAMESPACE: &str = "maas.opendatahub.io/platform-namespace";

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// The resource on whose behalf objects are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Owner {
    pub key: ObjectKey,
    pub reference: OwnerReference,
}

impl Owner {
    pub fn new(key: ObjectKey, reference: OwnerReference) -> Self {
        Owner { key, reference }
    }
}

impl From<&MaasPlatform> for Owner {
    fn from(platform: &MaasPlatform) -> Self {
        Owner::new(platform.key(), platform.owner_reference())
    }
}

// ---------------------------------------------------------------------------
// Options and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    skip: BTreeSet<(String, String)>,
    immutable_kinds: BTreeSet<String>,
    owner_links: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions {
            skip: BTreeSet::new(),
            immutable_kinds: BTreeSet::from(["PersistentVolumeClaim".to_string()]),
            owner_links: true,
        }
    }
}

impl ApplyOptions {
    pub fn new() -> Self {
        ApplyOptions::default()
    }

    /// Never touch the object of `kind` named `name`.
    pub fn skip(mut self, kind: &str, name: &str) -> Self {
        self.skip.insert((kind.to_string(), name.to_string()));
        self
    }

    /// Replace the immutable-kind set.
    pub fn immutable_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Mark objects with labels only, even in the owner's namespace.
    pub fn without_owner_links(mut self) -> Self {
        self.owner_links = false;
        self
    }

    pub fn is_skipped(&self, kind: &str, name: &str) -> bool {
        self.skip.contains(&(kind.to_string(), name.to_string()))
    }

    pub fn is_immutable(&self, kind: &str) -> bool {
        self.immutable_kinds.contains(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SkipListed,
    Immutable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    /// Desired and current already agree; no write was issued.
    Unchanged,
    Skipped(SkipReason),
}

/// Per-pass tally of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub skipped: u32,
}

impl ApplySummary {
    pub fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Objects that exist in the desired shape after the pass.
    pub fn converged(&self) -> u32 {
        self.created + self.updated + self.unchanged
    }

    pub fn writes(&self) -> u32 {
        self.created + self.updated
    }

    pub fn merge(&mut self, other: &ApplySummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

// ---------------------------------------------------------------------------
// Applier
// ---------------------------------------------------------------------------

pub struct Applier<'a> {
    store: &'a dyn ObjectStore,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Applier<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Applier {
            store,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<&'a CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Converge one object.
    pub fn apply(
        &self,
        mut object: DynamicObject,
        owner: &Owner,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome, EngineError> {
        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }

        if options.is_skipped(object.kind(), object.name()) {
            debug!(kind = object.kind(), name = object.name(), "skip-listed, not applying");
            return Ok(ApplyOutcome::Skipped(SkipReason::SkipListed));
        }

        attach_ownership(&mut object, owner, options.owner_links);

        let target = object.object_ref();
        let current = get_optional(self.store, &target)
            .map_err(|source| EngineError::Apply { object: target.clone(), source })?;

        let current = match current {
            None => {
                self.store
                    .create(&object)
                    .map_err(|source| EngineError::Apply { object: target.clone(), source })?;
                info!(kind = %target.kind, key = %target.key(), "created");
                return Ok(ApplyOutcome::Created);
            }
            Some(current) => current,
        };

        if options.is_immutable(&target.kind) {
            debug!(kind = %target.kind, key = %target.key(), "exists and is immutable, not updating");
            return Ok(ApplyOutcome::Skipped(SkipReason::Immutable));
        }

        if object.comparable() == current.comparable() {
            debug!(kind = %target.kind, key = %target.key(), "unchanged");
            return Ok(ApplyOutcome::Unchanged);
        }

        if let Some(rv) = current.resource_version() {
            object.set_resource_version(rv);
        }
        self.store
            .update(&object)
            .map_err(|source| EngineError::Apply { object: target.clone(), source })?;
        info!(kind = %target.kind, key = %target.key(), "updated");
        Ok(ApplyOutcome::Updated)
    }

    /// Apply `objects` in order, stopping at the first error. Objects applied
    /// before the failure stay applied.
    pub fn apply_all(
        &self,
        objects: Vec<DynamicObject>,
        owner: &Owner,
        options: &ApplyOptions,
    ) -> Result<ApplySummary, EngineError> {
        let mut summary = ApplySummary::default();
        for object in objects {
            summary.record(self.apply(object, owner, options)?);
        }
        Ok(summary)
    }
}

/// Owner reference for same-namespace objects, descriptive labels otherwise.
fn attach_ownership(object: &mut DynamicObject, owner: &Owner, owner_links: bool) {
    let same_namespace = !object.namespace().is_empty() && object.namespace() == owner.key.namespace;
    if owner_links && same_namespace {
        object.set_controller_reference(&owner.reference);
        return;
    }
    if !same_namespace {
        debug!(
            kind = object.kind(),
            name = object.name(),
            namespace = object.namespace(),
            owner_namespace = %owner.key.namespace,
            "cross-namespace object, labelling instead of owner reference"
        );
    }
    object.set_label(LABEL_MANAGED_BY, MANAGED_BY);
    object.set_label(LABEL_PLATFORM_NAME, &owner.key.name);
    object.set_label(LABEL_PLATFORM_NAMESPACE, &owner.key.namespace);
}
