//! Manifest store: read-only provider of the named template groups.
//!
//! Templates are multi-document YAML blobs with `${VAR}` / `$VAR`
//! substitution points. The embedded copies are compiled in;
//! `directory::DirectoryManifests` lets an operator override them on disk.

pub mod directory;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

pub use directory::DirectoryManifests;

/// The three template groups a platform is converged from, in apply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestGroup {
    ApiResources,
    Networking,
    GatewayAuthPolicy,
}

impl ManifestGroup {
    pub const ALL: [ManifestGroup; 3] = [
        ManifestGroup::ApiResources,
        ManifestGroup::Networking,
        ManifestGroup::GatewayAuthPolicy,
    ];

    /// Path of the template relative to the manifest root.
    pub fn path(&self) -> &'static str {
        match self {
            ManifestGroup::ApiResources => "maas-api/resources.yaml",
            ManifestGroup::Networking => "networking/resources.yaml",
            ManifestGroup::GatewayAuthPolicy => "policies/gateway-auth-policy.yaml",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManifestGroup::ApiResources => "maas-api",
            ManifestGroup::Networking => "networking",
            ManifestGroup::GatewayAuthPolicy => "gateway-auth-policy",
        }
    }
}

impl fmt::Display for ManifestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ManifestGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManifestGroup::ALL
            .into_iter()
            .find(|g| g.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = ManifestGroup::ALL.iter().map(|g| g.name()).collect();
                format!("unknown manifest group '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Read-only source of template text.
pub trait ManifestStore: Send + Sync {
    /// Return the template for `group`. A missing group is an
    /// `EngineError::MissingManifest`, which aborts the caller.
    fn load(&self, group: ManifestGroup) -> Result<Cow<'_, str>, EngineError>;
}

// ---------------------------------------------------------------------------
// Embedded templates
// ---------------------------------------------------------------------------

/// Templates compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedManifests;

impl EmbeddedManifests {
    pub fn text(group: ManifestGroup) -> &'static str {
        match group {
            ManifestGroup::ApiResources => include_str!("../../manifests/maas-api/resources.yaml"),
            ManifestGroup::Networking => include_str!("../../manifests/networking/resources.yaml"),
            ManifestGroup::GatewayAuthPolicy => {
                include_str!("../../manifests/policies/gateway-auth-policy.yaml")
            }
        }
    }
}

impl ManifestStore for EmbeddedManifests {
    fn load(&self, group: ManifestGroup) -> Result<Cow<'_, str>, EngineError> {
        Ok(Cow::Borrowed(EmbeddedManifests::text(group)))
    }
}

// ---------------------------------------------------------------------------
// In-memory templates
// ---------------------------------------------------------------------------

/// Templates held in memory. Groups that were never inserted are missing.
#[derive(Debug, Clone, Default)]
pub struct StaticManifests {
    entries: HashMap<ManifestGroup, String>,
}

impl StaticManifests {
    pub fn new() -> Self {
        StaticManifests::default()
    }

    pub fn with(mut self, group: ManifestGroup, text: &str) -> Self {
        self.entries.insert(group, text.to_string());
        self
    }
}

impl ManifestStore for StaticManifests {
    fn load(&self, group: ManifestGroup) -> Result<Cow<'_, str>, EngineError> {
        self.entries
            .get(&group)
            .map(|s| Cow::Borrowed(s.as_str()))
            .ok_or(EngineError::MissingManifest(group))
    }
}
