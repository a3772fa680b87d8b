//! `Tier`: a named access tier pointing at one platform.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::meta::ObjectMeta;
use crate::types::object::{DynamicObject, ObjectKey, ObjectRef};
use crate::types::platform::TierLimit;

pub const API_VERSION: &str = "myapp.io.odh.maas/v1alpha1";
pub const KIND: &str = "Tier";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TierSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSpec {
    #[serde(default)]
    pub target_ref: TargetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<TierLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_rate_limits: Option<TierLimit>,
    /// Models this tier grants access to. Empty means all models.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl Tier {
    pub fn object_ref(key: &ObjectKey) -> ObjectRef {
        ObjectRef::new(API_VERSION, KIND, key.namespace.clone(), key.name.clone())
    }

    pub fn from_object(obj: &DynamicObject) -> Result<Self, EngineError> {
        serde_json::from_value(obj.as_value()).map_err(|source| EngineError::Decode {
            kind: KIND,
            key: obj.key().to_string(),
            source,
        })
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    /// Name used in every derived artifact. Falls back to a label built from
    /// `generateName` when the object has no explicit name. Tiers decoded
    /// from the store always carry a name, so the fallback only applies to
    /// values built directly.
    pub fn tier_name(&self) -> String {
        if self.metadata.name.is_empty() {
            format!("{}-tier", self.metadata.generate_name)
        } else {
            self.metadata.name.clone()
        }
    }

    /// The platform this tier points at; an empty namespace means the tier's own.
    pub fn target(&self) -> ObjectKey {
        let namespace = if self.spec.target_ref.namespace.is_empty() {
            self.metadata.namespace.clone()
        } else {
            self.spec.target_ref.namespace.clone()
        };
        ObjectKey::namespaced(namespace, self.spec.target_ref.name.clone())
    }

    pub fn targets(&self, platform: &ObjectKey) -> bool {
        &self.target() == platform
    }
}
