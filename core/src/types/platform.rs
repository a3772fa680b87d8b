//! `MaasPlatform`: the top-level platform declaration.
//!
//! The engine reads the spec, writes the status subresource, and uses the
//! identity as the owner of everything rendered from the manifest groups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::meta::{ObjectMeta, OwnerReference};
use crate::types::object::{DynamicObject, ObjectKey, ObjectRef};

pub const API_VERSION: &str = "myapp.io.odh.maas/v1alpha1";
pub const KIND: &str = "MaasPlatform";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaasPlatform {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MaasPlatformSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MaasPlatformStatus>,
}

impl MaasPlatform {
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

    pub fn to_object(&self) -> Result<DynamicObject, EngineError> {
        let value = serde_json::to_value(self).map_err(|e| EngineError::Serialize {
            what: KIND,
            message: e.to_string(),
        })?;
        DynamicObject::from_value(value).map_err(EngineError::InvalidObject)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::namespaced(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference::controller(API_VERSION, KIND, &self.metadata.name, &self.metadata.uid)
    }

    /// The gateway authentication policy is deployed unless explicitly disabled.
    pub fn authentication_enabled(&self) -> bool {
        self.spec
            .policies
            .as_ref()
            .and_then(|p| p.authentication.as_ref())
            .map(|a| a.enabled)
            .unwrap_or(true)
    }

    pub fn tier_metadata(&self) -> Option<&TierMetadataConfig> {
        self.spec
            .policies
            .as_ref()
            .and_then(|p| p.authentication.as_ref())
            .and_then(|a| a.tier_metadata.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Spec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaasPlatformSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<PoliciesConfig>,
}

/// Gateway policy configuration: authentication, request and token rate limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoliciesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_rate_limits: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openshift_identities: Option<OpenShiftAuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_metadata: Option<TierMetadataConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_filters: Option<ResponseFiltersConfig>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        AuthenticationConfig {
            enabled: true,
            openshift_identities: None,
            tier_metadata: None,
            authorization: None,
            response_filters: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenShiftAuthConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
    #[serde(rename = "userIDExpression", default, skip_serializing_if = "String::is_empty")]
    pub user_id_expression: String,
}

/// Where the gateway looks up a caller's tier, and how long it caches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierMetadataConfig {
    #[serde(rename = "apiEndpoint", default, skip_serializing_if = "String::is_empty")]
    pub api_endpoint: String,
    #[serde(rename = "cacheTTL", default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<i32>,
    #[serde(rename = "cacheKeySelector", default, skip_serializing_if = "String::is_empty")]
    pub cache_key_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_attributes: Option<ResourceAttributesConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceAttributesConfig {
    pub group: String,
    pub resource: String,
    pub verb: String,
    pub namespace_expression: String,
    pub name_expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFiltersConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "includeUserID", default)]
    pub include_user_id: bool,
    #[serde(rename = "includeTier", default)]
    pub include_tier: bool,
}

/// Platform-level rate limits keyed by tier name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tiers: BTreeMap<String, TierLimit>,
}

/// One limit: `limit` units per `window` (e.g. "2m"), counted per `counters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    pub limit: i64,
    pub window: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<String>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformPhase {
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaasPlatformStatus {
    pub phase: PlatformPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub applied_objects: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> MaasPlatform {
        let value: serde_json::Value = serde_yaml::from_str(yaml).unwrap();
        MaasPlatform::from_object(&DynamicObject::from_value(value).unwrap()).unwrap()
    }

    #[test]
    fn minimal_platform_decodes() {
        let p = parse(
            "apiVersion: myapp.io.odh.maas/v1alpha1\nkind: MaasPlatform\nmetadata:\n  name: p\n  namespace: maas\n",
        );
        assert_eq!(p.key(), ObjectKey::namespaced("maas", "p"));
        assert!(p.spec.policies.is_none());
        assert!(p.authentication_enabled());
        assert!(p.tier_metadata().is_none());
    }

    #[test]
    fn policies_decode_with_wire_names() {
        let p = parse(
            r#"
apiVersion: myapp.io.odh.maas/v1alpha1
kind: MaasPlatform
metadata: {name: p, namespace: maas, uid: abc}
spec:
  policies:
    authentication:
      enabled: false
      openshiftIdentities:
        audiences: [gw]
        userIDExpression: auth.identity.user.username
      tierMetadata:
        apiEndpoint: http://lookup
        cacheTTL: 60
      responseFilters: {enabled: true, includeUserID: true, includeTier: true}
    rateLimits:
      tiers:
        free: {limit: 5, window: 2m}
"#,
        );
        assert!(!p.authentication_enabled());
        let auth = p.spec.policies.as_ref().unwrap().authentication.as_ref().unwrap();
        assert_eq!(
            auth.openshift_identities.as_ref().unwrap().user_id_expression,
            "auth.identity.user.username"
        );
        assert!(auth.response_filters.as_ref().unwrap().include_user_id);
        let tm = p.tier_metadata().unwrap();
        assert_eq!(tm.api_endpoint, "http://lookup");
        assert_eq!(tm.cache_ttl, Some(60));
        let rl = p.spec.policies.as_ref().unwrap().rate_limits.as_ref().unwrap();
        assert!(rl.enabled);
        assert_eq!(rl.tiers["free"].limit, 5);
    }

    #[test]
    fn owner_reference_uses_identity() {
        let p = parse(
            "apiVersion: myapp.io.odh.maas/v1alpha1\nkind: MaasPlatform\nmetadata: {name: p, namespace: maas, uid: u-1}\n",
        );
        let r = p.owner_reference();
        assert_eq!(r.kind, KIND);
        assert_eq!(r.name, "p");
        assert_eq!(r.uid, "u-1");
        assert_eq!(r.controller, Some(true));
    }

    #[test]
    fn status_round_trips_through_object() {
        let mut p = parse(
            "apiVersion: myapp.io.odh.maas/v1alpha1\nkind: MaasPlatform\nmetadata: {name: p, namespace: maas}\n",
        );
        p.status = Some(MaasPlatformStatus {
            phase: PlatformPhase::Ready,
            observed_generation: Some(2),
            applied_objects: 9,
            message: None,
        });
        let obj = p.to_object().unwrap();
        assert_eq!(obj.pointer(&["status", "phase"]).unwrap(), "Ready");
        assert_eq!(obj.pointer(&["status", "appliedObjects"]).unwrap(), 9);
        assert_eq!(MaasPlatform::from_object(&obj).unwrap(), p);
    }
}
