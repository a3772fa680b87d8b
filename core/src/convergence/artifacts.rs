//! Derived artifacts computed from the full set of tiers targeting a platform.
//!
//! Every builder here is a pure function of its input: the same tiers always
//! yield the same object, whatever order they were listed in.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::EngineError;
use crate::types::object::{DynamicObject, ObjectKey, ObjectRef};
use crate::types::platform::TierLimit;
use crate::types::tier::Tier;

pub const TIER_MAPPING_NAME: &str = "tier-to-group-mapping";
pub const TIER_MAPPING_NAMESPACE: &str = "maas-api";
pub const TIER_MAPPING_KEY: &str = "tiers";
pub const LABEL_MAAS_PLATFORM: &str = "maas-platform";

pub const POLICY_NAMESPACE: &str = "openshift-ingress";
pub const RATE_LIMIT_POLICY_NAME: &str = "gateway-rate-limits";
pub const RATE_LIMIT_POLICY_API_VERSION: &str = "kuadrant.io/v1";
pub const TOKEN_RATE_LIMIT_POLICY_NAME: &str = "gateway-token-rate-limits";
pub const TOKEN_RATE_LIMIT_POLICY_API_VERSION: &str = "kuadrant.io/v1alpha1";

pub const GATEWAY_NAME: &str = "maas-default-gateway";
pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

pub const DEFAULT_COUNTER: &str = "auth.identity.userid";
pub const SYSTEM_AUTHENTICATED: &str = "system:authenticated";

/// The three objects recomputed on every aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Artifact {
    TierMapping,
    RateLimitPolicy,
    TokenRateLimitPolicy,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [
        Artifact::TierMapping,
        Artifact::RateLimitPolicy,
        Artifact::TokenRateLimitPolicy,
    ];

    pub fn object_ref(self) -> ObjectRef {
        match self {
            Artifact::TierMapping => {
                ObjectRef::new("v1", "ConfigMap", TIER_MAPPING_NAMESPACE, TIER_MAPPING_NAME)
            }
            Artifact::RateLimitPolicy => ObjectRef::new(
                RATE_LIMIT_POLICY_API_VERSION,
                "RateLimitPolicy",
                POLICY_NAMESPACE,
                RATE_LIMIT_POLICY_NAME,
            ),
            Artifact::TokenRateLimitPolicy => ObjectRef::new(
                TOKEN_RATE_LIMIT_POLICY_API_VERSION,
                "TokenRateLimitPolicy",
                POLICY_NAMESPACE,
                TOKEN_RATE_LIMIT_POLICY_NAME,
            ),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.object_ref();
        write!(f, "{} {}", r.kind, r.key())
    }
}

// ---------------------------------------------------------------------------
// Tier mapping
// ---------------------------------------------------------------------------

/// Numeric level inferred from the tier name.
pub fn tier_level(name: &str) -> u32 {
    let lower = name.to_lowercase();
    if lower.contains("premium") {
        1
    } else if lower.contains("enterprise") {
        2
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMappingEntry {
    pub name: String,
    pub level: u32,
    pub groups: Vec<String>,
}

impl TierMappingEntry {
    pub fn for_tier(tier: &Tier) -> Self {
        let name = tier.tier_name();
        TierMappingEntry {
            level: tier_level(&name),
            groups: vec![format!("tier-{}-users", name), SYSTEM_AUTHENTICATED.to_string()],
            name,
        }
    }
}

/// Entries sorted by tier name.
pub fn tier_mapping_entries(tiers: &[Tier]) -> Vec<TierMappingEntry> {
    let mut entries: Vec<TierMappingEntry> = tiers.iter().map(TierMappingEntry::for_tier).collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

pub fn build_tier_mapping(tiers: &[Tier], platform: &ObjectKey) -> Result<DynamicObject, EngineError> {
    let entries = tier_mapping_entries(tiers);
    let text = serde_yaml::to_string(&entries).map_err(|e| EngineError::Serialize {
        what: "tier mapping",
        message: e.to_string(),
    })?;

    let mut data = Map::new();
    data.insert(TIER_MAPPING_KEY.to_string(), Value::String(text));

    let mut object = DynamicObject::new(&Artifact::TierMapping.object_ref());
    object.set("data", Value::Object(data));
    object.set_label(
        LABEL_MAAS_PLATFORM,
        &format!("{}.{}", platform.name, platform.namespace),
    );
    Ok(object)
}

// ---------------------------------------------------------------------------
// Rate policies
// ---------------------------------------------------------------------------

fn limit_rule(tier_name: &str, limit: &TierLimit) -> Value {
    let counters: Vec<&str> = if limit.counters.is_empty() {
        vec![DEFAULT_COUNTER]
    } else {
        limit.counters.iter().map(String::as_str).collect()
    };
    json!({
        "rates": [{"limit": limit.limit, "window": limit.window}],
        "when": [{"predicate": format!("auth.identity.tier == \"{}\"", tier_name)}],
        "counters": counters,
    })
}

fn gateway_policy(artifact: Artifact, limits: Map<String, Value>) -> DynamicObject {
    let mut object = DynamicObject::new(&artifact.object_ref());
    object.set(
        "spec",
        json!({
            "targetRef": {"group": GATEWAY_GROUP, "kind": "Gateway", "name": GATEWAY_NAME},
            "limits": limits,
        }),
    );
    object
}

/// One limit per tier declaring request limits, keyed by tier name.
pub fn build_rate_limit_policy(tiers: &[Tier]) -> DynamicObject {
    let mut limits = Map::new();
    for tier in tiers {
        if let Some(limit) = &tier.spec.rate_limits {
            let name = tier.tier_name();
            limits.insert(name.clone(), limit_rule(&name, limit));
        }
    }
    gateway_policy(Artifact::RateLimitPolicy, limits)
}

/// One limit per tier declaring token limits, keyed `<tier>-user-tokens`.
pub fn build_token_rate_limit_policy(tiers: &[Tier]) -> DynamicObject {
    let mut limits = Map::new();
    for tier in tiers {
        if let Some(limit) = &tier.spec.token_rate_limits {
            let name = tier.tier_name();
            limits.insert(format!("{}-user-tokens", name), limit_rule(&name, limit));
        }
    }
    gateway_policy(Artifact::TokenRateLimitPolicy, limits)
}

pub fn build(artifact: Artifact, tiers: &[Tier], platform: &ObjectKey) -> Result<DynamicObject, EngineError> {
    match artifact {
        Artifact::TierMapping => build_tier_mapping(tiers, platform),
        Artifact::RateLimitPolicy => Ok(build_rate_limit_policy(tiers)),
        Artifact::TokenRateLimitPolicy => Ok(build_token_rate_limit_policy(tiers)),
    }
}
