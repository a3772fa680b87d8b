//! Substitution variables and their resolution chain.
//!
//! The variable set is closed: the cluster domain plus three settings the
//! gateway authentication template reads from the platform's tier-metadata
//! configuration. Resolution never fails; every variable has a default.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::infrastructure::ObjectStore;
use crate::types::object::ObjectRef;
use crate::types::platform::MaasPlatform;

pub const CLUSTER_DOMAIN: &str = "CLUSTER_DOMAIN";
pub const TIER_LOOKUP_URL: &str = "TIER_LOOKUP_URL";
pub const TIER_CACHE_TTL: &str = "TIER_CACHE_TTL";
pub const TIER_CACHE_KEY: &str = "TIER_CACHE_KEY";

pub const KNOWN_VARIABLES: [&str; 4] = [CLUSTER_DOMAIN, TIER_LOOKUP_URL, TIER_CACHE_TTL, TIER_CACHE_KEY];

pub const DEFAULT_TIER_LOOKUP_URL: &str =
    "http://maas-api.maas-api.svc.cluster.local:8080/v1/tiers/lookup";
pub const DEFAULT_TIER_CACHE_TTL: i32 = 300;
pub const DEFAULT_TIER_CACHE_KEY: &str = "auth.identity.user.username";

/// Cluster-scoped singleton whose `spec.domain` is the fallback domain source.
pub fn cluster_ingress_ref() -> ObjectRef {
    ObjectRef::new("config.openshift.io/v1", "Ingress", "", "cluster")
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Resolved name → value pairs handed to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    pub fn new() -> Self {
        Variables::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// VariableResolver
// ---------------------------------------------------------------------------

pub struct VariableResolver<'a> {
    store: &'a dyn ObjectStore,
    config: &'a EngineConfig,
    platform: Option<&'a MaasPlatform>,
}

impl<'a> VariableResolver<'a> {
    pub fn new(store: &'a dyn ObjectStore, config: &'a EngineConfig) -> Self {
        VariableResolver {
            store,
            config,
            platform: None,
        }
    }

    /// Resolve platform-derived variables from `platform`'s configuration.
    pub fn for_platform(mut self, platform: &'a MaasPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Value for `name`, or `None` if `name` is not a known variable.
    pub fn resolve(&self, name: &str) -> Option<String> {
        match name {
            CLUSTER_DOMAIN => Some(self.cluster_domain()),
            TIER_LOOKUP_URL => Some(self.tier_lookup_url()),
            TIER_CACHE_TTL => Some(self.tier_cache_ttl().to_string()),
            TIER_CACHE_KEY => Some(self.tier_cache_key()),
            _ => None,
        }
    }

    /// Every known variable, resolving the cluster domain once.
    pub fn variables(&self) -> Variables {
        let mut vars = Variables::new();
        for name in KNOWN_VARIABLES {
            if let Some(value) = self.resolve(name) {
                vars.insert(name, &value);
            }
        }
        vars
    }

    /// Configured override, then the cluster ingress singleton, then the default.
    pub fn cluster_domain(&self) -> String {
        if let Some(domain) = self.config.cluster_domain.as_deref() {
            if !domain.is_empty() {
                return domain.to_string();
            }
        }

        match self.store.get(&cluster_ingress_ref()) {
            Ok(ingress) => {
                let domain = ingress
                    .pointer(&["spec", "domain"])
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !domain.is_empty() {
                    info!(domain, "detected cluster domain");
                    return domain.to_string();
                }
                debug!("cluster ingress has no spec.domain");
            }
            Err(e) if e.is_not_found() => debug!("cluster ingress singleton not present"),
            Err(e) => warn!(error = %e, "cluster domain lookup failed"),
        }

        info!(domain = %self.config.default_cluster_domain, "using default cluster domain");
        self.config.default_cluster_domain.clone()
    }

    fn tier_lookup_url(&self) -> String {
        self.platform
            .and_then(|p| p.tier_metadata())
            .map(|tm| tm.api_endpoint.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TIER_LOOKUP_URL)
            .to_string()
    }

    fn tier_cache_ttl(&self) -> i32 {
        self.platform
            .and_then(|p| p.tier_metadata())
            .and_then(|tm| tm.cache_ttl)
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_TIER_CACHE_TTL)
    }

    fn tier_cache_key(&self) -> String {
        self.platform
            .and_then(|p| p.tier_metadata())
            .map(|tm| tm.cache_key_selector.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TIER_CACHE_KEY)
            .to_string()
    }
}
