//! Tier aggregation. Recomputes the derived artifacts of a platform from
//! every tier that targets it.
//!
//! Artifacts are rebuilt from the complete tier set on every call, never
//! patched. Tiers are found by listing all of them and filtering on their
//! target; there is no index.

use std::fmt;

use tracing::{info, instrument, warn};

use super::applier::{Applier, ApplyOptions, ApplyOutcome, Owner};
use super::artifacts::{self, Artifact};
use super::CancelToken;
use crate::error::EngineError;
use crate::infrastructure::{get_optional, ListFilter, ObjectStore};
use crate::types::object::ObjectKey;
use crate::types::platform::MaasPlatform;
use crate::types::tier::{self, Tier};

/// What caused an aggregation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationTrigger {
    /// A tier was created or changed. A tier that can no longer be found is
    /// handled as a deletion.
    Tier(ObjectKey),
    /// A platform was created or changed.
    Platform(ObjectKey),
    /// Some tier was deleted; its target is unknown.
    TierDeleted,
}

impl fmt::Display for AggregationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationTrigger::Tier(key) => write!(f, "tier {}", key),
            AggregationTrigger::Platform(key) => write!(f, "platform {}", key),
            AggregationTrigger::TierDeleted => f.write_str("tier deletion"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// The platform does not exist; nothing to aggregate into.
    PlatformGone { platform: ObjectKey },
    /// No tier targets the platform. Existing artifacts were left untouched.
    NoTiers { platform: ObjectKey },
    Applied {
        platform: ObjectKey,
        /// Tier names in mapping order.
        tiers: Vec<String>,
        artifacts: Vec<(Artifact, ApplyOutcome)>,
    },
    /// Every platform was recomputed after a tier deletion.
    Recomputed(Vec<AggregationOutcome>),
}

pub struct TierAggregator<'a> {
    pub(super) store: &'a dyn ObjectStore,
    pub(super) cancel: Option<&'a CancelToken>,
}

impl<'a> TierAggregator<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        TierAggregator { store, cancel: None }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[instrument(skip(self), fields(trigger = %trigger))]
    pub fn on_child_change(&self, trigger: &AggregationTrigger) -> Result<AggregationOutcome, EngineError> {
        match trigger {
            AggregationTrigger::TierDeleted => self.on_child_deleted(),
            AggregationTrigger::Tier(key) => {
                let object = match get_optional(self.store, &Tier::object_ref(key))? {
                    Some(object) => object,
                    None => {
                        info!(tier = %key, "tier not found, recomputing every platform");
                        return self.on_child_deleted();
                    }
                };
                let tier = Tier::from_object(&object)?;
                let target = tier.target();
                match get_optional(self.store, &MaasPlatform::object_ref(&target))? {
                    Some(platform) => self.aggregate_platform(&MaasPlatform::from_object(&platform)?),
                    None => Err(EngineError::TargetNotFound {
                        tier: tier.key(),
                        platform: target,
                    }),
                }
            }
            AggregationTrigger::Platform(key) => {
                match get_optional(self.store, &MaasPlatform::object_ref(key))? {
                    Some(platform) => self.aggregate_platform(&MaasPlatform::from_object(&platform)?),
                    None => {
                        info!(platform = %key, "platform not found, nothing to aggregate");
                        Ok(AggregationOutcome::PlatformGone { platform: key.clone() })
                    }
                }
            }
        }
    }

    /// Tiers targeting `platform`. Tiers that do not decode are skipped.
    pub fn tiers_for(&self, platform: &ObjectKey) -> Result<Vec<Tier>, EngineError> {
        let objects = self.store.list(tier::API_VERSION, tier::KIND, &ListFilter::all())?;
        let mut tiers = Vec::new();
        for object in &objects {
            match Tier::from_object(object) {
                Ok(tier) if tier.targets(platform) => tiers.push(tier),
                Ok(_) => {}
                Err(e) => warn!(tier = %object.key(), error = %e, "skipping malformed tier"),
            }
        }
        Ok(tiers)
    }

    /// Recompute and apply every artifact for `platform`. Each artifact is
    /// attempted even when an earlier one fails.
    pub fn aggregate_platform(&self, platform: &MaasPlatform) -> Result<AggregationOutcome, EngineError> {
        let key = platform.key();
        let tiers = self.tiers_for(&key)?;
        if tiers.is_empty() {
            info!(platform = %key, "no tiers target this platform");
            return Ok(AggregationOutcome::NoTiers { platform: key });
        }

        let owner = Owner::from(platform);
        let options = ApplyOptions::new().without_owner_links();
        let applier = Applier::new(self.store).with_cancel(self.cancel);

        let mut applied = Vec::new();
        let mut failures = Vec::new();
        for artifact in Artifact::ALL {
            let result = artifacts::build(artifact, &tiers, &key)
                .and_then(|object| applier.apply(object, &owner, &options));
            match result {
                Ok(outcome) => applied.push((artifact, outcome)),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!(%artifact, error = %e, "artifact failed");
                    failures.push((artifact.to_string(), e.to_string()));
                }
            }
        }

        if !failures.is_empty() {
            return Err(EngineError::Aggregation { platform: key, failures });
        }

        let names: Vec<String> = artifacts::tier_mapping_entries(&tiers)
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        info!(platform = %key, tiers = names.len(), "aggregated tiers");
        Ok(AggregationOutcome::Applied {
            platform: key,
            tiers: names,
            artifacts: applied,
        })
    }
}
