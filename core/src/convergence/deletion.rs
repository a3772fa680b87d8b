//! Tier deletion: the deleted tier's target is unknown, so every platform is
//! recomputed.

use tracing::{info, instrument, warn};

use super::aggregate::{AggregationOutcome, TierAggregator};
use crate::error::EngineError;
use crate::infrastructure::ListFilter;
use crate::types::platform::{self, MaasPlatform};

impl<'a> TierAggregator<'a> {
    /// Aggregate every platform. A failing platform does not stop the rest;
    /// the call fails afterwards, naming each platform that failed.
    #[instrument(skip(self))]
    pub fn on_child_deleted(&self) -> Result<AggregationOutcome, EngineError> {
        let objects = self
            .store
            .list(platform::API_VERSION, platform::KIND, &ListFilter::all())?;
        info!(platforms = objects.len(), "recomputing tiers for every platform");

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for object in &objects {
            if let Some(cancel) = self.cancel {
                cancel.check()?;
            }
            let result = MaasPlatform::from_object(object).and_then(|p| self.aggregate_platform(&p));
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!(platform = %object.key(), error = %e, "recompute failed");
                    failures.push((object.key().to_string(), e.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(AggregationOutcome::Recomputed(outcomes))
        } else {
            Err(EngineError::Recompute(failures))
        }
    }
}
