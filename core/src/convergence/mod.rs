//! Convergence engine: moves the store towards desired state.
//!
//! `applier` decides create/update/skip for a single object. `platform`
//! converges a `MaasPlatform` from its manifest groups, and `aggregate`
//! recomputes the tier-derived artifacts (`artifacts`) for a platform.
//! `deletion` handles tier removal by recomputing every platform.

pub mod aggregate;
pub mod applier;
pub mod artifacts;
pub mod cancel;
pub mod deletion;
pub mod platform;

pub use aggregate::{AggregationOutcome, AggregationTrigger, TierAggregator};
pub use applier::{Applier, ApplyOptions, ApplyOutcome, ApplySummary, Owner, SkipReason};
pub use artifacts::Artifact;
pub use cancel::CancelToken;
pub use platform::{ConvergeReport, PlatformReconciler, ReconcileOutcome};
