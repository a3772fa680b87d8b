//! MaaS convergence engine.
//!
//! Renders the platform's manifest templates into cluster objects, converges
//! them into an [`ObjectStore`](infrastructure::ObjectStore), and aggregates
//! `Tier` resources into the gateway's tier mapping and rate-limit policies.
//! Calls are synchronous and hold no state between invocations; scheduling,
//! watching and retrying belong to the caller.

pub mod config;
pub mod convergence;
pub mod error;
pub mod infrastructure;
pub mod manifest;
pub mod render;
pub mod types;

pub use config::EngineConfig;
pub use error::{EngineError, StoreError};
