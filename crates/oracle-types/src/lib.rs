//! Shared data model for the oracle price aggregation system.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here, which keeps the pipeline stages (sources, pricing, coordination,
//! monitoring) decoupled from each other.
//!
//! ## Key Components
//!
//! - [`PairKey`] / [`PairRegistration`] - Trading pairs and their channel whitelists
//! - [`Observation`] / [`AggregatedPrice`] - Raw and aggregated fixed-point prices
//! - [`Channel`] - A publishing endpoint with its reliability bookkeeping
//! - [`SubmissionRecord`] / [`SubmissionBatch`] - Outcomes of a coordination cycle
//! - [`AlertEvent`] / [`HealthStatus`] - Health monitoring vocabulary
//! - [`OracleEvent`] - Events broadcast between services
//! - [`Schema`] - TOML validation for pluggable backend configuration

pub mod alerts;
pub mod channel;
pub mod events;
pub mod pair;
pub mod price;
pub mod submission;
pub mod validation;

pub use alerts::*;
pub use channel::*;
pub use events::*;
pub use pair::*;
pub use price::*;
pub use submission::*;
pub use validation::*;

/// Returns the current unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}
