//! Channel health monitoring and alerting.
//!
//! # Components
//!
//! - `health`: per-(channel, pair) health scoring and the health state machine
//! - `alerts`: deduplicated alert history and delivery sinks
//! - `tracing`: subscriber initialisation for the service binary

pub mod alerts;
pub mod health;
pub mod tracing;

pub use alerts::{AlertError, AlertManager, AlertSink, WebhookSink};
pub use health::{
	health_score, status_for_score, ChannelHealth, HealthMonitor, HealthSummary,
	ReferencePriceSource, ScoreInputs,
};
