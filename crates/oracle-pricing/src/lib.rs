//! Price aggregation and anomaly detection.
//!
//! Both stages are synchronous and side-effect free apart from logging: the
//! aggregator turns a set of observations into an [`AggregatedPrice`], and the
//! detector judges that aggregate against the pair's recent history.
//!
//! [`AggregatedPrice`]: oracle_types::AggregatedPrice

pub mod aggregator;
pub mod anomaly;

pub use aggregator::{median, sample_std_dev, trimmed_mean, Aggregator};
pub use anomaly::{AnomalyDetector, AnomalyVerdict};
