//! Core of the oracle coordinator: the shared pair store, the submission
//! coordinator, the orchestration sweep and the engine running them.

use oracle_config::OracleConfig;
use oracle_delivery::{create_ledger, Ledger};
use oracle_monitoring::{AlertManager, HealthMonitor};
use oracle_pricing::{Aggregator, AnomalyDetector};
use oracle_sources::{SourceInterface, SourceService};
use oracle_storage::{create_storage, StorageInterface, StorageService};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod lifecycle;
pub mod orchestrator;
pub mod selection;
pub mod store;

pub use coordinator::{CoordinatorStatus, CycleOutcome, SubmissionCoordinator};
pub use engine::{OracleEngine, OracleStatus, PairStatus, RunMode};
pub use error::CoreError;
pub use event_bus::EventBus;
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use orchestrator::{Orchestrator, SweepReport};
pub use store::{PairState, PriceStore, PublishedPrice};

/// Assembles an [`OracleEngine`] from configuration.
///
/// Sources, ledger and storage are built from the configuration unless
/// supplied explicitly.
pub struct OracleBuilder {
	config: OracleConfig,
	sources: Vec<Box<dyn SourceInterface>>,
	ledger: Option<Ledger>,
	storage: Option<Box<dyn StorageInterface>>,
}

impl OracleBuilder {
	pub fn new(config: OracleConfig) -> Self {
		Self {
			config,
			sources: Vec::new(),
			ledger: None,
			storage: None,
		}
	}

	pub fn with_sources(mut self, sources: Vec<Box<dyn SourceInterface>>) -> Self {
		self.sources = sources;
		self
	}

	pub fn with_ledger(mut self, ledger: Ledger) -> Self {
		self.ledger = Some(ledger);
		self
	}

	pub fn with_storage(mut self, storage: Box<dyn StorageInterface>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn build(self) -> Result<OracleEngine, CoreError> {
		let config = self.config;
		let registrations = config.registrations();

		let store = Arc::new(PriceStore::from_registrations(
			registrations.clone(),
			config.aggregation.history_size,
		));

		let sources = if self.sources.is_empty() {
			SourceService::from_config(&config.sources, config.oracle.offline)
				.map_err(|e| CoreError::ServiceInit(format!("Failed to build sources: {}", e)))?
		} else {
			SourceService::new(
				self.sources,
				Duration::from_secs(config.sources.fetch_timeout_secs),
			)
			.with_offline(config.oracle.offline)
		};
		let sources = Arc::new(sources);

		let ledger = match self.ledger {
			Some(ledger) => ledger,
			None => build_ledger(&config)?,
		};

		let storage_backend = match self.storage {
			Some(storage) => storage,
			None => create_storage(&config.storage.backend, &config.storage.config)?,
		};
		let storage = Arc::new(StorageService::new(storage_backend));

		let alerts = Arc::new(
			AlertManager::from_config(&config.health)
				.map_err(|e| CoreError::ServiceInit(format!("Failed to build alert sinks: {}", e)))?,
		);
		let event_bus = EventBus::default();

		let coordinator = Arc::new(SubmissionCoordinator::new(
			config.coordination.clone(),
			store.clone(),
			sources.clone(),
			Aggregator::from_config(&config.aggregation),
			AnomalyDetector::from_config(&config.anomaly),
			ledger.publisher.clone(),
			storage.clone(),
			event_bus.clone(),
		));
		let orchestrator = Arc::new(Orchestrator::new(
			config.orchestration.clone(),
			config.oracle.dry_run,
			store.clone(),
			ledger.clone(),
			alerts.clone(),
			event_bus.clone(),
		));
		let monitor = Arc::new(HealthMonitor::new(
			config.health.clone(),
			ledger.publisher.clone(),
			store.clone(),
			alerts.clone(),
		));

		Ok(OracleEngine {
			config,
			store,
			sources,
			coordinator,
			orchestrator,
			monitor,
			alerts,
			storage,
			ledger,
			event_bus,
			lifecycle: Arc::new(LifecycleManager::new()),
		})
	}
}

/// Dry-run always uses the in-memory ledger, whatever backend is configured.
fn build_ledger(config: &OracleConfig) -> Result<Ledger, CoreError> {
	let backend = config.delivery.backend.as_str();
	if config.oracle.dry_run {
		let backend_config = if backend == "dry_run" {
			config.delivery.config.clone()
		} else {
			toml::Value::Table(toml::map::Map::new())
		};
		return Ok(create_ledger("dry_run", &backend_config, config.registrations())?);
	}

	if backend == "dry_run" {
		warn!("dry_run is off but the dry_run delivery backend is configured; nothing reaches a ledger");
	}
	Ok(create_ledger(backend, &config.delivery.config, config.registrations())?)
}
