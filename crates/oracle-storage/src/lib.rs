//! Persistence for coordination outcomes.
//!
//! The coordinator stores the outcome set of every submission cycle so that
//! operators can inspect the latest batch per pair after the fact. Backends
//! are plain key-value stores; [`StorageService`] adds typed JSON access on
//! top of them.

use async_trait::async_trait;
use oracle_types::{ConfigSchema, PairKey, SubmissionBatch};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Namespace holding the latest [`SubmissionBatch`] per pair.
pub const SUBMISSIONS_NAMESPACE: &str = "submissions";

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The key does not exist or has expired.
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Invalid configuration: {0}")]
	Configuration(String),
}

/// Low-level key-value interface implemented by every storage backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Returns the validation schema for this backend's configuration.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, expiring after `ttl` when given.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value for `key`. Missing keys are not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Typed storage over a [`StorageInterface`] backend.
///
/// Keys are formed as `namespace:id` and values are stored as JSON.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Replaces the latest outcome set stored for the batch's pair.
	pub async fn store_batch(&self, batch: &SubmissionBatch) -> Result<(), StorageError> {
		self.store(SUBMISSIONS_NAMESPACE, &batch.pair.to_string(), batch)
			.await
	}

	/// Latest outcome set for `pair`, if any was persisted.
	pub async fn latest_batch(&self, pair: &PairKey) -> Result<Option<SubmissionBatch>, StorageError> {
		match self
			.retrieve(SUBMISSIONS_NAMESPACE, &pair.to_string())
			.await
		{
			Ok(batch) => Ok(Some(batch)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}
}

/// Builds the configured storage backend after validating its table.
pub fn create_storage(
	backend: &str,
	config: &toml::Value,
) -> Result<Box<dyn StorageInterface>, StorageError> {
	let validate = |schema: &dyn ConfigSchema| {
		schema
			.validate(config)
			.map_err(|e| StorageError::Configuration(e.to_string()))
	};

	match backend {
		"memory" => {
			validate(&implementations::memory::MemoryStorageSchema)?;
			Ok(implementations::memory::create_storage(config))
		}
		"file" => {
			validate(&implementations::file::FileStorageSchema)?;
			Ok(implementations::file::create_storage(config))
		}
		other => Err(StorageError::Configuration(format!(
			"Unknown storage backend: {}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use oracle_types::SubmissionRecord;

	fn batch(price: u64) -> SubmissionBatch {
		let pair = PairKey::new("STX", "USD");
		SubmissionBatch::new(
			pair.clone(),
			price,
			1_700_000_000,
			vec![SubmissionRecord {
				channel: "SP1".into(),
				pair,
				price,
				timestamp: 1_700_000_000,
				success: true,
				tx_ref: Some("mock_tx_1".to_string()),
				error: None,
				response_time_ms: 12,
			}],
		)
	}

	#[tokio::test]
	async fn test_latest_batch_is_replaced() {
		let empty = toml::Value::Table(Default::default());
		let service = StorageService::new(create_storage("memory", &empty).unwrap());
		let pair = PairKey::new("STX", "USD");

		assert!(service.latest_batch(&pair).await.unwrap().is_none());

		service.store_batch(&batch(187)).await.unwrap();
		service.store_batch(&batch(190)).await.unwrap();

		let latest = service.latest_batch(&pair).await.unwrap().unwrap();
		assert_eq!(latest.price, 190);
		assert_eq!(latest.successes(), 1);
	}

	#[tokio::test]
	async fn test_wrong_type_is_serialization_error() {
		let service = StorageService::new(Box::new(implementations::memory::MemoryStorage::new()));
		service.store("misc", "n", &42u32).await.unwrap();
		assert!(matches!(
			service.retrieve::<SubmissionBatch>("misc", "n").await,
			Err(StorageError::Serialization(_))
		));
		service.remove("misc", "n").await.unwrap();
		assert!(!service.exists("misc", "n").await.unwrap());
	}

	#[test]
	fn test_unknown_backend_is_rejected() {
		let empty = toml::Value::Table(Default::default());
		assert!(matches!(
			create_storage("redis", &empty),
			Err(StorageError::Configuration(_))
		));

		let bad: toml::Value = toml::from_str("retention_secs = -5").unwrap();
		assert!(create_storage("file", &bad).is_err());
	}
}
