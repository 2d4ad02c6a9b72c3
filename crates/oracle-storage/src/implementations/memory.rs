//! In-process storage backend.
//!
//! Entries live in a concurrent map and expire lazily: an expired entry is
//! dropped the next time it is read.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use oracle_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::time::{Duration, Instant};

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

#[derive(Default)]
pub struct MemoryStorage {
	entries: DashMap<String, Entry>,
	/// Applied when a write carries no TTL of its own.
	default_ttl: Option<Duration>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
		self.default_ttl = ttl;
		self
	}

	fn live_entry(&self, key: &str) -> Option<Vec<u8>> {
		let now = Instant::now();
		let value = {
			let entry = self.entries.get(key)?;
			if entry.is_expired(now) {
				None
			} else {
				Some(entry.value.clone())
			}
		};
		if value.is_none() {
			self.entries.remove_if(key, |_, e| e.is_expired(now));
		}
		value
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new(
				"retention_secs",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
		)
		.validate(config)
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.live_entry(key).ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
		self.entries
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.live_entry(key).is_some())
	}
}

/// Factory function to create a memory backend from configuration.
///
/// Configuration parameters:
/// - `retention_secs`: default time-to-live for entries (default: keep forever)
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let retention = config
		.get("retention_secs")
		.and_then(|v| v.as_integer())
		.filter(|secs| *secs > 0)
		.map(|secs| Duration::from_secs(secs as u64));

	Box::new(MemoryStorage::new().with_default_ttl(retention))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_set_get_delete() {
		let storage = MemoryStorage::new();
		storage.set_bytes("a:1", b"x".to_vec(), None).await.unwrap();
		assert_eq!(storage.get_bytes("a:1").await.unwrap(), b"x".to_vec());
		assert!(storage.exists("a:1").await.unwrap());

		storage.delete("a:1").await.unwrap();
		storage.delete("a:1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("a:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_entries_expire() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("a:1", b"x".to_vec(), Some(Duration::from_millis(20)))
			.await
			.unwrap();
		assert!(storage.exists("a:1").await.unwrap());

		tokio::time::sleep(Duration::from_millis(40)).await;
		assert!(!storage.exists("a:1").await.unwrap());
		assert!(storage.entries.is_empty());
	}

	#[tokio::test]
	async fn test_default_ttl_applies_without_explicit_ttl() {
		let storage = MemoryStorage::new().with_default_ttl(Some(Duration::from_millis(20)));
		storage.set_bytes("a:1", b"x".to_vec(), None).await.unwrap();
		tokio::time::sleep(Duration::from_millis(40)).await;
		assert!(storage.get_bytes("a:1").await.is_err());
	}
}
