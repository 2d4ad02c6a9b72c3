//! File-based storage backend.
//!
//! Each key is one file under `storage_path`. Files start with an 8-byte
//! big-endian expiry timestamp (unix seconds, 0 = never) followed by the
//! payload. Writes go to a temp file first and are renamed into place.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use oracle_types::{current_timestamp, ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

const HEADER_LEN: usize = 8;

pub struct FileStorage {
	base_path: PathBuf,
	default_ttl: Option<Duration>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			default_ttl: None,
		}
	}

	pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
		self.default_ttl = ttl;
		self
	}

	/// Maps a key to a filesystem-safe path.
	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	async fn read_live(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.file_path(key);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StorageError::NotFound),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		if data.len() < HEADER_LEN {
			return Err(StorageError::Backend(format!(
				"Truncated storage file {}",
				path.display()
			)));
		}
		let (header, payload) = data.split_at(HEADER_LEN);
		let mut expiry = [0u8; HEADER_LEN];
		expiry.copy_from_slice(header);
		let expires_at = u64::from_be_bytes(expiry);

		if expires_at != 0 && expires_at <= current_timestamp() {
			debug!("Storage entry {} expired", key);
			self.delete(key).await?;
			return Err(StorageError::NotFound);
		}
		Ok(payload.to_vec())
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String),
				Field::new(
					"retention_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		)
		.validate(config)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_live(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		// Sub-second TTLs round up so they never mean "no expiry".
		let expires_at = ttl
			.or(self.default_ttl)
			.map(|ttl| current_timestamp() + ttl.as_secs().max(1))
			.unwrap_or(0);

		let mut contents = Vec::with_capacity(HEADER_LEN + value.len());
		contents.extend_from_slice(&expires_at.to_be_bytes());
		contents.extend_from_slice(&value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, contents)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.read_live(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}
}

/// Factory function to create a file backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `retention_secs`: default time-to-live for entries (default: keep forever)
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	let retention = config
		.get("retention_secs")
		.and_then(|v| v.as_integer())
		.filter(|secs| *secs > 0)
		.map(|secs| Duration::from_secs(secs as u64));

	Box::new(FileStorage::new(PathBuf::from(storage_path)).with_default_ttl(retention))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_round_trip_with_unsafe_key() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("submissions:STX/USD", b"{}".to_vec(), None)
			.await
			.unwrap();
		assert!(dir.path().join("submissions_STX_USD.bin").exists());
		assert_eq!(
			storage.get_bytes("submissions:STX/USD").await.unwrap(),
			b"{}".to_vec()
		);

		storage.delete("submissions:STX/USD").await.unwrap();
		assert!(!storage.exists("submissions:STX/USD").await.unwrap());
	}

	#[tokio::test]
	async fn test_expired_file_is_removed() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		// Write an entry whose expiry is already in the past.
		let mut contents = 1u64.to_be_bytes().to_vec();
		contents.extend_from_slice(b"old");
		std::fs::write(dir.path().join("k.bin"), contents).unwrap();

		assert!(matches!(
			storage.get_bytes("k").await,
			Err(StorageError::NotFound)
		));
		assert!(!dir.path().join("k.bin").exists());
	}

	#[tokio::test]
	async fn test_factory_uses_storage_path() {
		let dir = tempfile::tempdir().unwrap();
		let config: toml::Value = toml::from_str(&format!(
			"storage_path = {:?}\nretention_secs = 3600",
			dir.path().join("nested").display().to_string()
		))
		.unwrap();

		let storage = create_storage(&config);
		storage.set_bytes("a", b"1".to_vec(), None).await.unwrap();
		assert!(dir.path().join("nested").join("a.bin").exists());
		assert_eq!(storage.get_bytes("a").await.unwrap(), b"1".to_vec());
	}
}
