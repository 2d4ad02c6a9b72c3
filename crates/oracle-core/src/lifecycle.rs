//! Engine lifecycle and the shutdown signal observed by every loop.

use crate::error::CoreError;
use std::fmt;
use tokio::sync::{watch, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Uninitialized,
	Initializing,
	Running,
	Stopping,
	Stopped,
	Failed,
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Uninitialized => "uninitialized",
			Self::Initializing => "initializing",
			Self::Running => "running",
			Self::Stopping => "stopping",
			Self::Stopped => "stopped",
			Self::Failed => "failed",
		};
		f.write_str(name)
	}
}

fn is_valid_transition(from: LifecycleState, to: LifecycleState) -> bool {
	use LifecycleState::*;

	matches!(
		(from, to),
		(Uninitialized, Initializing)
			| (Initializing, Running)
			| (Running, Stopping)
			| (Stopping, Stopped)
			| (_, Failed)
	)
}

/// Tracks the engine state and owns the shutdown signal.
///
/// The signal is a watch channel, so a loop that subscribes after shutdown
/// was requested still sees it.
pub struct LifecycleManager {
	state: RwLock<LifecycleState>,
	shutdown_tx: watch::Sender<bool>,
}

impl LifecycleManager {
	pub fn new() -> Self {
		let (shutdown_tx, _) = watch::channel(false);
		Self {
			state: RwLock::new(LifecycleState::Uninitialized),
			shutdown_tx,
		}
	}

	pub async fn state(&self) -> LifecycleState {
		*self.state.read().await
	}

	pub async fn transition(&self, to: LifecycleState) -> Result<(), CoreError> {
		let mut state = self.state.write().await;
		let from = *state;
		if !is_valid_transition(from, to) {
			return Err(CoreError::Lifecycle(format!(
				"Invalid state transition from {} to {}",
				from, to
			)));
		}
		*state = to;
		info!("Lifecycle state changed: {} -> {}", from, to);
		Ok(())
	}

	/// Moves to `Stopping` and signals every loop.
	pub async fn request_shutdown(&self) -> Result<(), CoreError> {
		self.transition(LifecycleState::Stopping).await?;
		self.shutdown_tx.send_replace(true);
		Ok(())
	}

	pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
		self.shutdown_tx.subscribe()
	}

	pub fn shutdown_requested(&self) -> bool {
		*self.shutdown_tx.borrow()
	}

	pub async fn is_running(&self) -> bool {
		self.state().await == LifecycleState::Running
	}
}

impl Default for LifecycleManager {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_happy_path_transitions() {
		let lifecycle = LifecycleManager::new();
		lifecycle.transition(LifecycleState::Initializing).await.unwrap();
		lifecycle.transition(LifecycleState::Running).await.unwrap();
		assert!(lifecycle.is_running().await);

		let mut rx = lifecycle.subscribe_shutdown();
		lifecycle.request_shutdown().await.unwrap();
		rx.changed().await.unwrap();
		assert!(*rx.borrow());

		lifecycle.transition(LifecycleState::Stopped).await.unwrap();
		assert_eq!(lifecycle.state().await, LifecycleState::Stopped);
	}

	#[tokio::test]
	async fn test_invalid_transitions_are_rejected() {
		let lifecycle = LifecycleManager::new();
		assert!(matches!(
			lifecycle.transition(LifecycleState::Running).await,
			Err(CoreError::Lifecycle(_))
		));
		assert!(lifecycle.request_shutdown().await.is_err());
		lifecycle.transition(LifecycleState::Failed).await.unwrap();
	}

	#[tokio::test]
	async fn test_late_subscriber_sees_shutdown() {
		let lifecycle = LifecycleManager::new();
		lifecycle.transition(LifecycleState::Initializing).await.unwrap();
		lifecycle.transition(LifecycleState::Running).await.unwrap();
		lifecycle.request_shutdown().await.unwrap();

		let rx = lifecycle.subscribe_shutdown();
		assert!(*rx.borrow());
		assert!(lifecycle.shutdown_requested());
	}
}
