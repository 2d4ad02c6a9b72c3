//! Broadcast channel for [`OracleEvent`]s.
//!
//! The coordinator and orchestrator publish; the engine's listener forwards
//! submission outcomes to the health monitor. Publishing with no subscriber
//! is not an error.

use oracle_types::OracleEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<OracleEvent>,
}

impl EventBus {
	/// `capacity` events are buffered per subscriber before the slowest one
	/// starts lagging.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
		self.sender.subscribe()
	}

	/// Returns the number of subscribers that received the event.
	pub fn publish(&self, event: OracleEvent) -> usize {
		self.sender.send(event).unwrap_or(0)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1024)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use oracle_types::PairKey;

	#[tokio::test]
	async fn test_publish_reaches_every_subscriber() {
		let bus = EventBus::new(8);
		assert_eq!(
			bus.publish(OracleEvent::AnomalyRejected {
				pair: PairKey::new("STX", "USD"),
				reason: "nobody listening".into(),
			}),
			0
		);

		let mut a = bus.subscribe();
		let mut b = bus.clone().subscribe();
		let delivered = bus.publish(OracleEvent::CircuitBreakerTriggered {
			pair: PairKey::new("STX", "USD"),
			volatility_bps: 1500,
		});
		assert_eq!(delivered, 2);

		for rx in [&mut a, &mut b] {
			match rx.recv().await.unwrap() {
				OracleEvent::CircuitBreakerTriggered { volatility_bps, .. } => {
					assert_eq!(volatility_bps, 1500)
				}
				other => panic!("unexpected event {:?}", other),
			}
		}
	}
}
