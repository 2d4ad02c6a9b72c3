use oracle_delivery::DeliveryError;
use oracle_storage::StorageError;
use oracle_types::{ChannelId, PairKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Service initialization error: {0}")]
	ServiceInit(String),

	#[error("Lifecycle error: {0}")]
	Lifecycle(String),

	#[error("No trading pairs registered")]
	NoPairs,

	#[error("No enabled channels for any registered pair")]
	NoChannels,

	#[error("Unknown pair: {0}")]
	UnknownPair(PairKey),

	#[error("Channel {channel} is not registered for {pair}")]
	UnknownChannel { pair: PairKey, channel: ChannelId },

	#[error("Already registered: {0}")]
	AlreadyRegistered(String),

	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}
