//! Channel selection strategies.
//!
//! Pure functions over the enabled channel list; the only state they read is
//! reliability (best-reliability) and the pair's submission round
//! (round-robin).

use oracle_types::{Channel, ChannelId, PairKey, SelectionStrategy};
use rand::seq::SliceRandom;
use sha3::{Digest, Keccak256};

/// Stable 64-bit hash of a pair, independent of process and platform.
pub fn pair_hash(pair: &PairKey) -> u64 {
	let digest = Keccak256::digest(pair.to_string().as_bytes());
	let mut prefix = [0u8; 8];
	prefix.copy_from_slice(&digest[..8]);
	u64::from_be_bytes(prefix)
}

/// Picks up to `count` channels from `channels` (already filtered to the
/// enabled ones).
///
/// Round-robin starts at `hash(pair) + round` so consecutive rounds of one
/// pair rotate through the whitelist while different pairs start at
/// different offsets.
pub fn select_channels(
	strategy: SelectionStrategy,
	pair: &PairKey,
	channels: &[&Channel],
	count: usize,
	round: u64,
) -> Vec<ChannelId> {
	let n = channels.len();
	let count = count.min(n);
	if count == 0 {
		return Vec::new();
	}

	match strategy {
		SelectionStrategy::RoundRobin => {
			let start = (pair_hash(pair).wrapping_add(round) % n as u64) as usize;
			(0..count)
				.map(|i| channels[(start + i) % n].id.clone())
				.collect()
		}
		SelectionStrategy::BestReliability => {
			let mut ranked: Vec<&Channel> = channels.to_vec();
			// Stable sort keeps whitelist order among equal scores.
			ranked.sort_by(|a, b| b.reliability.total_cmp(&a.reliability));
			ranked
				.into_iter()
				.take(count)
				.map(|c| c.id.clone())
				.collect()
		}
		SelectionStrategy::Random => channels
			.choose_multiple(&mut rand::thread_rng(), count)
			.map(|c| c.id.clone())
			.collect(),
	}
}
