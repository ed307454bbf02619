use tracing::warn;

use crate::source::CHAR_SIZE;
use crate::{PoolError, PoolResult};

/// Default minimum chunk size, in bytes.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 512 * 1024;

/// Default limit for a single allocation, in characters (terminator included).
pub const DEFAULT_MAX_ALLOC_CHARS: usize = 1024 * 1024;

/// Chunks smaller than this still work, but defeat the point of pooling.
const COMFORTABLE_CHUNK_SIZE: usize = 32_000;

/// Growth policy of a [`Pool`](crate::Pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
	/// Smallest chunk the pool asks its source for, in bytes (before the source's
	/// header and granularity rounding are added).
	pub min_chunk_size: usize,
	/// Largest string accepted by one allocation, in characters, terminator included.
	pub max_alloc_chars: usize,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
			max_alloc_chars: DEFAULT_MAX_ALLOC_CHARS,
		}
	}
}

impl PoolConfig {
	#[must_use]
	pub const fn with_min_chunk_size(mut self, bytes: usize) -> Self {
		self.min_chunk_size = bytes;
		self
	}

	#[must_use]
	pub const fn with_max_alloc_chars(mut self, chars: usize) -> Self {
		self.max_alloc_chars = chars;
		self
	}

	/// Validates the configuration.
	///
	/// Fails if either limit is zero or if the largest allocation can't be expressed in
	/// bytes. A chunk minimum below 32000 bytes is allowed but logged.
	pub fn validate(&self) -> PoolResult<()> {
		if self.min_chunk_size == 0 {
			return Err(PoolError::InvalidConfig("min_chunk_size must be > 0".into()));
		}
		if self.max_alloc_chars == 0 {
			return Err(PoolError::InvalidConfig("max_alloc_chars must be > 0".into()));
		}
		if self.max_alloc_chars.checked_mul(CHAR_SIZE).is_none_or(|bytes| bytes > isize::MAX as usize) {
			return Err(PoolError::InvalidConfig(format!(
				"max_alloc_chars ({}) does not fit in the address space",
				self.max_alloc_chars
			)));
		}
		if self.min_chunk_size < COMFORTABLE_CHUNK_SIZE {
			warn!(
				min_chunk_size = self.min_chunk_size,
				"small pool chunks, expect many chunk allocations"
			);
		}
		Ok(())
	}
}
