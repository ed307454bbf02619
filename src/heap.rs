use core::fmt::{self, Debug, Formatter};
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};
use allocator_api2::vec::Vec as AllocVec;
use tracing::warn;

use crate::source::{CHAR_SIZE, ChunkSource};
use crate::{PoolError, PoolResult};

/// Chunk size unit used by `HeapSource` unless told otherwise.
pub const DEFAULT_HEAP_GRANULARITY: usize = 4096;

/// A chunk source backed by a general-purpose allocator.
///
/// Each chunk is an owned buffer kept in an order-preserving list, so there is no header
/// inside the chunk: releasing the chunks is dropping the list.
///
/// # Examples
/// ```
/// use strpool::{HeapSource, Pool, PoolConfig};
///
/// let pool = Pool::with_source(HeapSource::with_granularity(64), PoolConfig::default()).unwrap();
/// let s = pool.alloc_str("hello").unwrap();
/// assert_eq!(s, "hello");
/// ```
pub struct HeapSource<A: Allocator + Clone = Global> {
	alloc: A,
	granularity: usize,
	chunks: Vec<AllocVec<u16, A>>,
	reserved: usize,
}

impl HeapSource {
	/// A source using the global allocator and the default granularity.
	#[must_use]
	pub const fn new() -> Self {
		Self::new_in(Global)
	}

	/// A source using the global allocator with a custom granularity (in bytes).
	/// The value is rounded up to a whole number of characters.
	#[must_use]
	pub fn with_granularity(granularity: usize) -> Self {
		Self::with_granularity_in(Global, granularity)
	}
}

impl<A: Allocator + Clone> HeapSource<A> {
	/// A source that obtains its chunks from `alloc`.
	pub const fn new_in(alloc: A) -> Self {
		Self {
			alloc,
			granularity: DEFAULT_HEAP_GRANULARITY,
			chunks: Vec::new(),
			reserved: 0,
		}
	}

	/// A source that obtains its chunks from `alloc` in units of `granularity` bytes.
	///
	/// A value too close to `usize::MAX` to round up is kept as is, and
	/// [`Pool::with_source`](crate::Pool::with_source) rejects it.
	pub fn with_granularity_in(alloc: A, granularity: usize) -> Self {
		let granularity = granularity.max(1);
		Self {
			granularity: granularity.checked_next_multiple_of(CHAR_SIZE).unwrap_or(granularity),
			..Self::new_in(alloc)
		}
	}
}

impl Default for HeapSource {
	fn default() -> Self {
		Self::new()
	}
}

impl<A: Allocator + Clone> Debug for HeapSource<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("HeapSource")
			.field("granularity", &self.granularity)
			.field("chunks", &self.chunks.len())
			.field("reserved", &self.reserved)
			.finish()
	}
}

// SAFETY: every buffer is zero-filled with `resize`, is a `u16` allocation, and is only
// dropped by `release_all` or when the source itself is dropped. Moving a buffer into
// `chunks` doesn't move its heap allocation.
unsafe impl<A: Allocator + Clone> ChunkSource for HeapSource<A> {
	const HEADER_SIZE: usize = 0;

	fn granularity(&self) -> usize {
		self.granularity
	}

	fn allocate_chunk(&mut self, size: usize) -> PoolResult<NonNull<[u16]>> {
		let chars = size / CHAR_SIZE;

		let mut buf = AllocVec::new_in(self.alloc.clone());
		if let Err(err) = buf.try_reserve_exact(chars) {
			warn!(size, error = ?err, "heap chunk allocation failed");
			return Err(PoolError::out_of_memory(size));
		}
		buf.resize(chars, 0);

		let area = NonNull::from(buf.as_mut_slice());
		self.chunks.push(buf);
		self.reserved += size;
		Ok(area)
	}

	fn chunk_count(&self) -> usize {
		self.chunks.len()
	}

	fn reserved_bytes(&self) -> usize {
		self.reserved
	}

	fn release_all(&mut self) {
		self.chunks.clear();
		self.reserved = 0;
	}
}
