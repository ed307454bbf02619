use core::ptr::NonNull;

use crate::PoolResult;

/// Size in bytes of one pool character.
pub const CHAR_SIZE: usize = size_of::<u16>();

/// A source of large, zero-filled blocks of memory for a [`Pool`](crate::Pool).
///
/// A source hands out blocks one at a time and gives them all back at once. It never
/// frees a single block, so a pool can keep pointers into every block it was given
/// until it calls [`release_all`](ChunkSource::release_all) or drops the source.
///
/// # Safety
///
/// A block returned by `allocate_chunk` must:
/// - be zero-filled, since the pool never writes string terminators itself;
/// - be aligned for `u16` and hold exactly `(size - HEADER_SIZE) / CHAR_SIZE` characters;
/// - stay valid and untouched by the source until `release_all` is called or the
///   source is dropped.
///
/// `release_all` must release every block exactly once.
pub unsafe trait ChunkSource {
	/// Bytes at the start of every block that the source keeps for its own bookkeeping.
	/// The pool adds this to every size it asks for.
	const HEADER_SIZE: usize;

	/// The natural allocation unit of this source, in bytes. Every chunk size the pool
	/// requests is a multiple of it.
	fn granularity(&self) -> usize;

	/// Obtains a zero-filled block of `size` bytes and returns its character area.
	///
	/// Returns `PoolError::OutOfMemory` if the block can't be obtained.
	fn allocate_chunk(&mut self, size: usize) -> PoolResult<NonNull<[u16]>>;

	/// Number of blocks currently held.
	fn chunk_count(&self) -> usize;

	/// Total bytes currently held, headers included.
	fn reserved_bytes(&self) -> usize;

	/// Releases every block. All character areas returned so far become dangling.
	fn release_all(&mut self);
}

/// `roundUp(x, u) = ceil(x / u) * u`. `units` doesn't have to be a power of two.
/// Returns `None` on overflow.
pub(crate) const fn round_up(size: usize, units: usize) -> Option<usize> {
	debug_assert!(units > 0);
	size.checked_next_multiple_of(units)
}
