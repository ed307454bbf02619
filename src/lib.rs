use core::cell::{Cell, UnsafeCell};
use core::fmt::{self, Debug, Formatter};
use core::ptr::{self, NonNull};
use core::slice;

use tracing::{debug, trace};

mod config;
pub use config::*;
mod error;
pub use error::*;
mod heap;
pub use heap::*;
mod pool_str;
pub use pool_str::*;
mod source;
pub use source::{CHAR_SIZE, ChunkSource};
#[cfg(all(any(unix, windows), feature = "vm"))]
mod vm;
#[cfg(all(any(unix, windows), feature = "vm"))]
pub use vm::*;

use source::round_up;


/// A pool backed by the general-purpose allocator.
pub type HeapPool = Pool<HeapSource>;

/// A pool backed by pages mapped straight from the operating system.
#[cfg(all(any(unix, windows), feature = "vm"))]
pub type VmPool = Pool<VmSource>;

/// Counters describing what a pool currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
	pub chunks: usize,
	pub reserved_bytes: usize,
	pub strings: usize,
	/// Characters handed out so far, terminators included.
	pub used_chars: usize,
}

/// A string pool allocator.
///
/// The pool deep-copies wide (UTF-16) strings into large chunks obtained from a
/// [`ChunkSource`] and hands out [`PoolStr`] views into them. Allocation is a bounds check
/// and a pointer bump; when the current chunk is full, a new one is added and the old one
/// is left as is. Strings are never moved or freed one by one: every chunk is released
/// together when the pool is dropped, [`destroy`](Pool::destroy)ed or [`reset`](Pool::reset).
///
/// Every returned string borrows the pool, so it can't outlive it. The pool is not `Sync`;
/// use one pool per thread.
///
/// # Examples
/// ```
/// use strpool::HeapPool;
///
/// let pool = HeapPool::new();
/// let hello = pool.alloc_str("hello").unwrap();
/// let world = pool.alloc_wide(&[0x77, 0x6f, 0x72, 0x6c, 0x64]).unwrap();
///
/// assert_eq!(hello, "hello");
/// assert_eq!(world.to_string_lossy(), "world");
/// assert_eq!(world.as_wide_with_nul().last(), Some(&0));
/// ```
pub struct Pool<S: ChunkSource = HeapSource> {
	// `[next, limit)` is the unused part of the current chunk. Both are null until the
	// first chunk arrives.
	next: Cell<*mut u16>,
	limit: Cell<*mut u16>,
	source: UnsafeCell<S>,
	/// Every chunk size is a multiple of this many bytes.
	granularity: usize,
	config: PoolConfig,
	strings: Cell<usize>,
	used_chars: Cell<usize>,
}

impl<S: ChunkSource + Default> Pool<S> {
	/// Creates an empty pool with the default [`PoolConfig`].
	///
	/// # Panics
	///
	/// Panics if the source's granularity is so large that no chunk size can be computed.
	#[must_use]
	pub fn new() -> Self {
		match Self::with_config(PoolConfig::default()) {
			Ok(pool) => pool,
			Err(err) => panic!("cannot build a pool with the default configuration: {err}"),
		}
	}

	/// Creates an empty pool whose chunks are at least `bytes` long.
	/// Chunks should be comfortably large; consider passing 32000 or more.
	pub fn with_min_chunk_size(bytes: usize) -> PoolResult<Self> {
		Self::with_config(PoolConfig::default().with_min_chunk_size(bytes))
	}

	pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
		Self::with_source(S::default(), config)
	}
}

impl<S: ChunkSource> Pool<S> {
	/// Creates an empty pool that takes its chunks from `source`.
	///
	/// The chunk unit is fixed here: the configured minimum plus the source's header,
	/// rounded up to the source's granularity.
	pub fn with_source(source: S, config: PoolConfig) -> PoolResult<Self> {
		config.validate()?;

		let unit = source.granularity();
		if unit == 0 || unit % CHAR_SIZE != 0 {
			return Err(PoolError::InvalidConfig(format!(
				"source granularity ({unit}) must be a non-zero multiple of {CHAR_SIZE}"
			)));
		}

		let granularity = config
			.min_chunk_size
			.checked_add(S::HEADER_SIZE)
			.and_then(|bytes| round_up(bytes, unit))
			.ok_or_else(|| {
				PoolError::InvalidConfig(format!(
					"min_chunk_size ({}) overflows when rounded to {unit} bytes",
					config.min_chunk_size
				))
			})?;

		Ok(Self {
			next: Cell::new(ptr::null_mut()),
			limit: Cell::new(ptr::null_mut()),
			source: UnsafeCell::new(source),
			granularity,
			config,
			strings: Cell::new(0),
			used_chars: Cell::new(0),
		})
	}

	/// Copies `src` into the pool and appends a NUL terminator.
	///
	/// This is the `[begin, end)` form: the slice is the range, the terminator is not
	/// part of it.
	///
	/// # Errors
	///
	/// `StringTooLong` if `src.len() + 1` exceeds the configured maximum, `OutOfMemory`
	/// if a new chunk was needed and couldn't be obtained. In both cases the pool is
	/// left exactly as it was.
	pub fn alloc_wide(&self, src: &[u16]) -> PoolResult<PoolStr<'_>> {
		let chars = src.len() + 1;
		let dst = self.bump(chars)?;

		unsafe {
			// SAFETY: `dst` is valid for `chars` characters that nobody has seen yet, so it
			// can't overlap `src`, not even when `src` is a string of this pool.
			ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len());

			// Chunks arrive zeroed and this slot was never handed out.
			debug_assert_eq!(*dst.as_ptr().add(src.len()), 0);

			// SAFETY: the characters are initialized and live as long as `self`.
			Ok(PoolStr::from_raw(dst, chars))
		}
	}

	/// Copies the characters of `src` up to its first NUL.
	///
	/// Returns `InvalidArgument` if `src` contains no NUL.
	pub fn alloc_wide_cstr(&self, src: &[u16]) -> PoolResult<PoolStr<'_>> {
		let Some(len) = src.iter().position(|&c| c == 0) else {
			return Err(PoolError::InvalidArgument("source string has no NUL terminator"));
		};
		self.alloc_wide(&src[..len])
	}

	/// Copies the characters in `[begin, end)`.
	///
	/// Null pointers and `begin > end` are reported as `InvalidArgument`.
	///
	/// # Safety
	///
	/// If both pointers are non-null and ordered, they must belong to the same allocation
	/// and every character in `[begin, end)` must be initialized and readable.
	pub unsafe fn alloc_wide_range(&self, begin: *const u16, end: *const u16) -> PoolResult<PoolStr<'_>> {
		if begin.is_null() || end.is_null() {
			return Err(PoolError::InvalidArgument("null string pointer"));
		}
		if begin > end {
			return Err(PoolError::InvalidArgument("string range ends before it begins"));
		}

		// SAFETY: upheld by the caller.
		let src = unsafe { slice::from_raw_parts(begin, end.offset_from(begin) as usize) };
		self.alloc_wide(src)
	}

	/// Copies a NUL-terminated string. A null pointer is reported as `InvalidArgument`.
	///
	/// # Safety
	///
	/// If `src` is non-null, it must point to a readable, NUL-terminated run of characters.
	pub unsafe fn alloc_wide_ptr(&self, src: *const u16) -> PoolResult<PoolStr<'_>> {
		if src.is_null() {
			return Err(PoolError::InvalidArgument("null string pointer"));
		}

		let mut len = 0;
		// SAFETY: upheld by the caller, the scan stops at the terminator.
		while unsafe { *src.add(len) } != 0 {
			len += 1;
		}

		// SAFETY: `[src, src + len)` was just read.
		unsafe { self.alloc_wide_range(src, src.add(len)) }
	}

	/// Encodes `s` as UTF-16 straight into the pool.
	pub fn alloc_str(&self, s: &str) -> PoolResult<PoolStr<'_>> {
		let len = s.encode_utf16().count();
		let dst = self.bump(len + 1)?;

		for (i, unit) in s.encode_utf16().enumerate() {
			// SAFETY: `i < len` and `dst` is valid for `len + 1` fresh characters.
			unsafe { dst.add(i).write(unit) };
		}

		// SAFETY: all `len` characters were written, the terminator was already zero.
		Ok(unsafe { PoolStr::from_raw(dst, len + 1) })
	}

	/// Reserves `chars` characters (terminator included), adding a chunk first if the
	/// current one is too small. Nothing changes if this fails.
	#[inline]
	fn bump(&self, chars: usize) -> PoolResult<NonNull<u16>> {
		if chars > self.config.max_alloc_chars {
			return Err(PoolError::StringTooLong {
				requested: chars,
				max: self.config.max_alloc_chars,
			});
		}

		if self.remaining() < chars {
			self.grow(chars)?;
		}
		debug_assert!(self.remaining() >= chars);

		let start = self.next.get();
		// SAFETY: `[start, start + chars)` is inside the current chunk.
		self.next.set(unsafe { start.add(chars) });
		self.strings.set(self.strings.get() + 1);
		self.used_chars.set(self.used_chars.get() + chars);

		// SAFETY: there is a current chunk now, so `start` isn't null.
		Ok(unsafe { NonNull::new_unchecked(start) })
	}

	/// Adds a chunk big enough for `chars` characters and makes it the current one.
	/// Whatever was left in the previous chunk is abandoned.
	#[cold]
	#[inline(never)]
	fn grow(&self, chars: usize) -> PoolResult<()> {
		// `chars` is bounded by `max_alloc_chars`, whose byte size was checked not to overflow.
		let needed = chars * CHAR_SIZE + S::HEADER_SIZE;
		let size = round_up(needed, self.granularity).ok_or(PoolError::out_of_memory(needed))?;

		// SAFETY: the pool isn't `Sync` and no other reference to the source is alive
		// while an allocation is running.
		let source = unsafe { &mut *self.source.get() };
		let area = source.allocate_chunk(size)?;
		debug_assert!(area.len() >= chars);

		let start = area.cast::<u16>().as_ptr();
		self.next.set(start);
		// SAFETY: one past the end of the character area.
		self.limit.set(unsafe { start.add(area.len()) });

		debug!(
			backend = core::any::type_name::<S>(),
			chunk = source.chunk_count(),
			size,
			chars = area.len(),
			"added pool chunk"
		);
		Ok(())
	}

	fn source(&self) -> &S {
		// SAFETY: mutable access to the source only happens inside `grow`, which never
		// runs while this borrow is alive.
		unsafe { &*self.source.get() }
	}

	/// Characters still free in the current chunk. Zero before the first allocation.
	pub fn remaining(&self) -> usize {
		(self.limit.get().addr() - self.next.get().addr()) / CHAR_SIZE
	}

	pub fn chunk_count(&self) -> usize {
		self.source().chunk_count()
	}

	/// Returns true until the first chunk is obtained.
	pub fn is_empty(&self) -> bool {
		self.chunk_count() == 0
	}

	/// The chunk unit of this pool, in bytes.
	pub fn granularity(&self) -> usize {
		self.granularity
	}

	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	pub fn stats(&self) -> PoolStats {
		let source = self.source();
		PoolStats {
			chunks: source.chunk_count(),
			reserved_bytes: source.reserved_bytes(),
			strings: self.strings.get(),
			used_chars: self.used_chars.get(),
		}
	}

	/// Releases every chunk and makes the pool empty again.
	///
	/// Taking `&mut self` guarantees that no string of this pool is still borrowed.
	pub fn reset(&mut self) {
		let released = self.source.get_mut().chunk_count();
		self.source.get_mut().release_all();
		self.next.set(ptr::null_mut());
		self.limit.set(ptr::null_mut());
		self.strings.set(0);
		self.used_chars.set(0);

		if released > 0 {
			trace!(released, "released pool chunks");
		}
	}

	/// Tears the pool down, releasing every chunk, and returns what it held.
	pub fn destroy(mut self) -> PoolStats {
		let stats = self.stats();
		self.reset();
		stats
	}
}

impl<S: ChunkSource> Drop for Pool<S> {
	fn drop(&mut self) {
		self.reset();
	}
}

// No string can be borrowed from a pool that is being moved, and the chunks themselves are
// owned by the source.
unsafe impl<S: ChunkSource + Send> Send for Pool<S> {}

impl<S: ChunkSource + Default> Default for Pool<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: ChunkSource> Debug for Pool<S> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		let stats = self.stats();
		write!(
			f,
			"String pool with {} chunks ({} bytes, unit of {} bytes)",
			stats.chunks, stats.reserved_bytes, self.granularity
		)?;
		if stats.chunks == 0 {
			return Ok(());
		}
		write!(
			f,
			"\n\t{} strings in {} characters\n\t{} characters free in the current chunk",
			stats.strings,
			stats.used_chars,
			self.remaining()
		)
	}
}
