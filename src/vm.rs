use core::fmt::{self, Debug, Formatter};
use core::ptr::NonNull;

use tracing::{trace, warn};

use crate::source::{CHAR_SIZE, ChunkSource};
use crate::{PoolError, PoolResult};

/// Sits at the start of every mapped chunk. The chunks form a singly-linked list from
/// the newest chunk back to the first one, so no separate index is needed.
///
/// ```text
/// +------------+
/// |    prev    |  previous chunk's header (None for the first chunk)
/// +------------+
/// |    size    |  total bytes of this chunk, header included
/// +------------+
/// |  u16 ...   |  character area handed to the pool
/// +------------+
/// ```
#[repr(C)]
#[derive(Clone, Copy)]
struct ChunkHeader {
	prev: Option<NonNull<ChunkHeader>>,
	size: usize,
}

const _: () = assert!(size_of::<ChunkHeader>() % align_of::<u16>() == 0);

#[cfg(unix)]
mod sys {
	use core::ptr::{self, NonNull};
	use std::io;

	/// Returns the system page size, falling back to 4KB if `sysconf` can't tell.
	pub(super) fn granularity() -> usize {
		// SAFETY: sysconf has no preconditions.
		let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
		if size > 0 { size as usize } else { 4096 }
	}

	pub(super) fn map(size: usize) -> io::Result<NonNull<u8>> {
		// SAFETY: a private anonymous mapping doesn't touch any existing memory.
		let addr = unsafe {
			libc::mmap(
				ptr::null_mut(),
				size,
				libc::PROT_READ | libc::PROT_WRITE,
				libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
				-1,
				0,
			)
		};
		if addr == libc::MAP_FAILED {
			return Err(io::Error::last_os_error());
		}
		NonNull::new(addr.cast()).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
	}

	/// # Safety
	/// `addr` and `size` must describe exactly one mapping returned by `map`.
	pub(super) unsafe fn unmap(addr: NonNull<u8>, size: usize) -> io::Result<()> {
		// SAFETY: guaranteed by the caller.
		match unsafe { libc::munmap(addr.as_ptr().cast(), size) } {
			0 => Ok(()),
			_ => Err(io::Error::last_os_error()),
		}
	}
}

#[cfg(windows)]
mod sys {
	use core::ptr::{self, NonNull};
	use std::io;

	use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
	use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
	use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

	/// Returns the allocation granularity (usually 64KB), the unit `VirtualAlloc` reserves in.
	pub(super) fn granularity() -> usize {
		// SAFETY: SYSTEM_INFO is plain data, and all zeroes is a valid value.
		let mut si: SYSTEM_INFO = unsafe { std::mem::zeroed() };
		// SAFETY: `si` is a valid out parameter.
		unsafe { GetSystemInfo(&mut si) };
		match si.dwAllocationGranularity {
			0 => 64 * 1024,
			n => n as usize,
		}
	}

	pub(super) fn map(size: usize) -> io::Result<NonNull<u8>> {
		// SAFETY: a fresh reservation doesn't touch any existing memory.
		let addr = unsafe { VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
		NonNull::new(addr.cast()).ok_or_else(io::Error::last_os_error)
	}

	/// # Safety
	/// `addr` must be the base of exactly one region returned by `map`.
	pub(super) unsafe fn unmap(addr: NonNull<u8>, _size: usize) -> io::Result<()> {
		// MEM_RELEASE takes a size of zero and frees the whole reservation.
		// SAFETY: guaranteed by the caller.
		match unsafe { VirtualFree(addr.as_ptr().cast(), 0, MEM_RELEASE) } {
			0 => Err(io::Error::last_os_error()),
			_ => Ok(()),
		}
	}
}

/// A chunk source that maps pages straight from the operating system: anonymous `mmap`
/// on unix, `VirtualAlloc` on Windows.
///
/// Fresh mappings are zero-filled by the kernel, so chunks need no clearing.
pub struct VmSource {
	current: Option<NonNull<ChunkHeader>>,
	page_size: usize,
	chunks: usize,
	reserved: usize,
}

impl VmSource {
	#[must_use]
	pub fn new() -> Self {
		Self {
			current: None,
			page_size: sys::granularity(),
			chunks: 0,
			reserved: 0,
		}
	}
}

impl Default for VmSource {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for VmSource {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("VmSource")
			.field("page_size", &self.page_size)
			.field("chunks", &self.chunks)
			.field("reserved", &self.reserved)
			.finish()
	}
}

// The mappings are owned by this source alone, and nothing points into them until the
// pool starts handing out strings, which borrow the pool and so pin it to one thread.
unsafe impl Send for VmSource {}

// SAFETY: anonymous mappings are page-aligned and zero-filled, and are only unmapped in
// `release_all`, which visits each header once.
unsafe impl ChunkSource for VmSource {
	const HEADER_SIZE: usize = size_of::<ChunkHeader>();

	fn granularity(&self) -> usize {
		self.page_size
	}

	fn allocate_chunk(&mut self, size: usize) -> PoolResult<NonNull<[u16]>> {
		if size < Self::HEADER_SIZE + CHAR_SIZE {
			return Err(PoolError::out_of_memory(size));
		}

		let header = match sys::map(size) {
			Ok(addr) => addr.cast::<ChunkHeader>(),
			Err(error) => {
				warn!(size, %error, "mapping a chunk failed");
				return Err(PoolError::out_of_memory(size));
			}
		};

		unsafe {
			// SAFETY: the mapping is page-aligned and at least `HEADER_SIZE` bytes long.
			header.write(ChunkHeader {
				prev: self.current,
				size,
			});

			self.current = Some(header);
			self.chunks += 1;
			self.reserved += size;

			// SAFETY: the character area starts right after the header and ends with the mapping.
			let chars = header.add(1).cast::<u16>();
			Ok(NonNull::slice_from_raw_parts(chars, (size - Self::HEADER_SIZE) / CHAR_SIZE))
		}
	}

	fn chunk_count(&self) -> usize {
		self.chunks
	}

	fn reserved_bytes(&self) -> usize {
		self.reserved
	}

	fn release_all(&mut self) {
		let mut released = 0;

		while let Some(header) = self.current {
			// The header lives inside the mapping, so copy it out before unmapping.
			// SAFETY: `header` is the start of a live mapping written by `allocate_chunk`.
			let ChunkHeader { prev, size } = unsafe { header.read() };

			// SAFETY: `header` and `size` describe exactly one mapping, which is dropped from
			// the list below and so never unmapped twice.
			if let Err(error) = unsafe { sys::unmap(header.cast(), size) } {
				warn!(size, %error, "unmapping a chunk failed");
			}

			self.current = prev;
			released += 1;
		}

		debug_assert_eq!(released, self.chunks);
		if released > 0 {
			trace!(released, bytes = self.reserved, "released mapped chunks");
		}
		self.chunks = 0;
		self.reserved = 0;
	}
}

impl Drop for VmSource {
	fn drop(&mut self) {
		self.release_all();
	}
}
