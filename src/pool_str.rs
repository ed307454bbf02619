use core::fmt::{self, Debug, Display, Formatter, Write};
use core::ops::Deref;
use core::ptr::NonNull;
use core::slice;

/// A string living in a [`Pool`](crate::Pool).
///
/// This is a non-owning view: it is `Copy`, it borrows the pool, and it stays valid
/// (and unchanged) for as long as that borrow lasts. The characters are followed by a
/// NUL terminator, so [`as_ptr`](PoolStr::as_ptr) can be handed to APIs expecting a
/// NUL-terminated wide string.
///
/// Comparison is ordinal over every character, so unlike `wcscmp` it doesn't stop at an
/// embedded NUL.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolStr<'a> {
	// Terminator included, so the slice is never empty.
	chars: &'a [u16],
}

impl<'a> PoolStr<'a> {
	/// # Safety
	///
	/// `ptr` must be valid for reads of `len_with_nul` initialized characters for `'a`,
	/// nothing may write to them during `'a`, and the last one must be zero.
	pub(crate) unsafe fn from_raw(ptr: NonNull<u16>, len_with_nul: usize) -> Self {
		debug_assert!(len_with_nul > 0);
		Self {
			// SAFETY: upheld by the caller.
			chars: unsafe { slice::from_raw_parts(ptr.as_ptr(), len_with_nul) },
		}
	}

	/// The characters, without the terminator.
	pub fn as_wide(&self) -> &'a [u16] {
		&self.chars[..self.len()]
	}

	/// The characters followed by their NUL terminator.
	pub fn as_wide_with_nul(&self) -> &'a [u16] {
		self.chars
	}

	/// Pointer to the first character of the NUL-terminated string.
	pub fn as_ptr(&self) -> *const u16 {
		self.chars.as_ptr()
	}

	/// Length in characters, without the terminator.
	pub fn len(&self) -> usize {
		self.chars.len() - 1
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Decodes the string, replacing unpaired surrogates with U+FFFD.
	pub fn to_string_lossy(&self) -> String {
		String::from_utf16_lossy(self.as_wide())
	}

	fn decode(&self) -> impl Iterator<Item = char> + 'a {
		char::decode_utf16(self.as_wide().iter().copied()).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
	}
}

impl Deref for PoolStr<'_> {
	type Target = [u16];

	fn deref(&self) -> &[u16] {
		self.as_wide()
	}
}

impl AsRef<[u16]> for PoolStr<'_> {
	fn as_ref(&self) -> &[u16] {
		self.as_wide()
	}
}

impl Display for PoolStr<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		self.decode().try_for_each(|c| f.write_char(c))
	}
}

impl Debug for PoolStr<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		Debug::fmt(&self.to_string_lossy(), f)
	}
}

impl PartialEq<[u16]> for PoolStr<'_> {
	fn eq(&self, other: &[u16]) -> bool {
		self.as_wide() == other
	}
}

impl PartialEq<str> for PoolStr<'_> {
	fn eq(&self, other: &str) -> bool {
		self.as_wide().iter().copied().eq(other.encode_utf16())
	}
}

impl PartialEq<&str> for PoolStr<'_> {
	fn eq(&self, other: &&str) -> bool {
		*self == **other
	}
}
