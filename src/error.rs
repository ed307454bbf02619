use thiserror::Error;

/// Result type returned by every fallible pool operation.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors reported by the pool and its chunk sources.
///
/// A failed call never hands out a partial string and never moves the pool's cursors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
	/// A null pointer or a reversed `[begin, end)` range was passed in.
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),

	/// The string (terminator included) is longer than the pool accepts in one call.
	#[error("string too long: {requested} characters requested, at most {max} allowed")]
	StringTooLong { requested: usize, max: usize },

	/// The backend could not produce a chunk of `requested` bytes.
	#[error("out of memory: failed to obtain a chunk of {requested} bytes")]
	OutOfMemory { requested: usize },

	#[error("invalid pool configuration: {0}")]
	InvalidConfig(String),
}

impl PoolError {
	pub(crate) fn out_of_memory(requested: usize) -> Self {
		Self::OutOfMemory { requested }
	}
}
