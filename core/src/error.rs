//! Error taxonomy shared by both filesystem engines.
//!
//! Engines return one of these kinds; the facade and the FUSE adapters map
//! them to errno without further interpretation.

use std::fmt;
use std::io;

/// An error produced while decoding an on-disk record or resolving a
/// filesystem operation.
#[derive(Debug)]
pub enum Error {
	/// An inode, object id or directory entry does not exist.
	NotFound,
	/// The backing image could not be read, or returned short.
	Io(io::Error),
	/// A decoded record violates a structural invariant.
	Corrupt(String),
	/// The operation is not implemented by this engine.
	Unsupported(&'static str),
}

impl Error {
	/// Maps this error to the errno it should be surfaced as, per the
	/// propagation policy: `NotFound` -> `ENOENT`, `Io`/`Corrupt` -> `EIO`,
	/// `Unsupported` -> `ENOSYS`.
	pub fn errno(&self) -> i32 {
		match self {
			Self::NotFound => libc::ENOENT,
			Self::Io(_) => libc::EIO,
			Self::Corrupt(_) => libc::EIO,
			Self::Unsupported(_) => libc::ENOSYS,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound => write!(f, "not found"),
			Self::Io(e) => write!(f, "I/O error: {e}"),
			Self::Corrupt(msg) => write!(f, "corrupt filesystem structure: {msg}"),
			Self::Unsupported(op) => write!(f, "unsupported operation: {op}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}
