//! The byte I/O layer: positional, synchronous reads against an opened
//! image.
//!
//! `ImageIo` is implemented with `pread`-style positional reads
//! (`FileExt::read_exact_at`) rather than `Seek`+`read`: no shared
//! file-position state, so a single handle can be read from multiple
//! threads without a mutex.

use crate::error::Error;
use std::fs::File;
use std::os::unix::fs::FileExt;

/// Random-access read primitive shared by both engines.
pub trait ImageIo: Send + Sync {
	/// Reads exactly `buf.len()` bytes starting at byte offset `offset`.
	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error>;

	/// Returns the total size of the image in bytes.
	fn size(&self) -> Result<u64, Error>;

	/// Reads exactly `len` bytes starting at byte offset `offset`.
	fn read_exact(&self, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
		let mut buf = vec![0u8; len];
		self.read_exact_at(offset, &mut buf)?;
		Ok(buf)
	}
}

impl ImageIo for File {
	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		FileExt::read_exact_at(self, buf, offset).map_err(Error::from)
	}

	fn size(&self) -> Result<u64, Error> {
		utils::disk::size_of_open(self).map_err(Error::from)
	}
}

/// An in-memory image, used by tests to stand in for a disk/NAND image.
#[derive(Debug, Clone, Default)]
pub struct MemImage(pub Vec<u8>);

impl ImageIo for MemImage {
	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
		let start = offset as usize;
		let end = start
			.checked_add(buf.len())
			.filter(|&end| end <= self.0.len())
			.ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)))?;
		buf.copy_from_slice(&self.0[start..end]);
		Ok(())
	}

	fn size(&self) -> Result<u64, Error> {
		Ok(self.0.len() as u64)
	}
}
