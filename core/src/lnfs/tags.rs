//! Per-chunk out-of-band tags, stored in the spare area that follows each
//! page's data region.

use crate::error::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// On-disk size of one tags record.
pub const TAGS_SIZE: usize = 64;

/// A sequence number of all-ones marks a chunk that was never written (an
/// erased page).
pub const SEQUENCE_NUMBER_ERASED: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct Tags {
	pub sequence_number: u32,
	pub object_id: u32,
	pub chunk_id: u32,
	pub byte_count: u32,
}

impl Tags {
	pub fn decode(buf: &[u8]) -> Result<Self, Error> {
		if buf.len() < TAGS_SIZE {
			return Err(Error::Corrupt("tags record truncated".to_owned()));
		}
		let mut r = Cursor::new(buf);
		let sequence_number = r.read_u32::<LittleEndian>()?;
		let object_id = r.read_u32::<LittleEndian>()?;
		let chunk_id = r.read_u32::<LittleEndian>()?;
		let byte_count = r.read_u32::<LittleEndian>()?;
		Ok(Self {
			sequence_number,
			object_id,
			chunk_id,
			byte_count,
		})
	}

	/// Whether this chunk was never written.
	pub fn is_erased(&self) -> bool {
		self.sequence_number == SEQUENCE_NUMBER_ERASED
	}

	/// Whether this chunk carries an object header (as opposed to file data).
	pub fn is_header(&self) -> bool {
		!self.is_erased() && self.chunk_id == 0
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn encode(sequence_number: u32, object_id: u32, chunk_id: u32, byte_count: u32) -> Vec<u8> {
		let mut buf = vec![0u8; TAGS_SIZE];
		buf[0..4].copy_from_slice(&sequence_number.to_le_bytes());
		buf[4..8].copy_from_slice(&object_id.to_le_bytes());
		buf[8..12].copy_from_slice(&chunk_id.to_le_bytes());
		buf[12..16].copy_from_slice(&byte_count.to_le_bytes());
		buf
	}

	#[test]
	fn decodes_fields() {
		let buf = encode(7, 42, 0, 294);
		let tags = Tags::decode(&buf).unwrap();
		assert_eq!(tags.sequence_number, 7);
		assert_eq!(tags.object_id, 42);
		assert!(tags.is_header());
		assert!(!tags.is_erased());
	}

	#[test]
	fn erased_chunk_is_detected() {
		let buf = encode(SEQUENCE_NUMBER_ERASED, 0, 0, 0);
		let tags = Tags::decode(&buf).unwrap();
		assert!(tags.is_erased());
		assert!(!tags.is_header());
	}
}
