//! Block group descriptors.

use crate::error::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// On-disk size of one group descriptor.
pub const GROUP_DESC_SIZE: u64 = 32;

#[derive(Debug, Clone, Copy)]
pub struct GroupDescriptor {
	/// First block of this group's inode table.
	pub inode_table: u32,
}

impl GroupDescriptor {
	pub fn decode(buf: &[u8]) -> Result<Self, Error> {
		if buf.len() < GROUP_DESC_SIZE as usize {
			return Err(Error::Corrupt("group descriptor truncated".to_owned()));
		}
		let mut r = Cursor::new(buf);
		let _block_bitmap = r.read_u32::<LittleEndian>()?;
		let _inode_bitmap = r.read_u32::<LittleEndian>()?;
		let inode_table = r.read_u32::<LittleEndian>()?;
		Ok(Self { inode_table })
	}
}
