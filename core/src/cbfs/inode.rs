//! The ext2 inode, decoded byte-by-byte rather than by transmuting a packed
//! struct.

use crate::error::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Number of entries in the block pointer array.
pub const BLOCK_PTRS: usize = 15;
/// Number of direct block pointers (indices `0..12`).
pub const DIRECT_PTRS: usize = 12;
/// Index of the singly-indirect pointer.
pub const SINGLY_INDIRECT: usize = 12;
/// Index of the doubly-indirect pointer.
pub const DOUBLY_INDIRECT: usize = 13;
/// Index of the triply-indirect pointer.
pub const TRIPLY_INDIRECT: usize = 14;

/// The minimum on-disk inode record size this decoder reads. A filesystem
/// with `inode_size > 128` carries extra fields after this; they are not
/// decoded.
pub const INODE_RECORD_SIZE: usize = 128;

#[derive(Debug, Clone)]
pub struct Inode {
	pub mode: u16,
	pub uid: u16,
	pub size: u32,
	pub atime: u32,
	pub ctime: u32,
	pub mtime: u32,
	pub gid: u16,
	pub links_count: u16,
	pub blocks: u32,
	pub block: [u32; BLOCK_PTRS],
}

impl Inode {
	pub fn decode(buf: &[u8]) -> Result<Self, Error> {
		if buf.len() < INODE_RECORD_SIZE {
			return Err(Error::Corrupt("inode record truncated".to_owned()));
		}
		let mut r = Cursor::new(buf);

		let mode = r.read_u16::<LittleEndian>()?;
		let uid = r.read_u16::<LittleEndian>()?;
		let size = r.read_u32::<LittleEndian>()?;
		let atime = r.read_u32::<LittleEndian>()?;
		let ctime = r.read_u32::<LittleEndian>()?;
		let mtime = r.read_u32::<LittleEndian>()?;
		let _dtime = r.read_u32::<LittleEndian>()?;
		let gid = r.read_u16::<LittleEndian>()?;
		let links_count = r.read_u16::<LittleEndian>()?;
		let blocks = r.read_u32::<LittleEndian>()?;
		let _flags = r.read_u32::<LittleEndian>()?;
		let _osd1 = r.read_u32::<LittleEndian>()?;

		let mut block = [0u32; BLOCK_PTRS];
		for slot in &mut block {
			*slot = r.read_u32::<LittleEndian>()?;
		}

		Ok(Self {
			mode,
			uid,
			size,
			atime,
			ctime,
			mtime,
			gid,
			links_count,
			blocks,
			block,
		})
	}

	/// Whether `mode`'s file-type bits mark this inode as a directory
	/// (`S_IFDIR`).
	pub fn is_dir(&self) -> bool {
		const S_IFMT: u16 = 0o170000;
		const S_IFDIR: u16 = 0o040000;
		self.mode & S_IFMT == S_IFDIR
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn encode(mode: u16, size: u32, block: [u32; BLOCK_PTRS]) -> Vec<u8> {
		let mut buf = vec![0u8; INODE_RECORD_SIZE];
		buf[0..2].copy_from_slice(&mode.to_le_bytes());
		buf[4..8].copy_from_slice(&size.to_le_bytes());
		for (i, b) in block.iter().enumerate() {
			let off = 40 + i * 4;
			buf[off..off + 4].copy_from_slice(&b.to_le_bytes());
		}
		buf
	}

	#[test]
	fn decodes_mode_size_and_blocks() {
		let mut blocks = [0u32; BLOCK_PTRS];
		blocks[0] = 10;
		blocks[12] = 99;
		let buf = encode(0o040755, 4096, blocks);
		let inode = Inode::decode(&buf).unwrap();
		assert_eq!(inode.size, 4096);
		assert!(inode.is_dir());
		assert_eq!(inode.block[0], 10);
		assert_eq!(inode.block[SINGLY_INDIRECT], 99);
	}

	#[test]
	fn regular_file_is_not_a_directory() {
		let buf = encode(0o100644, 0, [0u32; BLOCK_PTRS]);
		let inode = Inode::decode(&buf).unwrap();
		assert!(!inode.is_dir());
	}
}
