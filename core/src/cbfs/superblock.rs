//! The ext2 superblock, decoded explicitly as little-endian rather than via
//! a `#[repr(C, packed)]` transmute, so no decoder here relies on host
//! endianness or compiler struct layout.

use crate::error::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Byte offset of the superblock from the start of the image.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Size in bytes of the superblock region read at mount.
pub const SUPERBLOCK_SIZE: usize = 1024;
/// The ext2 signature.
pub const EXT2_SIGNATURE: u16 = 0xef53;

#[derive(Debug, Clone)]
pub struct Superblock {
	pub inodes_count: u32,
	pub blocks_count: u32,
	pub r_blocks_count: u32,
	pub free_blocks_count: u32,
	pub free_inodes_count: u32,
	pub log_block_size: u32,
	pub log_frag_size: u32,
	pub blocks_per_group: u32,
	pub inodes_per_group: u32,
	pub magic: u16,
	pub inode_size: u16,
}

impl Superblock {
	/// Decodes a superblock from the 1024-byte region at
	/// [`SUPERBLOCK_OFFSET`].
	pub fn decode(buf: &[u8]) -> Result<Self, Error> {
		let mut r = Cursor::new(buf);

		let inodes_count = r.read_u32::<LittleEndian>()?;
		let blocks_count = r.read_u32::<LittleEndian>()?;
		let r_blocks_count = r.read_u32::<LittleEndian>()?;
		let free_blocks_count = r.read_u32::<LittleEndian>()?;
		let free_inodes_count = r.read_u32::<LittleEndian>()?;
		let _first_data_block = r.read_u32::<LittleEndian>()?;
		let log_block_size = r.read_u32::<LittleEndian>()?;
		let log_frag_size = r.read_u32::<LittleEndian>()?;
		let blocks_per_group = r.read_u32::<LittleEndian>()?;
		let _frags_per_group = r.read_u32::<LittleEndian>()?;
		let inodes_per_group = r.read_u32::<LittleEndian>()?;
		let _mtime = r.read_u32::<LittleEndian>()?;
		let _wtime = r.read_u32::<LittleEndian>()?;
		let _mnt_count = r.read_u16::<LittleEndian>()?;
		let _max_mnt_count = r.read_u16::<LittleEndian>()?;
		let magic = r.read_u16::<LittleEndian>()?;

		if magic != EXT2_SIGNATURE {
			return Err(Error::Corrupt(format!(
				"bad ext2 signature: {magic:#06x}, expected {EXT2_SIGNATURE:#06x}"
			)));
		}

		let _state = r.read_u16::<LittleEndian>()?;
		let _errors = r.read_u16::<LittleEndian>()?;
		let _minor_rev_level = r.read_u16::<LittleEndian>()?;
		let _lastcheck = r.read_u32::<LittleEndian>()?;
		let _checkinterval = r.read_u32::<LittleEndian>()?;
		let _creator_os = r.read_u32::<LittleEndian>()?;
		let _rev_level = r.read_u32::<LittleEndian>()?;
		let _def_resuid = r.read_u16::<LittleEndian>()?;
		let _def_resgid = r.read_u16::<LittleEndian>()?;

		// Dynamic-revision extended fields.
		let _first_ino = r.read_u32::<LittleEndian>()?;
		let inode_size = r.read_u16::<LittleEndian>()?;

		if inode_size == 0 {
			return Err(Error::Corrupt("inode size is zero".to_owned()));
		}
		if blocks_per_group == 0 {
			return Err(Error::Corrupt("blocks_per_group is zero".to_owned()));
		}
		if inodes_per_group == 0 {
			return Err(Error::Corrupt("inodes_per_group is zero".to_owned()));
		}
		// Bounds the `1024 << log_*` shifts below away from overflow; no real
		// ext2 block or fragment size ever approaches this.
		if log_block_size > 16 {
			return Err(Error::Corrupt(format!("log_block_size {log_block_size} out of range")));
		}
		if log_frag_size > 16 {
			return Err(Error::Corrupt(format!("log_frag_size {log_frag_size} out of range")));
		}

		Ok(Self {
			inodes_count,
			blocks_count,
			r_blocks_count,
			free_blocks_count,
			free_inodes_count,
			log_block_size,
			log_frag_size,
			blocks_per_group,
			inodes_per_group,
			magic,
			inode_size,
		})
	}

	/// `block_size = 1024 << log_block_size`.
	pub fn block_size(&self) -> u64 {
		1024u64 << self.log_block_size
	}

	/// `frag_size = 1024 << log_frag_size`.
	pub fn frag_size(&self) -> u64 {
		1024u64 << self.log_frag_size
	}

	/// `ngroups = ceil(blocks_count / blocks_per_group)`.
	pub fn ngroups(&self) -> u32 {
		utils::util::ceil_division(self.blocks_count as u64, self.blocks_per_group as u64) as u32
	}
}
