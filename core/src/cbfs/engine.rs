//! The CBFS engine: superblock/group-descriptor load, inode lookup by
//! number, 4-level block-pointer resolution, and directory enumeration.

use super::dirent::{DirEntryIter, FT_DIR};
use super::group::{GroupDescriptor, GROUP_DESC_SIZE};
use super::inode::{Inode, DOUBLY_INDIRECT, SINGLY_INDIRECT, TRIPLY_INDIRECT};
use super::superblock::{Superblock, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
use crate::error::Error;
use crate::facade::{dirent_size, DirEntry, FileKind, Filesystem, Stat, StatFs, ROOT_INO};
use crate::io::ImageIo;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use utils::util::ceil_division;

/// The ext2 root inode number (distinct from the facade's `ROOT_INO`
/// sentinel, which every engine maps to its own root).
pub const ROOT_INODE: u32 = 2;

/// Per-open state: the decoded inode, cached for the lifetime between
/// `open` and `release`.
pub struct CbfsHandle {
	inode: Inode,
}

pub struct CbfsEngine<IO> {
	io: IO,
	superblock: Superblock,
	groups: Vec<GroupDescriptor>,
	block_size: u64,
	inode_size: u64,
}

impl<IO: ImageIo> CbfsEngine<IO> {
	/// Loads the superblock and group-descriptor table. Both are immutable
	/// for the lifetime of the mount.
	pub fn mount(io: IO) -> Result<Self, Error> {
		let sb_buf = io.read_exact(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)?;
		let superblock = Superblock::decode(&sb_buf)?;

		let block_size = superblock.block_size();
		if block_size == 0 || superblock.inode_size as u64 == 0 {
			return Err(Error::Corrupt("invalid block size or inode size".to_owned()));
		}

		let ngroups = superblock.ngroups();
		// Canonical ext2 rule: group descriptors start right after the
		// superblock's own block (block 2 when block_size == 1024, else
		// block 1).
		let bgdt_start_block = if block_size == 1024 { 2 } else { 1 };
		let bgdt_bytes = ngroups as u64 * GROUP_DESC_SIZE;
		let bgdt_blocks = ceil_division(bgdt_bytes, block_size);

		let table = io.read_exact(bgdt_start_block * block_size, (bgdt_blocks * block_size) as usize)?;
		let mut groups = Vec::with_capacity(ngroups as usize);
		for i in 0..ngroups as u64 {
			let off = (i * GROUP_DESC_SIZE) as usize;
			groups.push(GroupDescriptor::decode(&table[off..off + GROUP_DESC_SIZE as usize])?);
		}

		Ok(Self {
			io,
			inode_size: superblock.inode_size as u64,
			block_size,
			superblock,
			groups,
		})
	}

	/// Resolves inode number `n` to its decoded record. The facade's root
	/// sentinel maps to ext2 inode `2`.
	fn read_inode(&self, n: u64) -> Result<Inode, Error> {
		let n: u32 = if n == ROOT_INO {
			ROOT_INODE
		} else {
			u32::try_from(n).map_err(|_| Error::NotFound)?
		};
		if n == 0 || n as u64 > self.superblock.inodes_count as u64 {
			return Err(Error::NotFound);
		}

		let n0 = (n - 1) as u64;
		let group = n0 / self.superblock.inodes_per_group as u64;
		let idx = n0 % self.superblock.inodes_per_group as u64;
		let gd = self
			.groups
			.get(group as usize)
			.ok_or(Error::Corrupt("inode group out of range".to_owned()))?;

		let inodes_per_block = self.block_size / self.inode_size;
		let block = gd.inode_table as u64 + idx / inodes_per_block;
		let byte_off = block * self.block_size + (idx % inodes_per_block) * self.inode_size;

		let buf = self.io.read_exact(byte_off, super::inode::INODE_RECORD_SIZE)?;
		Inode::decode(&buf)
	}

	/// Resolves logical block index `logical` to a physical block number. A
	/// result of `0` denotes a hole.
	fn resolve_block(&self, inode: &Inode, logical: u64) -> Result<u32, Error> {
		let p = self.block_size / 4;

		if logical < 12 {
			return Ok(inode.block[logical as usize]);
		}
		let l = logical - 12;
		if l < p {
			return self.indirect_lookup(inode.block[SINGLY_INDIRECT], l);
		}
		let l = l - p;
		if l < p * p {
			let ind = self.indirect_lookup(inode.block[DOUBLY_INDIRECT], l / p)?;
			return self.indirect_lookup(ind, l % p);
		}
		let l = l - p * p;
		let dind = self.indirect_lookup(inode.block[TRIPLY_INDIRECT], l / (p * p))?;
		let ind = self.indirect_lookup(dind, (l / p) % p)?;
		self.indirect_lookup(ind, l % p)
	}

	/// Reads one pointer at `idx` out of the indirect block `block_ptr`. A
	/// zero `block_ptr` is itself a hole in the pointer tree: it resolves to
	/// `0` (also a hole) without reading anything.
	fn indirect_lookup(&self, block_ptr: u32, idx: u64) -> Result<u32, Error> {
		if block_ptr == 0 {
			return Ok(0);
		}
		let off = block_ptr as u64 * self.block_size + idx * 4;
		let buf = self.io.read_exact(off, 4)?;
		Ok(Cursor::new(buf).read_u32::<LittleEndian>()?)
	}

	/// Reads one data block by logical index, synthesizing a zero block for
	/// holes.
	fn read_logical_block(&self, inode: &Inode, logical: u64) -> Result<Vec<u8>, Error> {
		let physical = self.resolve_block(inode, logical)?;
		if physical == 0 {
			return Ok(vec![0u8; self.block_size as usize]);
		}
		self.io.read_exact(physical as u64 * self.block_size, self.block_size as usize)
	}

	fn stat_from_inode(&self, ino: u64, inode: &Inode) -> Stat {
		Stat {
			ino,
			mode: inode.mode as u32,
			nlink: inode.links_count as u32,
			uid: inode.uid as u32,
			gid: inode.gid as u32,
			size: inode.size as u64,
			blksize: self.block_size as u32,
			blocks: inode.blocks as u64,
			atime: inode.atime,
			mtime: inode.mtime,
			ctime: inode.ctime,
		}
	}

	fn dir_block_count(&self, inode: &Inode) -> u64 {
		ceil_division(inode.size as u64, self.block_size)
	}
}

impl<IO: ImageIo> Filesystem for CbfsEngine<IO> {
	type Handle = CbfsHandle;

	fn stat(&self, ino: u64) -> Result<Stat, Error> {
		let inode = self.read_inode(ino)?;
		Ok(self.stat_from_inode(ino, &inode))
	}

	fn lookup(&self, parent: u64, name: &[u8]) -> Result<Stat, Error> {
		let dir = self.read_inode(parent)?;
		if !dir.is_dir() {
			return Err(Error::NotFound);
		}

		for logical in 0..self.dir_block_count(&dir) {
			let block = self.read_logical_block(&dir, logical)?;
			let remaining = dir.size as u64 - logical * self.block_size;
			let content_len = remaining.min(self.block_size) as usize;

			for entry in DirEntryIter::new(&block, content_len) {
				let entry = entry?;
				if entry.inode != 0 && entry.name == name {
					return self.stat(entry.inode as u64);
				}
			}
		}

		Err(Error::NotFound)
	}

	fn readdir(&self, ino: u64, offset: u64, cap: usize) -> Result<Vec<DirEntry>, Error> {
		let dir = self.read_inode(ino)?;
		if !dir.is_dir() {
			return Err(Error::NotFound);
		}

		let mut out = Vec::new();
		let mut used = 0usize;
		let mut abs_pos = 0u64;

		'blocks: for logical in 0..self.dir_block_count(&dir) {
			let block = self.read_logical_block(&dir, logical)?;
			let remaining = dir.size as u64 - abs_pos;
			let content_len = remaining.min(self.block_size) as usize;

			for entry in DirEntryIter::new(&block, content_len) {
				let entry = entry?;
				let entry_start = abs_pos;
				abs_pos += entry.rec_len as u64;

				if entry.inode == 0 || entry_start < offset {
					continue;
				}

				let size = dirent_size(entry.name.len());
				if used + size > cap {
					break 'blocks;
				}
				used += size;

				let kind = if entry.file_type == FT_DIR {
					FileKind::Directory
				} else {
					// Unknown file types are coerced to regular for
					// enumeration purposes.
					FileKind::RegularFile
				};

				out.push(DirEntry {
					ino: entry.inode as u64,
					name: entry.name.to_vec(),
					kind,
					cookie: abs_pos,
				});
			}
		}

		Ok(out)
	}

	fn open(&self, ino: u64) -> Result<Self::Handle, Error> {
		let inode = self.read_inode(ino)?;
		Ok(CbfsHandle { inode })
	}

	fn read(&self, handle: &Self::Handle, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
		let size = handle.inode.size as u64;
		if offset >= size {
			return Ok(Vec::new());
		}
		let len = len.min((size - offset) as usize);

		let mut out = Vec::with_capacity(len);
		let mut pos = offset;
		while out.len() < len {
			let logical = pos / self.block_size;
			let block_off = (pos % self.block_size) as usize;
			let block = self.read_logical_block(&handle.inode, logical)?;
			let take = (len - out.len()).min(self.block_size as usize - block_off);
			out.extend_from_slice(&block[block_off..block_off + take]);
			pos += take as u64;
		}

		Ok(out)
	}

	fn release(&self, _handle: Self::Handle) -> Result<(), Error> {
		Ok(())
	}

	fn statfs(&self) -> Result<StatFs, Error> {
		Ok(StatFs {
			bsize: self.block_size as u32,
			frsize: self.superblock.frag_size() as u32,
			blocks: self.superblock.blocks_count as u64,
			bfree: self.superblock.free_blocks_count as u64,
			bavail: (self.superblock.free_blocks_count as u64)
				.saturating_sub(self.superblock.r_blocks_count as u64),
			files: self.superblock.inodes_count as u64,
			ffree: self.superblock.free_inodes_count as u64,
			namemax: 255,
			fsid: self.superblock.magic as u32,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::io::MemImage;

	const BLOCK_SIZE: u64 = 4096;
	const INODES_PER_GROUP: u32 = 32;
	const BLOCKS_PER_GROUP: u32 = 256;

	/// Builds a minimal one-group image with a root directory containing
	/// only `.` and `..`.
	struct Builder {
		buf: Vec<u8>,
	}

	impl Builder {
		fn new(nblocks: u64) -> Self {
			Self {
				buf: vec![0u8; (nblocks * BLOCK_SIZE) as usize],
			}
		}

		fn write(&mut self, offset: u64, data: &[u8]) {
			let start = offset as usize;
			self.buf[start..start + data.len()].copy_from_slice(data);
		}

		fn write_superblock(&mut self, inodes_count: u32, blocks_count: u32) {
			let mut sb = vec![0u8; SUPERBLOCK_SIZE];
			sb[0..4].copy_from_slice(&inodes_count.to_le_bytes());
			sb[4..8].copy_from_slice(&blocks_count.to_le_bytes());
			sb[24..28].copy_from_slice(&2u32.to_le_bytes()); // log_block_size -> 4096
			sb[32..36].copy_from_slice(&BLOCKS_PER_GROUP.to_le_bytes());
			sb[40..44].copy_from_slice(&INODES_PER_GROUP.to_le_bytes());
			sb[56..58].copy_from_slice(&super::super::superblock::EXT2_SIGNATURE.to_le_bytes());
			sb[88..90].copy_from_slice(&128u16.to_le_bytes()); // inode_size
			self.write(SUPERBLOCK_OFFSET, &sb);
		}

		fn write_group_desc(&mut self, group_block: u64, inode_table_block: u32) {
			let mut gd = vec![0u8; GROUP_DESC_SIZE as usize];
			gd[8..12].copy_from_slice(&inode_table_block.to_le_bytes());
			self.write(group_block * BLOCK_SIZE, &gd);
		}

		fn write_inode(&mut self, inode_table_block: u32, index: u64, mode: u16, size: u32, block: [u32; 15]) {
			let inodes_per_block = BLOCK_SIZE / 128;
			let block_n = inode_table_block as u64 + index / inodes_per_block;
			let within = (index % inodes_per_block) * 128;
			let mut rec = vec![0u8; 128];
			rec[0..2].copy_from_slice(&mode.to_le_bytes());
			rec[4..8].copy_from_slice(&size.to_le_bytes());
			for (i, b) in block.iter().enumerate() {
				let off = 40 + i * 4;
				rec[off..off + 4].copy_from_slice(&b.to_le_bytes());
			}
			self.write(block_n * BLOCK_SIZE + within, &rec);
		}

		fn write_dir_block(&mut self, block: u32, entries: &[(u32, &[u8], u16, u8)]) {
			let mut content = Vec::new();
			for &(inode, name, rec_len, file_type) in entries {
				let start = content.len();
				content.extend_from_slice(&inode.to_le_bytes());
				content.extend_from_slice(&rec_len.to_le_bytes());
				content.push(name.len() as u8);
				content.push(file_type);
				content.extend_from_slice(name);
				content.resize(start + rec_len as usize, 0);
			}
			self.write(block as u64 * BLOCK_SIZE, &content);
		}

		fn finish(self) -> MemImage {
			MemImage(self.buf)
		}
	}

	fn mount_simple_root() -> CbfsEngine<MemImage> {
		// Layout: block 0 = boot sector, block 1 = group desc table,
		// block 2 = inode table, block 3 = root directory data.
		let mut b = Builder::new(8);
		b.write_superblock(INODES_PER_GROUP, 8);
		b.write_group_desc(1, 2);
		b.write_inode(2, ROOT_INODE as u64 - 1, 0o040755, BLOCK_SIZE as u32, {
			let mut blk = [0u32; 15];
			blk[0] = 3;
			blk
		});
		b.write_dir_block(
			3,
			&[
				(ROOT_INODE, b".", 12, FT_DIR),
				(ROOT_INODE, b"..", (BLOCK_SIZE - 12) as u16, FT_DIR),
			],
		);
		CbfsEngine::mount(b.finish()).unwrap()
	}

	#[test]
	fn root_readdir_lists_dot_entries() {
		let fs = mount_simple_root();
		let entries = fs.readdir(ROOT_INO, 0, 4096).unwrap();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].name, b".");
		assert_eq!(entries[1].name, b"..");
		assert!(entries.iter().all(|e| e.kind == FileKind::Directory));
	}

	#[test]
	fn lookup_miss_returns_not_found() {
		let fs = mount_simple_root();
		assert!(matches!(fs.lookup(ROOT_INO, b"no-such-file"), Err(Error::NotFound)));
	}

	#[test]
	fn deep_file_resolves_through_singly_indirect() {
		// inode with size = 13 blocks: 12 direct + 1 via the indirect block.
		let mut b = Builder::new(20);
		b.write_superblock(INODES_PER_GROUP, 20);
		b.write_group_desc(1, 2);

		let mut blk = [0u32; 15];
		for (i, slot) in blk.iter_mut().take(12).enumerate() {
			*slot = 4 + i as u32;
		}
		blk[SINGLY_INDIRECT] = 16; // indirect block physical location
		b.write_inode(2, 10, 0o100644, 13 * BLOCK_SIZE as u32, blk);

		// Indirect block at physical block 16 has one pointer to block 17 (Y).
		let mut indirect = vec![0u8; BLOCK_SIZE as usize];
		indirect[0..4].copy_from_slice(&17u32.to_le_bytes());
		b.write(16 * BLOCK_SIZE, &indirect);

		let fs = CbfsEngine::mount(b.finish()).unwrap();
		let inode = fs.read_inode(11).unwrap();
		let resolved = fs.resolve_block(&inode, 12).unwrap();
		assert_eq!(resolved, 17);
	}

	#[test]
	fn hole_reads_as_zeros() {
		let mut b = Builder::new(8);
		b.write_superblock(INODES_PER_GROUP, 8);
		b.write_group_desc(1, 2);
		// block[0] == 0 is a hole.
		b.write_inode(2, 10, 0o100644, BLOCK_SIZE as u32, [0u32; 15]);
		let fs = CbfsEngine::mount(b.finish()).unwrap();
		let handle = fs.open(11).unwrap();
		let data = fs.read(&handle, 0, BLOCK_SIZE as usize).unwrap();
		assert!(data.iter().all(|&b| b == 0));
		assert_eq!(data.len(), BLOCK_SIZE as usize);
	}

	#[test]
	fn statfs_reports_superblock_fields() {
		let fs = mount_simple_root();
		let stat = fs.statfs().unwrap();
		assert_eq!(stat.bsize, BLOCK_SIZE as u32);
		assert_eq!(stat.files, INODES_PER_GROUP as u64);
		assert_eq!(stat.namemax, 255);
	}
}
