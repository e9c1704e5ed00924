//! The filesystem facade: the uniform operation set both engines implement,
//! consumed by the FUSE bridge.

use crate::error::Error;

/// The external "root" sentinel the FUSE bridge uses for the mountpoint's
/// top-level inode. Both engines map it to their own root (ext2 inode `2`,
/// LNFS object `1`).
pub const ROOT_INO: u64 = 1;

/// The kind of file a directory entry refers to, used to set the mode bits
/// the kernel sees without requiring a full `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
	Directory,
	RegularFile,
}

/// Engine-agnostic attribute record.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
	pub ino: u64,
	pub mode: u32,
	pub nlink: u32,
	pub uid: u32,
	pub gid: u32,
	pub size: u64,
	pub blksize: u32,
	pub blocks: u64,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
}

/// One entry produced by `readdir`.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub ino: u64,
	pub name: Vec<u8>,
	pub kind: FileKind,
	/// Opaque cookie a caller passes back as `readdir`'s `offset` to resume
	/// immediately after this entry.
	pub cookie: u64,
}

/// `statfs` reply.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
	pub bsize: u32,
	pub frsize: u32,
	pub blocks: u64,
	pub bfree: u64,
	pub bavail: u64,
	pub files: u64,
	pub ffree: u64,
	pub namemax: u32,
	pub fsid: u32,
}

/// The read-only filesystem capability shared by both engines. Each engine
/// supplies its own `Handle` type for the state cached between `open` and
/// `release`.
pub trait Filesystem {
	type Handle;

	fn stat(&self, ino: u64) -> Result<Stat, Error>;
	fn lookup(&self, parent: u64, name: &[u8]) -> Result<Stat, Error>;
	fn readdir(&self, ino: u64, offset: u64, cap: usize) -> Result<Vec<DirEntry>, Error>;
	fn open(&self, ino: u64) -> Result<Self::Handle, Error>;
	fn read(&self, handle: &Self::Handle, offset: u64, len: usize) -> Result<Vec<u8>, Error>;
	fn release(&self, handle: Self::Handle) -> Result<(), Error>;
	fn statfs(&self) -> Result<StatFs, Error>;
}

/// The encoded size of one directory entry reply, mirroring libfuse's
/// `fuse_add_direntry` sizing: a fixed header plus the name, rounded up to
/// an 8-byte boundary. Used by both engines' `readdir` to decide when the
/// next entry would overflow the caller's `cap`.
pub fn dirent_size(name_len: usize) -> usize {
	const FUSE_NAME_OFFSET: usize = 24;
	(FUSE_NAME_OFFSET + name_len + 7) & !7
}
