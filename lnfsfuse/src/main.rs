//! `lnfsfuse` mounts an LNFS (YAFFS2-like) image read-only through FUSE.
//!
//! Usage: `lnfsfuse -a <device> <mountpoint> [-o allow_other]`

use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
	FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
	ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use rofs_core::facade::{FileKind, Stat};
use rofs_core::lnfs::{LnfsEngine, LnfsHandle};
use rofs_core::{Error, Filesystem as CoreFilesystem};

const ATTR_TTL: Duration = Duration::from_secs(1);

struct Args {
	prog: String,
	device_path: Option<PathBuf>,
	mountpoint: Option<PathBuf>,
	allow_other: bool,
}

fn parse_args() -> Args {
	let mut iter = env::args();
	let prog = iter.next().unwrap_or_else(|| "lnfsfuse".to_owned());

	let mut device_path = None;
	let mut mountpoint = None;
	let mut allow_other = false;
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-a" => device_path = iter.next().map(PathBuf::from),
			"-o" if iter.clone().next().as_deref() == Some("allow_other") => {
				iter.next();
				allow_other = true;
			}
			_ => {
				mountpoint.get_or_insert_with(|| PathBuf::from(&arg));
			}
		};
	}

	Args {
		prog,
		device_path,
		mountpoint,
		allow_other,
	}
}

fn to_attr(stat: &Stat, kind: FileType) -> FileAttr {
	FileAttr {
		ino: stat.ino,
		size: stat.size,
		blocks: stat.blocks,
		atime: UNIX_EPOCH + Duration::from_secs(stat.atime as u64),
		mtime: UNIX_EPOCH + Duration::from_secs(stat.mtime as u64),
		ctime: UNIX_EPOCH + Duration::from_secs(stat.ctime as u64),
		crtime: UNIX_EPOCH,
		kind,
		perm: (stat.mode & 0o7777) as u16,
		nlink: stat.nlink,
		uid: stat.uid,
		gid: stat.gid,
		rdev: 0,
		blksize: stat.blksize,
		flags: 0,
	}
}

fn kind_of(mode: u32) -> FileType {
	if mode & 0o170000 == 0o040000 {
		FileType::Directory
	} else {
		FileType::RegularFile
	}
}

struct LnfsFuse {
	engine: LnfsEngine<File>,
	handles: HashMap<u64, LnfsHandle>,
	next_fh: u64,
}

impl LnfsFuse {
	fn new(engine: LnfsEngine<File>) -> Self {
		Self {
			engine,
			handles: HashMap::new(),
			next_fh: 1,
		}
	}
}

impl Filesystem for LnfsFuse {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.engine.lookup(parent, name.as_bytes()) {
			Ok(stat) => reply.entry(&ATTR_TTL, &to_attr(&stat, kind_of(stat.mode)), 0),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
		match self.engine.stat(ino) {
			Ok(stat) => reply.attr(&ATTR_TTL, &to_attr(&stat, kind_of(stat.mode))),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn readlink(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyData) {
		reply.error(Error::Unsupported("readlink").errno());
	}

	fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
		match self.engine.open(ino) {
			Ok(handle) => {
				let fh = self.next_fh;
				self.next_fh += 1;
				self.handles.insert(fh, handle);
				reply.opened(fh, 0);
			}
			Err(e) => reply.error(e.errno()),
		}
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let Some(handle) = self.handles.get(&fh) else {
			reply.error(libc::EBADF);
			return;
		};
		match self.engine.read(handle, offset as u64, size as usize) {
			Ok(data) => reply.data(&data),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn release(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		fh: u64,
		_flags: i32,
		_lock_owner: Option<u64>,
		_flush: bool,
		reply: ReplyEmpty,
	) {
		if let Some(handle) = self.handles.remove(&fh) {
			let _ = self.engine.release(handle);
		}
		reply.ok();
	}

	fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		reply.opened(0, 0);
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		let entries = match self.engine.readdir(ino, offset as u64, usize::MAX) {
			Ok(entries) => entries,
			Err(e) => {
				reply.error(e.errno());
				return;
			}
		};

		for entry in entries {
			let kind = match entry.kind {
				FileKind::Directory => FileType::Directory,
				FileKind::RegularFile => FileType::RegularFile,
			};
			let name = OsStr::new(std::str::from_utf8(&entry.name).unwrap_or(""));
			if reply.add(entry.ino, entry.cookie as i64, kind, name) {
				break;
			}
		}
		reply.ok();
	}

	fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
		reply.ok();
	}

	fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
		match self.engine.statfs() {
			Ok(stat) => reply.statfs(
				stat.blocks,
				stat.bfree,
				stat.bavail,
				stat.files,
				stat.ffree,
				stat.bsize,
				stat.namemax,
				stat.frsize,
			),
			Err(e) => reply.error(e.errno()),
		}
	}
}

fn main() {
	let args = parse_args();

	let device_path = args.device_path.unwrap_or_else(|| {
		eprintln!("{}: specify a device with -a <device>", args.prog);
		exit(1);
	});
	let mountpoint = args.mountpoint.unwrap_or_else(|| {
		eprintln!("Usage: {} -a <device> <mountpoint> [options...]", args.prog);
		exit(1);
	});

	let file = File::open(&device_path).unwrap_or_else(|e| {
		eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
		exit(2);
	});

	let engine = LnfsEngine::mount(file).unwrap_or_else(|e: Error| {
		eprintln!("{}: could not scan device: {}", args.prog, e);
		exit(3);
	});

	let mut options = vec![MountOption::RO, MountOption::FSName("lnfs".to_owned())];
	if args.allow_other {
		options.push(MountOption::AllowOther);
	}

	println!("mounting {} on {}", device_path.display(), mountpoint.display());
	if let Err(e) = fuser::mount2(LnfsFuse::new(engine), &mountpoint, &options) {
		eprintln!("{}: {}", args.prog, e);
		exit(1);
	}
}
