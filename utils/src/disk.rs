//! Implements disk-related utility functions.

use libc::ioctl;
use std::ffi::c_long;
use std::fs::File;
use std::io;
use std::io::Error;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// ioctl macro: Command.
macro_rules! ioc {
	($a:expr, $b:expr, $c:expr, $d:expr) => {
		(($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
	};
}

/// ioctl macro: Read command.
macro_rules! ior {
	($a:expr, $b:expr, $c:ty) => {
		ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
	};
}

/// ioctl command: Get size of disk in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// Returns the size in bytes of the image at `path`.
///
/// Regular files are sized with `stat`; block and character devices are
/// sized with `BLKGETSIZE64`, since their apparent file size is not
/// meaningful.
pub fn get_image_size(path: &Path) -> io::Result<u64> {
	let dev = File::open(path)?;
	size_of_open(&dev)
}

/// Returns the size in bytes of an already-open image file, without
/// reopening it. Useful when the caller already holds the handle it reads
/// the image through.
pub fn size_of_open(dev: &File) -> io::Result<u64> {
	let file_type = dev.metadata()?.file_type();

	if file_type.is_block_device() || file_type.is_char_device() {
		let mut size: u64 = 0;

		let ret = unsafe { ioctl(dev.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
		if ret < 0 {
			return Err(Error::last_os_error());
		}

		Ok(size)
	} else {
		Ok(dev.metadata()?.len())
	}
}
