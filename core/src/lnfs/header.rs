//! The object header, written as the first chunk (`chunk_id == 0`) of every
//! object. This decoder reads fields sequentially with no inter-field
//! padding, so it never relies on a compiler's struct layout.

use crate::error::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Maximum length of a stored name, not counting the terminating NUL.
pub const MAX_NAME_LENGTH: usize = 255;
/// Maximum length of a stored symlink alias, not counting the terminating
/// NUL.
pub const MAX_ALIAS_LENGTH: usize = 159;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
	Unknown,
	File,
	Symlink,
	Directory,
	Hardlink,
	Special,
}

impl ObjectType {
	fn from_u32(v: u32) -> Self {
		match v {
			1 => Self::File,
			2 => Self::Symlink,
			3 => Self::Directory,
			4 => Self::Hardlink,
			5 => Self::Special,
			_ => Self::Unknown,
		}
	}
}

#[derive(Debug, Clone)]
pub struct ObjectHeader {
	pub object_type: ObjectType,
	pub parent_object_id: u32,
	/// Raw name bytes, NUL-terminated on disk; never interpreted beyond
	/// truncating at the first NUL. Names are opaque byte strings, never
	/// charset-converted.
	pub name: Vec<u8>,
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub size: u32,
}

impl ObjectHeader {
	pub fn decode(buf: &[u8]) -> Result<Self, Error> {
		const NAME_FIELD_LEN: usize = MAX_NAME_LENGTH + 1;
		const MIN_LEN: usize = 4 + 4 + 2 + NAME_FIELD_LEN + 4 * 7;
		if buf.len() < MIN_LEN {
			return Err(Error::Corrupt("object header truncated".to_owned()));
		}

		let mut r = Cursor::new(buf);
		let object_type = ObjectType::from_u32(r.read_u32::<LittleEndian>()?);
		let parent_object_id = r.read_u32::<LittleEndian>()?;
		let _sum_obsolete = r.read_u16::<LittleEndian>()?;

		let name_start = 10;
		let name_field = &buf[name_start..name_start + NAME_FIELD_LEN];
		let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(name_field.len());
		let name = name_field[..name_len].to_vec();

		let mut r = Cursor::new(&buf[name_start + NAME_FIELD_LEN..]);
		let mode = r.read_u32::<LittleEndian>()?;
		let uid = r.read_u32::<LittleEndian>()?;
		let gid = r.read_u32::<LittleEndian>()?;
		let atime = r.read_u32::<LittleEndian>()?;
		let mtime = r.read_u32::<LittleEndian>()?;
		let ctime = r.read_u32::<LittleEndian>()?;
		let size = r.read_u32::<LittleEndian>()?;

		Ok(Self {
			object_type,
			parent_object_id,
			name,
			mode,
			uid,
			gid,
			atime,
			mtime,
			ctime,
			size,
		})
	}

	/// The synthetic header assigned to the root object when no on-disk
	/// header for it has yet been observed. The root always exists, even on
	/// an otherwise-empty device.
	pub fn synthetic_root() -> Self {
		Self {
			object_type: ObjectType::Directory,
			parent_object_id: 0,
			name: Vec::new(),
			mode: 0o040755,
			uid: 0,
			gid: 0,
			atime: 0,
			mtime: 0,
			ctime: 0,
			size: 0,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn encode(object_type: u32, parent: u32, name: &[u8], mode: u32, size: u32) -> Vec<u8> {
		let mut buf = vec![0u8; 512];
		buf[0..4].copy_from_slice(&object_type.to_le_bytes());
		buf[4..8].copy_from_slice(&parent.to_le_bytes());
		buf[10..10 + name.len()].copy_from_slice(name);
		let rest = 10 + MAX_NAME_LENGTH + 1;
		buf[rest..rest + 4].copy_from_slice(&mode.to_le_bytes());
		buf[rest + 24..rest + 28].copy_from_slice(&size.to_le_bytes());
		buf
	}

	#[test]
	fn decodes_directory_header() {
		let buf = encode(3, 1, b"subdir", 0o040755, 0);
		let header = ObjectHeader::decode(&buf).unwrap();
		assert_eq!(header.object_type, ObjectType::Directory);
		assert_eq!(header.parent_object_id, 1);
		assert_eq!(header.name, b"subdir");
	}

	#[test]
	fn decodes_file_header_with_size() {
		let buf = encode(1, 5, b"data.bin", 0o100644, 12345);
		let header = ObjectHeader::decode(&buf).unwrap();
		assert_eq!(header.object_type, ObjectType::File);
		assert_eq!(header.size, 12345);
	}

	#[test]
	fn unknown_type_falls_back() {
		let buf = encode(99, 1, b"weird", 0, 0);
		let header = ObjectHeader::decode(&buf).unwrap();
		assert_eq!(header.object_type, ObjectType::Unknown);
	}
}
