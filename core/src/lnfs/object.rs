//! The in-memory object: the winning header for one object id plus the
//! object ids of its children, both derived once at mount. Children
//! membership is *derived* from the final winning headers, not accumulated
//! incrementally while scanning.

use super::header::ObjectHeader;

#[derive(Debug, Clone)]
pub struct Object {
	pub object_id: u32,
	pub header: ObjectHeader,
	pub sequence_number: u32,
	pub children: Vec<u32>,
}
