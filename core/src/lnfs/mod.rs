//! LNFS: a log-structured NAND flash filesystem, modeled on YAFFS2.

mod engine;
mod header;
mod object;
mod tags;

pub use engine::{LnfsEngine, LnfsHandle};
pub use header::{ObjectHeader, ObjectType};
pub use object::Object;
pub use tags::Tags;
