//! CBFS: a classic Unix-style indirect-block filesystem, modeled on ext2.

mod dirent;
mod engine;
mod group;
mod inode;
mod superblock;

pub use engine::{CbfsEngine, CbfsHandle};
pub use group::GroupDescriptor;
pub use inode::Inode;
pub use superblock::Superblock;
