//! This module implements features common to the filesystem drivers.

pub mod disk;
pub mod util;
