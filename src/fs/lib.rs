//! Core filesystem implementation: block I/O, on-disk records, the live
//! object graph, path resolution, and mount/unmount.
//!
//! This crate has no knowledge of FUSE; the binary crate's `vfs` module
//! adapts [`superblock::Filesystem`] to `fuser::Filesystem`.

pub mod aligned_io;
pub mod bitmap;
pub mod device;
pub mod errno;
pub mod graph;
pub mod ops;
pub mod record;
pub mod resolver;
pub mod superblock;

pub use device::{BlockDevice, FileDevice, MemDevice};
pub use errno::{Error, Result};
pub use resolver::LookupResult;
pub use superblock::Filesystem;
