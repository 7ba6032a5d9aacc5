//! The in-memory filesystem.
//!
//! Entries live in a slab arena owned by the filesystem; directories refer
//! to their children by inode and every entry keeps its parent's inode for
//! `..` and symlink-relative resolution.

pub mod capability;
mod content;
mod dir_reader;
mod filesystem;
mod handle;
mod node;
mod resolver;

pub use content::ContentStore;
pub use dir_reader::DirCursor;
pub use filesystem::FileSystem;
pub use handle::FileHandle;

use std::time::{SystemTime, UNIX_EPOCH};

fn time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}
