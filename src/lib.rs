//! wtfs — an on-disk, block-oriented filesystem core.
//!
//! This crate implements the filesystem described in `spec.md`: a fixed
//! 4096-byte block layout (`layout`), a linked-block/bitmap allocation
//! engine (`chain`, `bitmap`, `alloc`), an inode store and directory/file/
//! symlink engines (`inode`, `dir`, `file`, `symlink`), and the
//! super-block manager (`super_block`) that mediates mount-time
//! validation and statistics. `mkfs` and `statfs` implement the two CLI
//! tools that exercise the same on-disk format; their binaries live under
//! `src/bin/`.

pub mod alloc;
pub mod bitmap;
pub mod block_io;
pub mod chain;
pub mod cli;
pub mod consts;
pub mod dir;
pub mod error;
pub mod file;
pub mod inode;
pub mod layout;
pub mod log;
pub mod mkfs;
pub mod statfs;
pub mod super_block;
pub mod symlink;
#[cfg(test)]
mod test_support;
pub mod util;

pub use error::{Error, ErrorKind, Result};
