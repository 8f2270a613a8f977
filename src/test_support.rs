//! Shared test fixtures: a tiny freshly formatted image backing a
//! `BlockIo`/`SuperState` pair, used by unit tests across several modules
//! so each one doesn't have to hand-roll a valid on-disk layout.
#![cfg(test)]

use std::cell::RefCell;

use crate::block_io::BlockIo;
use crate::consts::BLOCK_SIZE;
use crate::inode::Filesystem;
use crate::mkfs::{self, MkfsOptions};
use crate::super_block::SuperState;

pub struct TestFs {
    pub io: BlockIo,
    pub sb: RefCell<SuperState>,
    _tmp: tempfile::NamedTempFile,
}

pub fn fresh_filesystem(blocks: u64) -> TestFs {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.as_file().set_len(blocks * BLOCK_SIZE).unwrap();
    mkfs::format(
        tmp.path(),
        &MkfsOptions {
            quick: true,
            quiet: true,
            label: None,
            uuid: None,
        },
    )
    .unwrap();
    let io = BlockIo::open(tmp.path()).unwrap();
    let sb = RefCell::new(SuperState::mount(&io).unwrap());
    TestFs { io, sb, _tmp: tmp }
}

/// Same as `fresh_filesystem`, but wrapped in a full `Filesystem` mount
/// context (with an inode cache) for tests exercising `inode`/`dir`/
/// `file`/`symlink`. The temp file must be kept alive by the caller for
/// as long as the `Filesystem` is used.
pub fn fresh_filesystem_ctx(blocks: u64) -> (Filesystem, tempfile::NamedTempFile) {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.as_file().set_len(blocks * BLOCK_SIZE).unwrap();
    mkfs::format(
        tmp.path(),
        &MkfsOptions {
            quick: true,
            quiet: true,
            label: None,
            uuid: None,
        },
    )
    .unwrap();
    let fs = Filesystem::mount(tmp.path()).unwrap();
    (fs, tmp)
}
