//! statfs inspector (`spec.md` §4.12): read the on-disk super record and
//! root directory of a mounted wtfs instance and report a textual
//! summary, grounded directly on
//! `original_source/src/statfs.wtfs.c`'s `read_super_block`/
//! `read_inode_table`/`read_block_bitmap`/`read_inode_bitmap`/
//! `read_root_dir` sequence. This module only reads; it never goes
//! through the inode cache (`inode::Filesystem`) since the inspector has
//! no need to hold objects alive across calls.

use std::fs::File;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use crate::block_io::BlockIo;
use crate::chain;
use crate::consts::*;
use crate::error::Result;
use crate::inode::read_inode_record;
use crate::layout::DentryRecord;
use crate::super_block::SuperState;

/// One block's position in a chain, for the prev/next diagnostic dump.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink {
    pub index: u64,
    pub prev: u64,
    pub next: u64,
}

/// Walks the chain rooted at `head`, returning the (index, prev, next) of
/// every block in ring order. Used for the inode-table/block-bitmap/
/// inode-bitmap diagnostic dumps `statfs.wtfs` prints.
pub fn chain_links(io: &BlockIo, head: u64) -> Result<Vec<ChainLink>> {
    let mut out = Vec::new();
    let mut idx = head;
    loop {
        let buf = io.read(idx)?;
        let prev = chain::get_prev(&buf);
        let next = chain::get_next(&buf);
        out.push(ChainLink { index: idx, prev, next });
        if next == head {
            break;
        }
        idx = next;
    }
    Ok(out)
}

/// One non-empty entry found while scanning the root directory.
#[derive(Debug, Clone)]
pub struct RootEntry {
    pub ino: u64,
    pub name: Vec<u8>,
}

/// Scans the root directory's block chain and returns every non-empty
/// dentry in chain order, mirroring `read_root_dir`'s
/// `WTFS_DENTRY_COUNT_PER_BLOCK` loop.
pub fn root_entries(io: &BlockIo, sb: &SuperState) -> Result<Vec<RootEntry>> {
    let root = read_inode_record(io, sb, ROOT_INO)?;
    let head = root.first_block;
    let mut entries = Vec::new();
    let mut idx = head;
    loop {
        let buf = io.read(idx)?;
        for slot in 0..DENTRIES_PER_DIR_BLOCK {
            let off = DentryRecord::slot_offset(slot);
            let d = DentryRecord::from_bytes(&buf.borrow().data()[off..off + DENTRY_SIZE]);
            if d.ino != 0 {
                entries.push(RootEntry {
                    ino: d.ino,
                    name: d.name_bytes().to_vec(),
                });
            }
        }
        let next = chain::get_next(&buf);
        if next == head {
            break;
        }
        idx = next;
    }
    Ok(entries)
}

/// Returns whether `path` refers to something this inspector can read
/// directly (a regular file or a block device); directories and regular
/// files that are themselves *within* a mounted wtfs instance must first
/// be resolved to their underlying block device by the caller (see
/// `resolve_device`), mirroring the original's `S_IFDIR`/fallthrough
/// `S_IFREG` case in `main`.
pub fn is_directly_readable(file: &File) -> Result<bool> {
    let meta = file.metadata()?;
    let ft = meta.file_type();
    Ok(ft.is_file() || ft.is_block_device())
}

/// Resolves `path` to the underlying block device backing it, when `path`
/// names a directory or a file living inside a mounted instance rather
/// than the device/image itself. On Linux this is `/dev/block/<major>:
/// <minor>` of the file's `st_dev`, exactly as the original's
/// `snprintf(buf, BUF_SIZE, "/dev/block/%u:%u", major(st_dev),
/// minor(st_dev))`. Host mount-table resolution beyond this path lookup
/// is out of scope (`spec.md` §1).
pub fn resolve_device(path: &Path) -> Result<std::path::PathBuf> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path)?;
    let dev = meta.dev();
    let major = (dev >> 8) & 0xfff | ((dev >> 32) & !0xfff);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
    Ok(std::path::PathBuf::from(format!(
        "/dev/block/{major}:{minor}"
    )))
}
