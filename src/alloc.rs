//! Allocator (`spec.md` §4.5): allocate and free block numbers and inode
//! numbers on top of the bitmap engine, maintaining counters in the super
//! record. Both domains wrap the same two-phase `alloc_obj` algorithm,
//! grounded directly on `original_source/src/helper.c`'s
//! `__wtfs_alloc_obj`: search the bitmap chain for a zero bit; if the ring
//! closes empty and the domain is extendable, grow the chain by one block
//! via the linked-block engine and keep searching.

use std::cell::RefCell;

use crate::bitmap;
use crate::block_io::BlockIo;
use crate::chain;
use crate::consts::ROOT_INO;
use crate::error::{ErrorKind, Result, bail};
use crate::log::wtfs_debug;
use crate::super_block::SuperState;

fn alloc_obj(
    io: &BlockIo,
    sb: &RefCell<SuperState>,
    head: u64,
    extendable: bool,
) -> Result<u64> {
    loop {
        if let Some(bit) = bitmap::find_first_zero_in_chain(io, head)? {
            bitmap::set(io, head, bit)?;
            return Ok(bit);
        }
        if !extendable {
            bail!(ErrorKind::NoSpace, "bitmap chain rooted at block {head} is exhausted");
        }
        wtfs_debug!("extending bitmap chain rooted at block {head}");
        chain::append(io, sb, head)?;
        let grown = sb.borrow().inode_bitmap_count() + 1;
        sb.borrow_mut().grow_inode_bitmap(grown);
        // loop again: the freshly appended block is all-zero, so the next
        // revolution is guaranteed to find a bit in it.
    }
}

fn free_obj(io: &BlockIo, head: u64, global_index: u64) -> Result<()> {
    bitmap::clear(io, head, global_index)
}

/// Allocates a free block index from the block-bitmap chain. Blocks are
/// never extendable: the device is finite.
pub fn alloc_block(io: &BlockIo, sb: &RefCell<SuperState>) -> Result<u64> {
    let head = sb.borrow().block_bitmap_first();
    let blk = alloc_obj(io, sb, head, false)?;
    sb.borrow_mut().dec_free_blocks();
    sb.borrow_mut().sync(io, false)?;
    Ok(blk)
}

/// Frees a block index. Freeing a reserved (pre-data-region) index is a
/// no-op, matching the original's guard against freeing metadata blocks.
pub fn free_block(io: &BlockIo, sb: &RefCell<SuperState>, blk: u64) {
    let first_data = sb.borrow().first_data_block();
    if blk < first_data {
        return;
    }
    let head = sb.borrow().block_bitmap_first();
    if free_obj(io, head, blk).is_ok() {
        sb.borrow_mut().inc_free_blocks();
        let _ = sb.borrow_mut().sync(io, false);
    }
}

/// Allocates a free inode number from the inode-bitmap chain, extending
/// the chain with a fresh bitmap block when the current chain is full.
pub fn alloc_ino(io: &BlockIo, sb: &RefCell<SuperState>) -> Result<u64> {
    let head = sb.borrow().inode_bitmap_first();
    let ino = alloc_obj(io, sb, head, true)?;
    sb.borrow_mut().inc_inode_count();
    sb.borrow_mut().sync(io, false)?;
    Ok(ino)
}

/// Frees an inode number. Freeing ino 0 or the root inode is a no-op.
pub fn free_ino(io: &BlockIo, sb: &RefCell<SuperState>, ino: u64) {
    if ino == 0 || ino == ROOT_INO {
        return;
    }
    let head = sb.borrow().inode_bitmap_first();
    if free_obj(io, head, ino).is_ok() {
        sb.borrow_mut().dec_inode_count();
        let _ = sb.borrow_mut().sync(io, false);
    }
}

/// Scoped rollback guard for a just-allocated block: frees the block on
/// drop unless `defuse`d. Realizes the "scoped acquisition with rollback
/// on setup failure" requirement of `spec.md` §5/§9 without depending on
/// `scopeguard` (absent from the whole corpus).
pub struct BlockGuard<'a> {
    io: &'a BlockIo,
    sb: &'a RefCell<SuperState>,
    blk: u64,
    armed: bool,
}

impl<'a> BlockGuard<'a> {
    pub fn new(io: &'a BlockIo, sb: &'a RefCell<SuperState>, blk: u64) -> Self {
        BlockGuard {
            io,
            sb,
            blk,
            armed: true,
        }
    }

    pub fn block(&self) -> u64 {
        self.blk
    }

    /// Disarms the guard: the block will not be freed on drop.
    pub fn defuse(mut self) -> u64 {
        self.armed = false;
        self.blk
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            free_block(self.io, self.sb, self.blk);
        }
    }
}

/// Scoped rollback guard for a just-allocated inode number.
pub struct InoGuard<'a> {
    io: &'a BlockIo,
    sb: &'a RefCell<SuperState>,
    ino: u64,
    armed: bool,
}

impl<'a> InoGuard<'a> {
    pub fn new(io: &'a BlockIo, sb: &'a RefCell<SuperState>, ino: u64) -> Self {
        InoGuard {
            io,
            sb,
            ino,
            armed: true,
        }
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn defuse(mut self) -> u64 {
        self.armed = false;
        self.ino
    }
}

impl Drop for InoGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            free_ino(self.io, self.sb, self.ino);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::fresh_filesystem;

    #[test]
    fn alloc_free_block_updates_counter() {
        let fs = fresh_filesystem(32);
        let before = fs.sb.borrow().free_block_count();
        let blk = alloc_block(&fs.io, &fs.sb).unwrap();
        assert_eq!(fs.sb.borrow().free_block_count(), before - 1);
        free_block(&fs.io, &fs.sb, blk);
        assert_eq!(fs.sb.borrow().free_block_count(), before);
    }

    #[test]
    fn alloc_block_exhaustion_fails_with_no_space() {
        let fs = fresh_filesystem(10);
        let free = fs.sb.borrow().free_block_count();
        let mut allocated = Vec::new();
        for _ in 0..free {
            allocated.push(alloc_block(&fs.io, &fs.sb).unwrap());
        }
        assert_eq!(
            alloc_block(&fs.io, &fs.sb).unwrap_err().kind(),
            ErrorKind::NoSpace
        );
    }

    #[test]
    fn alloc_ino_extends_bitmap_chain_when_exhausted() {
        let fs = fresh_filesystem(4096);
        let before_chain_len = fs.sb.borrow().inode_bitmap_count();
        // Exhaust the first bitmap block's worth of inode numbers.
        let mut last = 0;
        for _ in 0..crate::consts::BITS_PER_BITMAP_BLOCK {
            match alloc_ino(&fs.io, &fs.sb) {
                Ok(ino) => last = ino,
                Err(_) => break,
            }
        }
        assert!(last > 0);
        assert!(fs.sb.borrow().inode_bitmap_count() >= before_chain_len);
    }

    #[test]
    fn block_guard_frees_on_drop_unless_defused() {
        let fs = fresh_filesystem(32);
        let before = fs.sb.borrow().free_block_count();
        {
            let blk = alloc_block(&fs.io, &fs.sb).unwrap();
            let _guard = BlockGuard::new(&fs.io, &fs.sb, blk);
        }
        assert_eq!(fs.sb.borrow().free_block_count(), before);

        let blk2 = alloc_block(&fs.io, &fs.sb).unwrap();
        {
            let guard = BlockGuard::new(&fs.io, &fs.sb, blk2);
            guard.defuse();
        }
        assert_eq!(fs.sb.borrow().free_block_count(), before - 1);
    }
}
