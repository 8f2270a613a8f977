//! Linked-block engine (`spec.md` §4.3): traverse, append to, and
//! initialize circular doubly-linked chains of blocks sharing the common
//! 16-byte trailer. The disk prev/next fields never leak past this module
//! and `bitmap.rs`; every other component walks chains only through
//! `walk`/`append`.

use std::cell::RefCell;

use crate::alloc::{alloc_block, free_block};
use crate::block_io::{BlockIo, BufferRef};
use crate::error::{ErrorKind, Result, bail};
use crate::layout::ChainTrailer;
use crate::log::wtfs_trace;
use crate::super_block::SuperState;

pub fn get_prev(buf: &BufferRef) -> u64 {
    ChainTrailer::from_block(buf.borrow().data()).prev
}

pub fn get_next(buf: &BufferRef) -> u64 {
    ChainTrailer::from_block(buf.borrow().data()).next
}

pub fn set_prev(buf: &BufferRef, prev: u64) {
    let mut b = buf.borrow_mut();
    let next = ChainTrailer::from_block(b.data()).next;
    ChainTrailer { prev, next }.write_to(b.data_mut());
}

pub fn set_next(buf: &BufferRef, next: u64) {
    let mut b = buf.borrow_mut();
    let prev = ChainTrailer::from_block(b.data()).prev;
    ChainTrailer { prev, next }.write_to(b.data_mut());
}

/// Advances `position` steps from `head` (forward for non-negative,
/// backward via `prev` for negative), returning the buffer found and its
/// block index. Fails with `NotFound` if the ring closes before `position`
/// steps are taken.
pub fn walk(io: &BlockIo, head: u64, position: i64) -> Result<(BufferRef, u64)> {
    wtfs_trace!("walk: head={head} position={position}");
    let mut idx = head;
    let mut cur = io.read(head)?;
    let steps = position.unsigned_abs();
    for step in 0..steps {
        let next_idx = if position >= 0 {
            get_next(&cur)
        } else {
            get_prev(&cur)
        };
        if next_idx == head && step + 1 < steps {
            bail!(
                ErrorKind::NotFound,
                "chain rooted at block {head} closed after {step} of {steps} steps"
            );
        }
        idx = next_idx;
        cur = io.read(idx)?;
    }
    Ok((cur, idx))
}

/// Links a freshly chosen block index into the chain.
///
/// If `prev` is `None`, `blkidx` becomes a one-element self-ring. Otherwise
/// `blkidx` is inserted between `prev` and `prev`'s current next neighbour,
/// and both neighbours are updated to point at it.
pub fn init(io: &BlockIo, blkidx: u64, prev: Option<&BufferRef>) -> Result<BufferRef> {
    let new_buf = io.read(blkidx)?;
    match prev {
        None => {
            ChainTrailer {
                prev: blkidx,
                next: blkidx,
            }
            .write_to(new_buf.borrow_mut().data_mut());
        }
        Some(prev_buf) => {
            let prev_idx = prev_buf.borrow().index();
            let next_idx = get_next(prev_buf);
            let next_buf = io.read(next_idx)?;
            ChainTrailer {
                prev: prev_idx,
                next: next_idx,
            }
            .write_to(new_buf.borrow_mut().data_mut());
            set_next(prev_buf, blkidx);
            set_prev(&next_buf, blkidx);
            io.mark_dirty(prev_buf);
            io.mark_dirty(&next_buf);
        }
    }
    io.mark_dirty(&new_buf);
    Ok(new_buf)
}

/// Walks to the chain's last element (the block just before `head`),
/// allocates a new block, and links it in as the new last element.
/// Returns the new block's buffer and index. On write failure after
/// allocation, the block is freed and the chain left unmodified.
pub fn append(io: &BlockIo, sb: &RefCell<SuperState>, head: u64) -> Result<(BufferRef, u64)> {
    let (last_buf, _last_idx) = walk(io, head, -1)?;
    let blkidx = alloc_block(io, sb)?;
    match init(io, blkidx, Some(&last_buf)) {
        Ok(buf) => Ok((buf, blkidx)),
        Err(e) => {
            free_block(io, sb, blkidx);
            Err(e)
        }
    }
}
