//! Bitmap engine (`spec.md` §4.4): get/set/clear/test a bit in a bitmap
//! chain, and find-first-zero across the whole chain.

use crate::block_io::BlockIo;
use crate::chain;
use crate::consts::BITS_PER_BITMAP_BLOCK;
use crate::error::Result;
use crate::layout::bitops;

/// Splits a global bit index into (chain position, in-block bit offset).
fn bit_location(i: u64) -> (i64, usize) {
    let block_pos = i / BITS_PER_BITMAP_BLOCK;
    let local = (i % BITS_PER_BITMAP_BLOCK) as usize;
    (block_pos as i64, local)
}

pub fn test(io: &BlockIo, head: u64, i: u64) -> Result<bool> {
    let (pos, local) = bit_location(i);
    let (buf, _) = chain::walk(io, head, pos)?;
    Ok(bitops::test_bit(buf.borrow().data(), local))
}

pub fn set(io: &BlockIo, head: u64, i: u64) -> Result<()> {
    let (pos, local) = bit_location(i);
    let (buf, _) = chain::walk(io, head, pos)?;
    bitops::set_bit(buf.borrow_mut().data_mut(), local);
    io.mark_dirty(&buf);
    Ok(())
}

pub fn clear(io: &BlockIo, head: u64, i: u64) -> Result<()> {
    let (pos, local) = bit_location(i);
    let (buf, _) = chain::walk(io, head, pos)?;
    bitops::clear_bit(buf.borrow_mut().data_mut(), local);
    io.mark_dirty(&buf);
    Ok(())
}

/// Walks the chain rooted at `head` searching for the first zero bit in
/// any block, returning its global bit index. Returns `Ok(None)` after a
/// full revolution finds nothing; never allocates or extends the chain
/// (that policy belongs to `alloc.rs`).
pub fn find_first_zero_in_chain(io: &BlockIo, head: u64) -> Result<Option<u64>> {
    let mut idx = head;
    let mut pos: u64 = 0;
    loop {
        let buf = io.read(idx)?;
        if let Some(local) = bitops::find_first_zero(buf.borrow().data()) {
            return Ok(Some(pos * BITS_PER_BITMAP_BLOCK + local as u64));
        }
        let next = chain::get_next(&buf);
        if next == head {
            return Ok(None);
        }
        idx = next;
        pos += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::fresh_filesystem;

    #[test]
    fn set_test_clear_roundtrip() {
        let fs = fresh_filesystem(32);
        let head = fs.sb.borrow().block_bitmap_first();
        set(&fs.io, head, 5).unwrap();
        assert!(test(&fs.io, head, 5).unwrap());
        clear(&fs.io, head, 5).unwrap();
        assert!(!test(&fs.io, head, 5).unwrap());
    }

    #[test]
    fn find_first_zero_finds_after_setting_earlier_bits() {
        let fs = fresh_filesystem(32);
        let head = fs.sb.borrow().block_bitmap_first();
        for i in 0..10 {
            set(&fs.io, head, i).unwrap();
        }
        assert_eq!(find_first_zero_in_chain(&fs.io, head).unwrap(), Some(10));
    }
}
