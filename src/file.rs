//! File-data I/O (`spec.md` §4.8): sequential and random read/write over a
//! regular file's block chain through an open-file handle that caches its
//! last-visited `(position, block_index)` pair so sequential access never
//! re-walks the chain from the head.

use std::rc::Rc;
use std::cell::RefCell;

use crate::chain;
use crate::consts::*;
use crate::error::{ErrorKind, Result, bail};
use crate::inode::{self, Filesystem, Inode};
use crate::util::now_secs;

#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

/// A handle over an open regular file. Holds a strong reference to the
/// backing inode so the handle stays valid even if the caller's own
/// reference is dropped.
pub struct OpenFile {
    inode: Rc<RefCell<Inode>>,
    position: u64,
    /// Last block visited and the file position at its start, reused to
    /// skip re-walking the chain on sequential access.
    cache: Option<(u64, u64)>,
}

/// Opens `inode` for reading and writing at position 0.
pub fn open(inode: Rc<RefCell<Inode>>) -> OpenFile {
    OpenFile {
        inode,
        position: 0,
        cache: None,
    }
}

impl OpenFile {
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Relinquishes the handle; the inode itself stays cached in the
    /// `Filesystem` for as long as anything else references it.
    pub fn release(self) {}

    /// Reads up to `buf.len()` bytes starting at the handle's current
    /// position, advancing it by the number of bytes read. Returns the
    /// number of bytes actually read (0 at end of file).
    pub fn read(&mut self, fs: &Filesystem, buf: &mut [u8]) -> Result<usize> {
        let first_block = self.inode.borrow().first_block;
        let file_size = self.inode.borrow().size;
        if self.position >= file_size || buf.is_empty() {
            return Ok(0);
        }

        let mut total = 0usize;
        while total < buf.len() && self.position < file_size {
            let block_offset = self.position / DATA_PAYLOAD as u64;
            let within_block = (self.position % DATA_PAYLOAD as u64) as usize;

            let block_idx = self.locate_block(fs, first_block, block_offset)?;
            let data_buf = fs.io.read(block_idx)?;
            let available = (DATA_PAYLOAD as usize - within_block)
                .min((file_size - self.position) as usize);
            let want = (buf.len() - total).min(available);

            {
                let b = data_buf.borrow();
                buf[total..total + want]
                    .copy_from_slice(&b.data()[within_block..within_block + want]);
            }

            self.cache = Some((block_offset * DATA_PAYLOAD as u64, block_idx));
            self.position += want as u64;
            total += want;
        }
        Ok(total)
    }

    /// Writes `buf` at the handle's current position, extending the file's
    /// block chain and `size` as needed. Advances the position by
    /// `buf.len()`.
    pub fn write(&mut self, fs: &Filesystem, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let first_block = self.inode.borrow().first_block;

        let mut total = 0usize;
        while total < buf.len() {
            let block_offset = self.position / DATA_PAYLOAD as u64;
            let within_block = (self.position % DATA_PAYLOAD as u64) as usize;

            let block_idx = self.locate_or_extend_block(fs, first_block, block_offset)?;
            let data_buf = fs.io.read(block_idx)?;
            let want = (buf.len() - total).min(DATA_PAYLOAD as usize - within_block);

            {
                let mut b = data_buf.borrow_mut();
                b.data_mut()[within_block..within_block + want]
                    .copy_from_slice(&buf[total..total + want]);
            }
            fs.io.write_through(&data_buf)?;

            self.cache = Some((block_offset * DATA_PAYLOAD as u64, block_idx));
            self.position += want as u64;
            total += want;
        }

        let now = now_secs();
        {
            let mut i = self.inode.borrow_mut();
            if self.position > i.size {
                i.size = self.position;
            }
            i.mtime = now;
            i.ctime = now;
        }
        inode::write_inode(fs, &self.inode, false)?;
        Ok(total)
    }

    /// Repositions the handle. Fails with `Invalid` if the target would
    /// fall outside `[0, size]`.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let size = self.inode.borrow().size as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => size + delta,
        };
        if target < 0 || target > size {
            bail!(ErrorKind::Invalid, "seek target {target} outside [0, {size}]");
        }
        self.position = target as u64;
        self.cache = None;
        Ok(self.position)
    }

    /// Resolves the block holding byte offset `block_offset * DATA_PAYLOAD`,
    /// reusing the cached `(position, block)` pair when it covers a block
    /// at or before the target (the common sequential-access case).
    fn locate_block(&self, fs: &Filesystem, first_block: u64, block_offset: u64) -> Result<u64> {
        if let Some((cached_pos, cached_blk)) = self.cache {
            let cached_offset = cached_pos / DATA_PAYLOAD as u64;
            if cached_offset == block_offset {
                return Ok(cached_blk);
            }
            if cached_offset < block_offset {
                let steps = (block_offset - cached_offset) as i64;
                let (_, idx) = chain::walk(&fs.io, cached_blk, steps)?;
                return Ok(idx);
            }
        }
        let (_, idx) = chain::walk(&fs.io, first_block, block_offset as i64)?;
        Ok(idx)
    }

    /// Like `locate_block`, but extends the chain by appending a fresh
    /// zeroed block when `block_offset` would land past the current chain.
    fn locate_or_extend_block(
        &mut self,
        fs: &Filesystem,
        first_block: u64,
        block_offset: u64,
    ) -> Result<u64> {
        match self.locate_block(fs, first_block, block_offset) {
            Ok(idx) => Ok(idx),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let (new_buf, new_idx) = chain::append(&fs.io, &fs.sb, first_block)?;
                new_buf.borrow_mut().data_mut()[..DATA_PAYLOAD as usize].fill(0);
                fs.io.write_through(&new_buf)?;
                {
                    let mut i = self.inode.borrow_mut();
                    i.i_blocks += 1;
                }
                Ok(new_idx)
            }
            Err(e) => Err(e),
        }
    }
}
