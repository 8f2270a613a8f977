//! Super-block manager (`spec.md` §4.10): mount-time validation, loading
//! and syncing the super record, and statistics reporting.

use crate::block_io::BlockIo;
use crate::consts::*;
use crate::error::{ErrorKind, Result, bail};
use crate::layout::SuperBlockRecord;

/// The in-memory super record, co-owned by the mount context and the
/// allocator/inode-store components that mutate it.
pub struct SuperState {
    rec: SuperBlockRecord,
    dirty: bool,
}

/// A point-in-time statistics snapshot for `statfs.wtfs` and the host's
/// `statfs` callback.
#[derive(Debug, Clone)]
pub struct Stats {
    pub block_count: u64,
    pub free_block_count: u64,
    pub inode_count: u64,
    pub filename_max: usize,
    pub label: String,
    pub uuid: uuid::Uuid,
}

impl SuperState {
    /// Validates block size, magic, and version, then loads every field
    /// from block 1 into memory.
    pub fn mount(io: &BlockIo) -> Result<Self> {
        let buf = io.read(SUPER_BLOCK_INDEX)?;
        let rec = SuperBlockRecord::from_bytes(buf.borrow().data())?;
        if rec.block_size != BLOCK_SIZE {
            bail!(
                ErrorKind::BadFs,
                "unsupported block size {} (expected {})",
                rec.block_size,
                BLOCK_SIZE
            );
        }
        if rec.magic != MAGIC {
            bail!(ErrorKind::BadFs, "bad magic 0x{:04x}", rec.magic);
        }
        if rec.version != VERSION {
            bail!(
                ErrorKind::BadFs,
                "unsupported version {}.{}",
                rec.version >> 8,
                rec.version & 0xff
            );
        }
        Ok(SuperState { rec, dirty: false })
    }

    /// Wraps an already-populated record, e.g. one just written by mkfs,
    /// without re-reading it from disk. Used internally by the formatter
    /// and by tests that need a `SuperState` without a full image on disk.
    pub(crate) fn from_record(rec: SuperBlockRecord) -> Self {
        SuperState { rec, dirty: false }
    }

    pub fn record(&self) -> &SuperBlockRecord {
        &self.rec
    }

    /// Writes every field back into block 1, marks it dirty, and
    /// optionally blocks until durable.
    pub fn sync(&mut self, io: &BlockIo, wait: bool) -> Result<()> {
        if !self.dirty && !wait {
            return Ok(());
        }
        let buf = io.read(SUPER_BLOCK_INDEX)?;
        self.rec.write_to(buf.borrow_mut().data_mut());
        io.mark_dirty(&buf);
        if wait {
            io.sync(&buf)?;
        } else {
            io.write_through(&buf)?;
        }
        self.dirty = false;
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn block_count(&self) -> u64 {
        self.rec.block_count
    }

    pub fn inode_table_first(&self) -> u64 {
        self.rec.inode_table_first
    }

    pub fn inode_table_count(&self) -> u64 {
        self.rec.inode_table_count
    }

    pub fn block_bitmap_first(&self) -> u64 {
        self.rec.block_bitmap_first
    }

    pub fn inode_bitmap_first(&self) -> u64 {
        self.rec.inode_bitmap_first
    }

    pub fn free_block_count(&self) -> u64 {
        self.rec.free_block_count
    }

    pub fn inode_count(&self) -> u64 {
        self.rec.inode_count
    }

    pub fn first_data_block(&self) -> u64 {
        2 + self.rec.inode_table_count + self.rec.block_bitmap_count + self.rec.inode_bitmap_count
    }

    pub(crate) fn dec_free_blocks(&mut self) {
        self.rec.free_block_count -= 1;
        self.dirty = true;
    }

    pub(crate) fn inc_free_blocks(&mut self) {
        self.rec.free_block_count += 1;
        self.dirty = true;
    }

    pub(crate) fn inc_inode_count(&mut self) {
        self.rec.inode_count += 1;
        self.dirty = true;
    }

    pub(crate) fn dec_inode_count(&mut self) {
        if self.rec.inode_count > 0 {
            self.rec.inode_count -= 1;
            self.dirty = true;
        }
    }

    pub(crate) fn grow_inode_bitmap(&mut self, new_count: u64) {
        self.rec.inode_bitmap_count = new_count;
        self.dirty = true;
    }

    pub fn inode_bitmap_count(&self) -> u64 {
        self.rec.inode_bitmap_count
    }

    pub fn stats(&self) -> Stats {
        Stats {
            block_count: self.rec.block_count,
            free_block_count: self.rec.free_block_count,
            inode_count: self.rec.inode_count,
            filename_max: FILENAME_MAX - 1,
            label: String::from_utf8_lossy(
                &self.rec.label[..self
                    .rec
                    .label
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(LABEL_MAX)],
            )
            .into_owned(),
            uuid: uuid::Uuid::from_bytes(self.rec.uuid),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::fresh_filesystem;

    #[test]
    fn mount_rejects_bad_magic() {
        let fs = fresh_filesystem(32);
        let buf = fs.io.read(SUPER_BLOCK_INDEX).unwrap();
        buf.borrow_mut().data_mut()[2] = 0;
        buf.borrow_mut().data_mut()[3] = 0;
        fs.io.write_through(&buf).unwrap();
        assert_eq!(SuperState::mount(&fs.io).unwrap_err().kind(), ErrorKind::BadFs);
    }

    #[test]
    fn sync_roundtrips_counters() {
        let fs = fresh_filesystem(32);
        {
            let mut sb = fs.sb.borrow_mut();
            sb.dec_free_blocks();
            sb.sync(&fs.io, true).unwrap();
        }
        let reloaded = SuperState::mount(&fs.io).unwrap();
        assert_eq!(
            reloaded.free_block_count(),
            fs.sb.borrow().free_block_count()
        );
    }
}
