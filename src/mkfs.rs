//! mkfs formatter (`spec.md` §4.11): lays down boot/super/inode-table/
//! bitmap/root blocks on a raw device or image file, with an optional deep
//! zero-fill pass. Grounded directly on
//! `original_source/src/mkfs.wtfs.c`'s `main`/`write_super_block`/
//! `write_inode_table`/`write_block_bitmap`/`write_inode_bitmap`/
//! `write_root_dir`/`do_deep_format`, and on the teacher's
//! `mkfs/src/ext2.rs` field-by-field super/root construction idiom.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write as _};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bitmap;
use crate::block_io::BlockIo;
use crate::chain;
use crate::consts::*;
use crate::error::{ErrorKind, Result, bail};
use crate::layout::{DentryRecord, InodeRecord, SuperBlockRecord, endian};
use crate::util::device_size;

/// Parameters accepted by the formatter. CLI-only concerns (the
/// mounted-device check and the overwrite confirmation prompt) live in
/// `src/bin/mkfs.rs`, not here; this function always formats.
pub struct MkfsOptions {
    /// Skip the deep zero-fill pass over the data region.
    pub quick: bool,
    /// Suppress progress reporting during the deep zero-fill pass.
    pub quiet: bool,
    pub label: Option<String>,
    pub uuid: Option<uuid::Uuid>,
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Returns whether `path` already carries a wtfs magic at block 1, without
/// validating the rest of the super record.
pub fn is_present(path: &Path) -> Result<bool> {
    let mut file = match OpenOptions::new().read(true).open(path) {
        Ok(f) => f,
        Err(_) => return Ok(false),
    };
    let Ok(meta) = file.metadata() else {
        return Ok(false);
    };
    if meta.len() < 2 * BLOCK_SIZE {
        return Ok(false);
    }
    if file
        .seek(SeekFrom::Start(SUPER_BLOCK_INDEX * BLOCK_SIZE))
        .is_err()
    {
        return Ok(false);
    }
    let mut buf = [0u8; 4];
    if file.read_exact(&mut buf).is_err() {
        return Ok(false);
    }
    Ok(endian::read_u16(&buf[2..4]) == MAGIC)
}

/// Formats `path` as a fresh wtfs volume.
pub fn format(path: &Path, opts: &MkfsOptions) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let block_count = device_size(&file)? / BLOCK_SIZE;

    let inode_table_count: u64 = 1;
    let block_bitmap_count = ceil_div(block_count, BITS_PER_BITMAP_BLOCK).max(1);
    let inode_bitmap_count: u64 = 1;
    let required = 3 + inode_table_count + block_bitmap_count + inode_bitmap_count;
    if block_count < required {
        bail!(
            ErrorKind::NoSpace,
            "volume has {block_count} blocks, need at least {required}"
        );
    }

    let inode_table_first = INODE_TABLE_FIRST_DEFAULT;
    let block_bitmap_first = inode_table_first + inode_table_count;
    let inode_bitmap_first = block_bitmap_first + block_bitmap_count;
    let first_data = inode_bitmap_first + inode_bitmap_count;
    let free_block_count = block_count - inode_table_count - block_bitmap_count - inode_bitmap_count - 3;

    let io = BlockIo::from_file(file);

    // Boot block: opaque, zeroed.
    let boot = io.read(BOOT_BLOCK)?;
    boot.borrow_mut().data_mut().fill(0);
    io.write_through(&boot)?;

    let label = encode_label(opts.label.as_deref())?;
    let uuid_bytes = *opts.uuid.unwrap_or_else(uuid::Uuid::new_v4).as_bytes();

    let rec = SuperBlockRecord {
        version: VERSION,
        magic: MAGIC,
        block_size: BLOCK_SIZE,
        block_count,
        inode_table_first,
        inode_table_count,
        block_bitmap_first,
        block_bitmap_count,
        inode_bitmap_first,
        inode_bitmap_count,
        inode_count: 1,
        free_block_count,
        label,
        uuid: uuid_bytes,
    };
    let sb_buf = io.read(SUPER_BLOCK_INDEX)?;
    rec.write_to(sb_buf.borrow_mut().data_mut());
    io.write_through(&sb_buf)?;

    write_inode_table(&io, inode_table_first, first_data)?;
    write_block_bitmap(&io, block_bitmap_first, block_bitmap_count, first_data)?;
    write_inode_bitmap(&io, inode_bitmap_first)?;
    write_root_dir(&io, first_data)?;

    if !opts.quick {
        deep_zero_fill(&io, first_data + 1, block_count, opts.quiet)?;
    }

    io.sync_all()?;
    Ok(())
}

fn encode_label(label: Option<&str>) -> Result<[u8; LABEL_MAX]> {
    let mut out = [0u8; LABEL_MAX];
    if let Some(l) = label {
        if l.len() >= LABEL_MAX {
            bail!(ErrorKind::TooLong, "label longer than {} bytes", LABEL_MAX - 1);
        }
        out[..l.len()].copy_from_slice(l.as_bytes());
    }
    Ok(out)
}

fn write_inode_table(io: &BlockIo, inode_table_first: u64, first_data: u64) -> Result<()> {
    let buf = io.read(inode_table_first)?;
    buf.borrow_mut().data_mut().fill(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let root = InodeRecord {
        ino: ROOT_INO,
        size_or_count: 2, // dentry_count: "." and ".."
        link_count: 2,
        huid: 0,
        hgid: 0,
        first_block: first_data,
        atime: now,
        ctime: now,
        mtime: now,
        mode: S_IFDIR | 0o755,
        uid: 0,
        gid: 0,
    };
    {
        let mut b = buf.borrow_mut();
        let off = InodeRecord::slot_offset(0);
        root.write_to(&mut b.data_mut()[off..off + INODE_SIZE]);
    }
    chain::init(io, inode_table_first, None)?;
    io.write_through(&buf)?;
    Ok(())
}

fn write_block_bitmap(
    io: &BlockIo,
    block_bitmap_first: u64,
    block_bitmap_count: u64,
    first_data: u64,
) -> Result<()> {
    for i in 0..block_bitmap_count {
        let buf = io.read(block_bitmap_first + i)?;
        buf.borrow_mut().data_mut().fill(0);
    }
    let mut bufs = vec![chain::init(io, block_bitmap_first, None)?];
    for i in 1..block_bitmap_count {
        let idx = block_bitmap_first + i;
        let buf = chain::init(io, idx, Some(&bufs[bufs.len() - 1]))?;
        bufs.push(buf);
    }
    // Every block up to and including first_data is reserved: boot, super,
    // inode-table chain, the block-bitmap chain itself, the inode-bitmap
    // chain, and the root directory's own first block.
    for b in 0..=first_data {
        bitmap::set(io, block_bitmap_first, b)?;
    }
    for buf in &bufs {
        io.write_through(buf)?;
    }
    Ok(())
}

fn write_inode_bitmap(io: &BlockIo, inode_bitmap_first: u64) -> Result<()> {
    let buf = io.read(inode_bitmap_first)?;
    buf.borrow_mut().data_mut().fill(0);
    let buf = chain::init(io, inode_bitmap_first, None)?;
    io.write_through(&buf)?;
    // Bit 0 is reserved (ino 0 never issued); bit 1 is root.
    bitmap::set(io, inode_bitmap_first, 0)?;
    bitmap::set(io, inode_bitmap_first, ROOT_INO)?;
    Ok(())
}

fn write_root_dir(io: &BlockIo, first_data: u64) -> Result<()> {
    let buf = io.read(first_data)?;
    buf.borrow_mut().data_mut().fill(0);
    let mut dot = DentryRecord::empty();
    dot.ino = ROOT_INO;
    dot.set_name(b".")?;
    let mut dotdot = DentryRecord::empty();
    dotdot.ino = ROOT_INO;
    dotdot.set_name(b"..")?;
    {
        let mut b = buf.borrow_mut();
        let off0 = DentryRecord::slot_offset(0);
        dot.write_to(&mut b.data_mut()[off0..off0 + DENTRY_SIZE]);
        let off1 = DentryRecord::slot_offset(1);
        dotdot.write_to(&mut b.data_mut()[off1..off1 + DENTRY_SIZE]);
    }
    chain::init(io, first_data, None)?;
    io.write_through(&buf)?;
    Ok(())
}

fn deep_zero_fill(io: &BlockIo, from: u64, to: u64, quiet: bool) -> Result<()> {
    let total = to.saturating_sub(from);
    if total == 0 {
        return Ok(());
    }
    let zero = vec![0u8; BLOCK_SIZE as usize];
    let mut last_percent = u64::MAX;
    for (i, blk) in (from..to).enumerate() {
        let buf = io.read(blk)?;
        buf.borrow_mut().data_mut().copy_from_slice(&zero);
        io.write_through(&buf)?;
        if !quiet {
            let percent = ((i as u64 + 1) * 100) / total;
            if percent != last_percent {
                print!("\rFormat complete {percent}%...");
                std::io::stdout().flush().ok();
                last_percent = percent;
            }
        }
    }
    if !quiet {
        println!();
    }
    Ok(())
}
