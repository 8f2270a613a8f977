//! Inode store (`spec.md` §4.6) and the mount context.
//!
//! The original kernel module embeds its private per-inode state inside
//! the VFS inode object and recovers it with container-of arithmetic
//! (`WTFS_INODE_INFO`); `spec.md` §9 flags this for replacement. This
//! crate replaces it with a handle pair owned by a cache map keyed by
//! ino: `Filesystem` holds a `HashMap<u64, Rc<RefCell<Inode>>>`, and every
//! component that needs an inode goes through `iget`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::alloc::{self, BlockGuard, InoGuard};
use crate::block_io::BlockIo;
use crate::chain;
use crate::consts::*;
use crate::error::{ErrorKind, Result, bail};
use crate::layout::InodeRecord;
use crate::super_block::SuperState;
use crate::util::now_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
    Symlink,
}

pub fn kind_from_mode(mode: u32) -> Result<FileKind> {
    match mode & S_IFMT {
        S_IFDIR => Ok(FileKind::Directory),
        S_IFREG => Ok(FileKind::Regular),
        S_IFLNK => Ok(FileKind::Symlink),
        _ => bail!(ErrorKind::NotSupported, "unsupported mode bits 0o{:o}", mode),
    }
}

/// The in-memory representation of a single filesystem object. Distinct
/// from the on-disk `InodeRecord`: this struct carries derived fields
/// (`size`, `kind`) and is the unit the rest of the crate passes around as
/// `Rc<RefCell<Inode>>`.
pub struct Inode {
    pub ino: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub link_count: u32,
    pub first_block: u64,
    pub atime: u64,
    pub ctime: u64,
    pub mtime: u64,
    /// Byte size for regular files and symlinks; derived block-count size
    /// (`ceil(dentry_count / 63) * BLOCK_SIZE`) for directories.
    pub size: u64,
    /// Number of occupied dentry slots; meaningful only for directories.
    pub dentry_count: u64,
    /// Number of blocks materialized in this inode's own chain.
    pub i_blocks: u64,
    pub kind: FileKind,
}

impl Inode {
    fn dir_block_count(dentry_count: u64) -> u64 {
        (dentry_count.div_ceil(DENTRIES_PER_DIR_BLOCK as u64)).max(1)
    }
}

/// The mount context: owns the block I/O facade, the super record, and the
/// inode cache. Every core operation takes a `&Filesystem`.
pub struct Filesystem {
    pub io: BlockIo,
    pub sb: RefCell<SuperState>,
    cache: RefCell<HashMap<u64, Rc<RefCell<Inode>>>>,
}

impl Filesystem {
    /// Opens `path`, validates the super record, and returns a mount
    /// context ready for operations. Fails with `BadFs` on an invalid
    /// image, `IoError` if the path cannot be opened.
    pub fn mount(path: &Path) -> Result<Self> {
        let io = BlockIo::open(path)?;
        let sb = RefCell::new(SuperState::mount(&io)?);
        Ok(Filesystem {
            io,
            sb,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> Result<Rc<RefCell<Inode>>> {
        iget(self, ROOT_INO)
    }

    /// Writes the super record back and, if `wait`, blocks until every
    /// dirty block is durable.
    pub fn sync(&self, wait: bool) -> Result<()> {
        self.sb.borrow_mut().sync(&self.io, wait)?;
        if wait {
            self.io.sync_all()?;
        }
        Ok(())
    }
}

fn inode_slot(io: &BlockIo, sb: &SuperState, ino: u64) -> Result<(crate::block_io::BufferRef, usize)> {
    if ino == 0 {
        bail!(ErrorKind::Invalid, "inode number 0 is never valid");
    }
    if !crate::bitmap::test(io, sb.inode_bitmap_first(), ino)? {
        bail!(ErrorKind::NotFound, "inode {ino} is not allocated");
    }
    let count = (ino - 1) / INODES_PER_TABLE_BLOCK as u64;
    let slot = ((ino - 1) % INODES_PER_TABLE_BLOCK as u64) as usize;
    let (buf, _) = chain::walk(io, sb.inode_table_first(), count as i64)?;
    Ok((buf, InodeRecord::slot_offset(slot)))
}

pub(crate) fn read_inode_record(io: &BlockIo, sb: &SuperState, ino: u64) -> Result<InodeRecord> {
    let (buf, off) = inode_slot(io, sb, ino)?;
    let b = buf.borrow();
    Ok(InodeRecord::from_bytes(&b.data()[off..off + INODE_SIZE]))
}

fn write_inode_record(
    io: &BlockIo,
    sb: &SuperState,
    ino: u64,
    rec: &InodeRecord,
    sync: bool,
) -> Result<()> {
    let (buf, off) = inode_slot(io, sb, ino)?;
    {
        let mut b = buf.borrow_mut();
        rec.write_to(&mut b.data_mut()[off..off + INODE_SIZE]);
    }
    if sync {
        io.sync(&buf)?;
    } else {
        io.write_through(&buf)?;
    }
    Ok(())
}

fn size_from_record(kind: FileKind, rec: &InodeRecord) -> u64 {
    match kind {
        FileKind::Directory => Inode::dir_block_count(rec.size_or_count) * BLOCK_SIZE,
        FileKind::Regular | FileKind::Symlink => rec.size_or_count,
    }
}

/// Consults the inode cache; on miss, reads the on-disk inode and
/// installs the translated in-memory inode.
pub fn iget(fs: &Filesystem, ino: u64) -> Result<Rc<RefCell<Inode>>> {
    if let Some(existing) = fs.cache.borrow().get(&ino) {
        return Ok(Rc::clone(existing));
    }
    let rec = read_inode_record(&fs.io, &fs.sb.borrow(), ino)?;
    if rec.is_empty_slot() {
        bail!(ErrorKind::NotFound, "inode {ino} has no on-disk record");
    }
    let kind = kind_from_mode(rec.mode)?;
    let size = size_from_record(kind, &rec);
    let i_blocks = if kind == FileKind::Directory {
        Inode::dir_block_count(rec.size_or_count)
    } else {
        1
    };
    let inode = Inode {
        ino: rec.ino,
        mode: rec.mode,
        uid: rec.uid as u32 | ((rec.huid as u32) << 16),
        gid: rec.gid as u32 | ((rec.hgid as u32) << 16),
        link_count: rec.link_count,
        first_block: rec.first_block,
        atime: rec.atime,
        ctime: rec.ctime,
        mtime: rec.mtime,
        size,
        dentry_count: if kind == FileKind::Directory {
            rec.size_or_count
        } else {
            0
        },
        i_blocks,
        kind,
    };
    let rc = Rc::new(RefCell::new(inode));
    fs.cache.borrow_mut().insert(ino, Rc::clone(&rc));
    Ok(rc)
}

/// Writes mutable fields back to the on-disk slot. Does not itself update
/// the cache (the cache already holds the authoritative in-memory state).
pub fn write_inode(fs: &Filesystem, inode: &Rc<RefCell<Inode>>, sync: bool) -> Result<()> {
    let i = inode.borrow();
    let size_or_count = match i.kind {
        FileKind::Directory => i.dentry_count,
        FileKind::Regular | FileKind::Symlink => i.size,
    };
    let rec = InodeRecord {
        ino: i.ino,
        size_or_count,
        link_count: i.link_count,
        huid: (i.uid >> 16) as u16,
        hgid: (i.gid >> 16) as u16,
        first_block: i.first_block,
        atime: i.atime,
        ctime: i.ctime,
        mtime: i.mtime,
        mode: i.mode,
        uid: (i.uid & 0xffff) as u16,
        gid: (i.gid & 0xffff) as u16,
    };
    let ino = i.ino;
    drop(i);
    write_inode_record(&fs.io, &fs.sb.borrow(), ino, &rec, sync)
}

/// Frees the inode number, zeroes its inode-table slot, then walks and
/// frees every block in its own chain.
pub fn delete_inode(fs: &Filesystem, inode: Rc<RefCell<Inode>>) -> Result<()> {
    let (ino, first_block) = {
        let i = inode.borrow();
        (i.ino, i.first_block)
    };
    write_inode_record(&fs.io, &fs.sb.borrow(), ino, &InodeRecord::default(), false)?;
    free_chain(fs, first_block)?;
    alloc::free_ino(&fs.io, &fs.sb, ino);
    fs.cache.borrow_mut().remove(&ino);
    Ok(())
}

fn free_chain(fs: &Filesystem, head: u64) -> Result<()> {
    let mut indices = vec![head];
    let mut idx = head;
    loop {
        let buf = fs.io.read(idx)?;
        let next = chain::get_next(&buf);
        if next == head {
            break;
        }
        indices.push(next);
        idx = next;
    }
    for i in indices {
        alloc::free_block(&fs.io, &fs.sb, i);
    }
    Ok(())
}

/// Allocates an inode number and a first block, initializes the chain,
/// writes the initial on-disk record, and installs the in-memory inode in
/// the cache. `mode` must carry a recognized `S_IFMT` kind.
pub fn new_inode(fs: &Filesystem, mode: u32, uid: u32, gid: u32) -> Result<Rc<RefCell<Inode>>> {
    let kind = kind_from_mode(mode)?;

    let ino = alloc::alloc_ino(&fs.io, &fs.sb)?;
    let ino_guard = InoGuard::new(&fs.io, &fs.sb, ino);

    let blk = alloc::alloc_block(&fs.io, &fs.sb)?;
    let blk_guard = BlockGuard::new(&fs.io, &fs.sb, blk);

    let zero_buf = fs.io.read(blk)?;
    zero_buf.borrow_mut().data_mut().fill(0);
    chain::init(&fs.io, blk, None)?;

    let now = now_secs();
    let rec = InodeRecord {
        ino,
        size_or_count: 0,
        link_count: 1,
        huid: (uid >> 16) as u16,
        hgid: (gid >> 16) as u16,
        first_block: blk,
        atime: now,
        ctime: now,
        mtime: now,
        mode,
        uid: (uid & 0xffff) as u16,
        gid: (gid & 0xffff) as u16,
    };
    write_inode_record(&fs.io, &fs.sb.borrow(), ino, &rec, false)?;

    let inode = Inode {
        ino,
        mode,
        uid,
        gid,
        link_count: 1,
        first_block: blk,
        atime: now,
        ctime: now,
        mtime: now,
        size: 0,
        dentry_count: 0,
        i_blocks: 1,
        kind,
    };
    let rc = Rc::new(RefCell::new(inode));
    fs.cache.borrow_mut().insert(ino, Rc::clone(&rc));

    ino_guard.defuse();
    blk_guard.defuse();
    Ok(rc)
}
