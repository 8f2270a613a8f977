//! Directory engine (`spec.md` §4.7): dentry scan/add/delete, "." and
//! ".." on mkdir, rename across directories.

use std::rc::Rc;
use std::cell::RefCell;

use crate::block_io::BufferRef;
use crate::chain;
use crate::consts::*;
use crate::error::{ErrorKind, Result, bail};
use crate::inode::{self, FileKind, Filesystem, Inode};
use crate::layout::{DentryRecord, endian};
use crate::util::now_secs;

fn find_empty_slot(buf: &BufferRef) -> Option<usize> {
    for slot in 0..DENTRIES_PER_DIR_BLOCK {
        let off = DentryRecord::slot_offset(slot);
        let ino = endian::read_u64(&buf.borrow().data()[off..off + 8]);
        if ino == 0 {
            return Some(off);
        }
    }
    None
}

/// Scans `dir`'s directory-block chain for `name`, returning its ino or 0.
pub fn find(fs: &Filesystem, dir: &Rc<RefCell<Inode>>, name: &[u8]) -> Result<u64> {
    let head = dir.borrow().first_block;
    let mut idx = head;
    loop {
        let buf = fs.io.read(idx)?;
        for slot in 0..DENTRIES_PER_DIR_BLOCK {
            let off = DentryRecord::slot_offset(slot);
            let d = DentryRecord::from_bytes(&buf.borrow().data()[off..off + DENTRY_SIZE]);
            if d.ino != 0 && d.name_bytes() == name {
                return Ok(d.ino);
            }
        }
        let next = chain::get_next(&buf);
        if next == head {
            return Ok(0);
        }
        idx = next;
    }
}

/// Adds `(ino, name)` to `dir`, extending the chain if every existing
/// block is full.
pub fn add(fs: &Filesystem, dir: &Rc<RefCell<Inode>>, ino: u64, name: &[u8]) -> Result<()> {
    if name.is_empty() {
        bail!(ErrorKind::EmptyName, "directory entry name is empty");
    }
    if name.len() >= FILENAME_MAX {
        bail!(ErrorKind::TooLong, "filename longer than {} bytes", FILENAME_MAX - 1);
    }
    let head = dir.borrow().first_block;

    let mut idx = head;
    let (target_buf, target_off, extended) = loop {
        let buf = fs.io.read(idx)?;
        if let Some(off) = find_empty_slot(&buf) {
            break (buf, off, false);
        }
        let next = chain::get_next(&buf);
        if next == head {
            let (new_buf, _) = chain::append(&fs.io, &fs.sb, head)?;
            new_buf.borrow_mut().data_mut()[..DENTRIES_PER_DIR_BLOCK * DENTRY_SIZE].fill(0);
            break (new_buf, DentryRecord::slot_offset(0), true);
        }
        idx = next;
    };

    let mut d = DentryRecord::empty();
    d.ino = ino;
    d.set_name(name)?;
    {
        let mut b = target_buf.borrow_mut();
        d.write_to(&mut b.data_mut()[target_off..target_off + DENTRY_SIZE]);
    }
    fs.io.write_through(&target_buf)?;

    let now = now_secs();
    {
        let mut dir_mut = dir.borrow_mut();
        dir_mut.dentry_count += 1;
        if extended {
            dir_mut.size += BLOCK_SIZE;
            dir_mut.i_blocks += 1;
        }
        dir_mut.ctime = now;
        dir_mut.mtime = now;
    }
    inode::write_inode(fs, dir, false)?;
    Ok(())
}

/// Zeroes the dentry referencing `ino` in `dir`. Does not free the
/// directory block even if it becomes empty (blocks shrink only at
/// rmdir).
pub fn delete(fs: &Filesystem, dir: &Rc<RefCell<Inode>>, ino: u64) -> Result<()> {
    let head = dir.borrow().first_block;
    let mut idx = head;
    loop {
        let buf = fs.io.read(idx)?;
        for slot in 0..DENTRIES_PER_DIR_BLOCK {
            let off = DentryRecord::slot_offset(slot);
            let existing = endian::read_u64(&buf.borrow().data()[off..off + 8]);
            if existing == ino {
                let empty = DentryRecord::empty();
                {
                    let mut b = buf.borrow_mut();
                    empty.write_to(&mut b.data_mut()[off..off + DENTRY_SIZE]);
                }
                fs.io.write_through(&buf)?;
                let now = now_secs();
                {
                    let mut dir_mut = dir.borrow_mut();
                    dir_mut.dentry_count = dir_mut.dentry_count.saturating_sub(1);
                    dir_mut.ctime = now;
                    dir_mut.mtime = now;
                }
                inode::write_inode(fs, dir, false)?;
                return Ok(());
            }
        }
        let next = chain::get_next(&buf);
        if next == head {
            bail!(ErrorKind::NotFound, "inode {ino} not present in directory");
        }
        idx = next;
    }
}

/// Emits every non-empty dentry from `pos` onward, in chain order, via
/// `emit(ino, name) -> keep_going`. Returns the updated position; position
/// advances by one dentry slot (64 bytes) even across empty slots, so a
/// caller resuming from a previously returned position sees a stable
/// virtual offset.
pub fn iterate(
    fs: &Filesystem,
    dir: &Rc<RefCell<Inode>>,
    pos: u64,
    mut emit: impl FnMut(u64, &[u8]) -> bool,
) -> Result<u64> {
    let head = dir.borrow().first_block;
    let global_slot = pos / DENTRY_SIZE as u64;
    let block_pos = (global_slot / DENTRIES_PER_DIR_BLOCK as u64) as i64;
    let mut slot_in_block = (global_slot % DENTRIES_PER_DIR_BLOCK as u64) as usize;

    let (mut buf, mut idx) = match chain::walk(&fs.io, head, block_pos) {
        Ok(v) => v,
        Err(_) => return Ok(pos),
    };

    let mut cur_pos = pos;
    loop {
        while slot_in_block < DENTRIES_PER_DIR_BLOCK {
            let off = DentryRecord::slot_offset(slot_in_block);
            let d = DentryRecord::from_bytes(&buf.borrow().data()[off..off + DENTRY_SIZE]);
            cur_pos += DENTRY_SIZE as u64;
            slot_in_block += 1;
            if d.ino != 0 && !emit(d.ino, d.name_bytes()) {
                return Ok(cur_pos);
            }
        }
        let next = chain::get_next(&buf);
        if next == head {
            break;
        }
        idx = next;
        buf = fs.io.read(idx)?;
        slot_in_block = 0;
    }
    let _ = idx;
    Ok(cur_pos)
}

/// Creates a new directory inode, wires up "." and "..", links it into
/// `parent` under `name`.
pub fn mkdir(
    fs: &Filesystem,
    parent: &Rc<RefCell<Inode>>,
    name: &[u8],
    mode: u32,
    uid: u32,
    gid: u32,
) -> Result<Rc<RefCell<Inode>>> {
    let parent_ino = parent.borrow().ino;
    let new_dir = inode::new_inode(fs, S_IFDIR | (mode & 0o7777), uid, gid)?;
    let new_ino = new_dir.borrow().ino;

    add(fs, &new_dir, new_ino, b".")?;
    add(fs, &new_dir, parent_ino, b"..")?;
    {
        let mut d = new_dir.borrow_mut();
        d.link_count = 2;
    }
    inode::write_inode(fs, &new_dir, false)?;

    {
        let mut p = parent.borrow_mut();
        p.link_count += 1;
    }
    inode::write_inode(fs, parent, false)?;

    add(fs, parent, new_ino, name)?;
    Ok(new_dir)
}

/// Removes an empty subdirectory. Fails with `NotEmpty` unless only "."
/// and ".." remain.
pub fn rmdir(fs: &Filesystem, parent: &Rc<RefCell<Inode>>, name: &[u8]) -> Result<()> {
    let ino = find(fs, parent, name)?;
    if ino == 0 {
        bail!(ErrorKind::NotFound, "no such directory '{}'", String::from_utf8_lossy(name));
    }
    let child = inode::iget(fs, ino)?;
    if child.borrow().kind != FileKind::Directory {
        bail!(ErrorKind::Invalid, "'{}' is not a directory", String::from_utf8_lossy(name));
    }
    if child.borrow().dentry_count != 2 {
        bail!(ErrorKind::NotEmpty, "directory '{}' is not empty", String::from_utf8_lossy(name));
    }
    delete(fs, parent, ino)?;
    {
        child.borrow_mut().link_count = 0;
    }
    inode::delete_inode(fs, child)?;
    {
        let mut p = parent.borrow_mut();
        p.link_count = p.link_count.saturating_sub(1);
    }
    inode::write_inode(fs, parent, false)?;
    Ok(())
}

/// Removes a regular file or symlink entry, freeing the inode once its
/// link count reaches zero.
pub fn unlink(fs: &Filesystem, parent: &Rc<RefCell<Inode>>, name: &[u8]) -> Result<()> {
    let ino = find(fs, parent, name)?;
    if ino == 0 {
        bail!(ErrorKind::NotFound, "no such file '{}'", String::from_utf8_lossy(name));
    }
    let child = inode::iget(fs, ino)?;
    delete(fs, parent, ino)?;
    let link_count = {
        let mut c = child.borrow_mut();
        c.link_count = c.link_count.saturating_sub(1);
        c.link_count
    };
    if link_count == 0 {
        inode::delete_inode(fs, child)?;
    } else {
        inode::write_inode(fs, &child, false)?;
    }
    Ok(())
}

/// Moves `old_name` from `old_parent` to `new_name` in `new_parent`. If an
/// entry already occupies `new_name`, it is removed first (as rmdir or
/// unlink, per its kind). The new link is added before the old one is
/// deleted, matching this spec's safer ordering (the original
/// implementation deletes first).
pub fn rename(
    fs: &Filesystem,
    old_parent: &Rc<RefCell<Inode>>,
    old_name: &[u8],
    new_parent: &Rc<RefCell<Inode>>,
    new_name: &[u8],
) -> Result<()> {
    let old_ino = find(fs, old_parent, old_name)?;
    if old_ino == 0 {
        bail!(ErrorKind::NotFound, "no such entry '{}'", String::from_utf8_lossy(old_name));
    }

    let existing_ino = find(fs, new_parent, new_name)?;
    if existing_ino != 0 {
        let existing = inode::iget(fs, existing_ino)?;
        if existing.borrow().kind == FileKind::Directory {
            rmdir(fs, new_parent, new_name)?;
        } else {
            unlink(fs, new_parent, new_name)?;
        }
    }

    add(fs, new_parent, old_ino, new_name)?;
    delete(fs, old_parent, old_ino)?;
    Ok(())
}
