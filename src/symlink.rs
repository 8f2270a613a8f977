//! Symlink engine (`spec.md` §4.9): store and retrieve a target path in a
//! symlink inode's single data block. The on-disk record's own length
//! field is authoritative, so no separate union of representations is
//! needed — the inode's `size_or_count` simply mirrors it.

use std::rc::Rc;
use std::cell::RefCell;

use crate::consts::*;
use crate::error::{ErrorKind, Result, bail};
use crate::inode::{self, Filesystem, Inode};
use crate::layout::SymlinkRecord;
use crate::util::now_secs;

/// Creates a new symlink inode under `parent` named `name`, pointing at
/// `target`. Fails with `TooLong` if `target` exceeds `SYMLINK_MAX` bytes.
pub fn create(
    fs: &Filesystem,
    parent: &Rc<RefCell<Inode>>,
    name: &[u8],
    target: &[u8],
    uid: u32,
    gid: u32,
) -> Result<Rc<RefCell<Inode>>> {
    if target.len() >= SYMLINK_MAX {
        bail!(ErrorKind::TooLong, "symlink target longer than {} bytes", SYMLINK_MAX - 1);
    }
    let link = inode::new_inode(fs, S_IFLNK | 0o777, uid, gid)?;
    write_target(fs, &link, target)?;
    crate::dir::add(fs, parent, link.borrow().ino, name)?;
    Ok(link)
}

/// Overwrites `link`'s target in place.
pub fn write_target(fs: &Filesystem, link: &Rc<RefCell<Inode>>, target: &[u8]) -> Result<()> {
    if target.len() >= SYMLINK_MAX {
        bail!(ErrorKind::TooLong, "symlink target longer than {} bytes", SYMLINK_MAX - 1);
    }
    let first_block = link.borrow().first_block;
    let buf = fs.io.read(first_block)?;
    let mut rec = SymlinkRecord {
        length: target.len() as u16,
        path: [0u8; SYMLINK_MAX],
    };
    rec.path[..target.len()].copy_from_slice(target);
    {
        let mut b = buf.borrow_mut();
        rec.write_to(b.data_mut());
    }
    fs.io.write_through(&buf)?;

    let now = now_secs();
    {
        let mut l = link.borrow_mut();
        l.size = target.len() as u64;
        l.mtime = now;
        l.ctime = now;
    }
    inode::write_inode(fs, link, false)?;
    Ok(())
}

/// Reads `link`'s current target into an owned buffer.
pub fn read_target(fs: &Filesystem, link: &Rc<RefCell<Inode>>) -> Result<Vec<u8>> {
    let first_block = link.borrow().first_block;
    let buf = fs.io.read(first_block)?;
    let rec = SymlinkRecord::from_bytes(&buf.borrow().data()[..]);
    Ok(rec.target().to_vec())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::fresh_filesystem_ctx;

    #[test]
    fn create_then_read_target_roundtrips() {
        let (fs, _tmp) = fresh_filesystem_ctx(64);
        let root = fs.root().unwrap();
        let link = create(&fs, &root, b"shortcut", b"/usr/bin/real", 0, 0).unwrap();
        assert_eq!(link.borrow().size, 13);
        assert_eq!(read_target(&fs, &link).unwrap(), b"/usr/bin/real");
        assert_eq!(crate::dir::find(&fs, &root, b"shortcut").unwrap(), link.borrow().ino);
    }

    #[test]
    fn overlong_target_is_rejected() {
        let (fs, _tmp) = fresh_filesystem_ctx(64);
        let root = fs.root().unwrap();
        let too_long = vec![b'x'; SYMLINK_MAX];
        let err = create(&fs, &root, b"bad", &too_long, 0, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooLong);
    }

    #[test]
    fn write_target_updates_existing_symlink() {
        let (fs, _tmp) = fresh_filesystem_ctx(64);
        let root = fs.root().unwrap();
        let link = create(&fs, &root, b"l", b"/a", 0, 0).unwrap();
        write_target(&fs, &link, b"/b/c").unwrap();
        assert_eq!(read_target(&fs, &link).unwrap(), b"/b/c");
        assert_eq!(link.borrow().size, 4);
    }
}
