//! End-to-end scenario tests (`spec.md` §8, S1-S6), each driving the
//! on-disk image through a fresh temp-file "device" the way
//! `mkfs.wtfs`/`statfs.wtfs` would, exercising the public library API
//! rather than the CLI binaries directly.

use std::path::Path;

use wtfs::consts::*;
use wtfs::file::{self, SeekFrom};
use wtfs::inode::{self, FileKind};
use wtfs::mkfs::{self, MkfsOptions};
use wtfs::statfs;
use wtfs::super_block::SuperState;
use wtfs::symlink;
use wtfs::{dir, block_io::BlockIo};

fn make_image(blocks: u64) -> tempfile::NamedTempFile {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.as_file().set_len(blocks * BLOCK_SIZE).unwrap();
    tmp
}

fn format(path: &Path, label: Option<&str>) {
    mkfs::format(
        path,
        &MkfsOptions {
            quick: true,
            quiet: true,
            label: label.map(str::to_owned),
            uuid: None,
        },
    )
    .unwrap();
}

/// S1: fresh image reports 1 inode, `block_count - 6` free blocks, and
/// root lists "." and ".." both pointing at ino 1.
#[test]
fn s1_fresh_image() {
    let img = make_image(64);
    format(img.path(), Some("demo"));

    let io = BlockIo::open(img.path()).unwrap();
    let sb = SuperState::mount(&io).unwrap();
    assert_eq!(sb.inode_count(), 1);
    assert_eq!(sb.free_block_count(), sb.block_count() - 6);

    let entries = statfs::root_entries(&io, &sb).unwrap();
    assert!(entries.iter().any(|e| e.ino == ROOT_INO && e.name == b"."));
    assert!(entries.iter().any(|e| e.ino == ROOT_INO && e.name == b".."));
}

/// S2: create a file, write 13 bytes, remount, read them back exactly;
/// inode_count and free_block_count reflect the one new file.
#[test]
fn s2_create_and_read_back() {
    let img = make_image(64);
    format(img.path(), None);

    let free_before;
    {
        let fs = inode::Filesystem::mount(img.path()).unwrap();
        free_before = fs.sb.borrow().free_block_count();
        let root = fs.root().unwrap();
        let f = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
        dir::add(&fs, &root, f.borrow().ino, b"hello").unwrap();
        let mut open = file::open(f);
        open.write(&fs, b"Hello, wtfs!\n").unwrap();
        fs.sync(true).unwrap();
    }

    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let root = fs.root().unwrap();
    let ino = dir::find(&fs, &root, b"hello").unwrap();
    assert_ne!(ino, 0);
    let f = inode::iget(&fs, ino).unwrap();
    assert_eq!(f.borrow().size, 13);
    let mut open = file::open(f);
    let mut buf = [0u8; 13];
    assert_eq!(open.read(&fs, &mut buf).unwrap(), 13);
    assert_eq!(&buf, b"Hello, wtfs!\n");

    assert_eq!(fs.sb.borrow().inode_count(), 2);
    assert_eq!(fs.sb.borrow().free_block_count(), free_before - 1);
}

/// S3: a write crossing the 4080-byte data-payload boundary allocates
/// exactly one new block and the full content reads back intact.
#[test]
fn s3_block_boundary_write() {
    let img = make_image(64);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let free_before = fs.sb.borrow().free_block_count();
    let root = fs.root().unwrap();

    let x = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
    dir::add(&fs, &root, x.borrow().ino, b"x").unwrap();
    let mut open = file::open(x.clone());

    let pattern = vec![0x5au8; DATA_PAYLOAD];
    open.write(&fs, &pattern).unwrap();
    open.write(&fs, b"X").unwrap();

    assert_eq!(x.borrow().size, DATA_PAYLOAD as u64 + 1);
    assert_eq!(x.borrow().i_blocks, 2);
    assert_eq!(fs.sb.borrow().free_block_count(), free_before - 2);

    open.seek(SeekFrom::Start(0)).unwrap();
    let mut readback = vec![0u8; DATA_PAYLOAD + 1];
    open.read(&fs, &mut readback).unwrap();
    assert_eq!(&readback[..DATA_PAYLOAD], pattern.as_slice());
    assert_eq!(readback[DATA_PAYLOAD], b'X');
}

/// S4: filling the root directory past 63 entries extends its block
/// chain; unlinking everything restores dentry_count without freeing the
/// extension block (policy: directory blocks shrink only at rmdir).
#[test]
fn s4_directory_fill_and_drain() {
    let img = make_image(256);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let root = fs.root().unwrap();
    assert_eq!(root.borrow().i_blocks, 1);

    let mut inos = Vec::new();
    for i in 0..63 {
        let f = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
        let name = format!("f{i}");
        dir::add(&fs, &root, f.borrow().ino, name.as_bytes()).unwrap();
        inos.push((name, f.borrow().ino));
    }

    assert_eq!(root.borrow().dentry_count, 65);
    assert_eq!(root.borrow().i_blocks, 2);
    assert_eq!(root.borrow().size, 2 * BLOCK_SIZE);

    for (name, ino) in &inos {
        dir::delete(&fs, &root, *ino).unwrap();
        let child = inode::iget(&fs, *ino).unwrap();
        inode::delete_inode(&fs, child).unwrap();
        let _ = name;
    }

    assert_eq!(root.borrow().dentry_count, 2);
    // Directory block chain is retained even though one block is now
    // entirely empty dentries (policy in spec.md §4.7).
    assert_eq!(root.borrow().i_blocks, 2);
}

/// S5: a symlink stores and returns its target exactly, with the right
/// mode, link count, and size.
#[test]
fn s5_symlink() {
    let img = make_image(64);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let root = fs.root().unwrap();

    let link = symlink::create(&fs, &root, b"link", b"hello", 0, 0).unwrap();
    assert_eq!(link.borrow().kind, FileKind::Symlink);
    assert_eq!(link.borrow().mode & S_IFMT, S_IFLNK);
    assert_eq!(link.borrow().link_count, 1);
    assert_eq!(link.borrow().size, 5);

    let target = symlink::read_target(&fs, &link).unwrap();
    assert_eq!(target, b"hello");
}

/// S6: renaming onto an existing entry frees the overwritten inode and
/// its single data block.
#[test]
fn s6_rename_overwrite() {
    let img = make_image(64);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let root = fs.root().unwrap();

    let a = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
    dir::add(&fs, &root, a.borrow().ino, b"a").unwrap();
    file::open(a.clone()).write(&fs, b"0123456789abc").unwrap(); // 13 bytes

    let b = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
    dir::add(&fs, &root, b.borrow().ino, b"b").unwrap();
    file::open(b.clone()).write(&fs, b"wxyz").unwrap(); // 4 bytes

    let inode_count_before = fs.sb.borrow().inode_count();
    let free_before = fs.sb.borrow().free_block_count();

    dir::rename(&fs, &root, b"a", &root, b"b").unwrap();

    assert_eq!(dir::find(&fs, &root, b"a").unwrap(), 0);
    let b_ino = dir::find(&fs, &root, b"b").unwrap();
    assert_eq!(b_ino, a.borrow().ino);

    let moved = inode::iget(&fs, b_ino).unwrap();
    let mut open = file::open(moved);
    let mut buf = [0u8; 13];
    assert_eq!(open.read(&fs, &mut buf).unwrap(), 13);
    assert_eq!(&buf, b"0123456789abc");

    assert_eq!(fs.sb.borrow().inode_count(), inode_count_before - 1);
    assert_eq!(fs.sb.borrow().free_block_count(), free_before + 1);
}

/// Boundary: a 55-byte filename is accepted, a 56-byte one is rejected.
#[test]
fn filename_length_boundary() {
    let img = make_image(64);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let root = fs.root().unwrap();
    let f = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();

    let name_55 = vec![b'a'; 55];
    dir::add(&fs, &root, f.borrow().ino, &name_55).unwrap();

    let g = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
    let name_56 = vec![b'b'; 56];
    let err = dir::add(&fs, &root, g.borrow().ino, &name_56).unwrap_err();
    assert_eq!(err.kind(), wtfs::ErrorKind::TooLong);
}

/// Boundary: reading at EOF returns 0 bytes without error; seeking one
/// past end of file fails.
#[test]
fn eof_and_seek_boundaries() {
    let img = make_image(64);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let f = inode::new_inode(&fs, S_IFREG | 0o644, 0, 0).unwrap();
    let mut open = file::open(f);
    open.write(&fs, b"abc").unwrap();

    open.seek(SeekFrom::Start(3)).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(open.read(&fs, &mut buf).unwrap(), 0);

    assert!(open.seek(SeekFrom::Start(4)).is_err());
}

/// mkdir followed by rmdir restores the super counters to their
/// pre-mkdir values.
#[test]
fn mkdir_rmdir_restores_counters() {
    let img = make_image(64);
    format(img.path(), None);
    let fs = inode::Filesystem::mount(img.path()).unwrap();
    let root = fs.root().unwrap();

    let inode_count_before = fs.sb.borrow().inode_count();
    let free_before = fs.sb.borrow().free_block_count();

    dir::mkdir(&fs, &root, b"sub", 0o755, 0, 0).unwrap();
    dir::rmdir(&fs, &root, b"sub").unwrap();

    assert_eq!(fs.sb.borrow().inode_count(), inode_count_before);
    assert_eq!(fs.sb.borrow().free_block_count(), free_before);
}
