//! `statfs.wtfs` prints a textual summary of a mounted wtfs instance
//! (`spec.md` §4.12, §6.3): the super record, chain diagnostics for the
//! inode table and both bitmap chains, and the root directory's non-empty
//! entries. Grounded directly on
//! `original_source/src/statfs.wtfs.c`'s `main`/`read_super_block`/
//! `read_inode_table`/`read_block_bitmap`/`read_inode_bitmap`/
//! `read_root_dir` sequence.

use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;

use wtfs::block_io::BlockIo;
use wtfs::cli::fatal_stage;
use wtfs::statfs;
use wtfs::super_block::SuperState;

const USAGE: &str = "Usage: statfs.wtfs <FILE>\n\
FILE can be a block device or image containing a wtfs instance, or any \
file within a wtfs instance\n";

fn main() {
    let mut argv = env::args();
    let prog = argv.next().unwrap_or_else(|| "statfs.wtfs".to_owned());
    let Some(arg) = argv.next() else {
        eprint!("{USAGE}");
        exit(1);
    };
    if argv.next().is_some() {
        eprint!("{USAGE}");
        exit(1);
    }

    let path = resolve_path(&prog, PathBuf::from(arg));
    let io = match BlockIo::open(&path) {
        Ok(io) => io,
        Err(e) => fatal_stage(&prog, "read device", e),
    };
    let sb = match SuperState::mount(&io) {
        Ok(sb) => sb,
        Err(_) => {
            eprintln!("{prog}: No wtfs instance is found");
            exit(1);
        }
    };

    print_super(&sb);
    print_chain(&io, "inode table", sb.inode_table_first());
    print_chain(&io, "block bitmap", sb.block_bitmap_first());
    print_chain(&io, "inode bitmap", sb.inode_bitmap_first());

    match statfs::root_entries(&io, &sb) {
        Ok(entries) => {
            println!("Root directory");
            for e in entries {
                println!("{}  {}", e.ino, String::from_utf8_lossy(&e.name));
            }
        }
        Err(e) => fatal_stage(&prog, "read root directory", e),
    }
}

/// If `path` is a directory or regular file rather than a device/image,
/// resolves it to the underlying block device via its `st_dev`, matching
/// the original's `/dev/block/<major>:<minor>` fallthrough.
fn resolve_path(prog: &str, path: PathBuf) -> PathBuf {
    let Ok(file) = File::open(&path) else {
        return path;
    };
    let Ok(ready) = statfs::is_directly_readable(&file) else {
        return path;
    };
    if ready {
        return path;
    }
    let meta = match file.metadata() {
        Ok(m) => m,
        Err(_) => return path,
    };
    if !meta.file_type().is_dir() && !meta.is_file() {
        eprintln!("{prog}: No wtfs instance is found");
        exit(1);
    }
    statfs::resolve_device(&path).unwrap_or(path)
}

fn print_super(sb: &SuperState) {
    let stats = sb.stats();
    let rec = sb.record();
    println!("wtfs on this device");
    println!("{:<24}{}.{}", "Version:", rec.version >> 8, rec.version & 0xff);
    println!("{:<24}0x{:04x}", "Magic number:", rec.magic);
    println!("{:<24}{}", "Block size:", rec.block_size);
    println!("{:<24}{}", "Total blocks:", stats.block_count);
    println!("{:<24}{}", "First inode table:", rec.inode_table_first);
    println!("{:<24}{}", "Total inode tables:", rec.inode_table_count);
    println!("{:<24}{}", "First block bitmap:", rec.block_bitmap_first);
    println!("{:<24}{}", "Total block bitmaps:", rec.block_bitmap_count);
    println!("{:<24}{}", "First inode bitmap:", rec.inode_bitmap_first);
    println!("{:<24}{}", "Total inode bitmaps:", rec.inode_bitmap_count);
    println!("{:<24}{}", "Total inodes:", stats.inode_count);
    println!("{:<24}{}", "Free blocks:", stats.free_block_count);
    if !stats.label.is_empty() {
        println!("{:<24}{}", "Label:", stats.label);
    }
    if !stats.uuid.is_nil() {
        println!("{:<24}{}", "UUID:", stats.uuid);
    }
    println!();
}

fn print_chain(io: &BlockIo, name: &str, head: u64) {
    match statfs::chain_links(io, head) {
        Ok(links) => {
            for link in links {
                println!("In {name} {}:", link.index);
                println!("prev: {}", link.prev);
                println!("next: {}", link.next);
                println!();
            }
        }
        Err(e) => eprintln!("statfs.wtfs: Failed to read {name}: {e}"),
    }
}
