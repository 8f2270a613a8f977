//! `mkfs.wtfs` formats a device or image file as a fresh wtfs volume
//! (`spec.md` §4.11, §6.3). Argument parsing mirrors the teacher's
//! `mkfs/src/main.rs`/`fdisk/src/main.rs` hand-rolled `(prog, args)` idiom
//! (no arg-parsing crate appears anywhere in the pack); flag names and
//! behavior mirror `original_source/src/mkfs.wtfs.c`'s `getopt_long` table
//! verbatim.

use std::env;
use std::fs::File;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::exit;

use wtfs::cli::{fatal, fatal_stage};
use wtfs::mkfs::{self, MkfsOptions};

const USAGE: &str = "Usage: mkfs.wtfs [OPTIONS] <DEVICE>\n\
\n\
Make a wtfs filesystem.\n\
\n\
Options:\n\
  -f, --fast            quick format (skip the deep zero-fill pass)\n\
  -q, --quiet           quiet mode\n\
  -F, --force           force execution (skip the mounted-device check)\n\
  -L, --label=LABEL     set filesystem label\n\
  -U, --uuid=UUID       set filesystem UUID\n\
  -V, --version         show version and exit\n\
  -h, --help            show this message and exit\n";

#[derive(Default)]
struct Args {
    prog: String,
    fast: bool,
    quiet: bool,
    force: bool,
    label: Option<String>,
    uuid: Option<String>,
    version: bool,
    help: bool,
    device: Option<PathBuf>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args {
        prog: argv.next().unwrap_or_else(|| "mkfs.wtfs".to_owned()),
        ..Default::default()
    };

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-f" | "--fast" => args.fast = true,
            "-q" | "--quiet" => args.quiet = true,
            "-F" | "--force" => args.force = true,
            "-V" | "--version" => args.version = true,
            "-h" | "--help" => args.help = true,
            "-L" => args.label = Some(argv.next().ok_or("-L requires an argument")?),
            "-U" => args.uuid = Some(argv.next().ok_or("-U requires an argument")?),
            _ if arg.starts_with("--label=") => {
                args.label = Some(arg["--label=".len()..].to_owned());
            }
            _ if arg.starts_with("--uuid=") => {
                args.uuid = Some(arg["--uuid=".len()..].to_owned());
            }
            _ if arg.starts_with('-') && arg != "-" => {
                return Err(format!("unrecognized option '{arg}'"));
            }
            _ => {
                if args.device.is_some() {
                    return Err("only one device may be given".to_owned());
                }
                args.device = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(args)
}

/// Best-effort check of whether `device` appears as a mount source in
/// `/proc/self/mounts`. Deferred to the host mount table per `spec.md`
/// §1/§4.11; this is the closest userspace equivalent without shelling
/// out to `findmnt`/`libmount`, which is absent from the pack.
fn is_mounted(device: &std::path::Path) -> bool {
    let Ok(canon) = std::fs::canonicalize(device) else {
        return false;
    };
    let Ok(file) = File::open("/proc/self/mounts") else {
        return false;
    };
    std::io::BufReader::new(file).lines().map_while(Result::ok).any(|line| {
        line.split_whitespace()
            .next()
            .and_then(|src| std::fs::canonicalize(src).ok())
            .is_some_and(|src| src == canon)
    })
}

fn main() {
    let args = match parse_args(env::args()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("mkfs.wtfs: {e}");
            eprint!("{USAGE}");
            exit(1);
        }
    };
    let prog = args.prog.clone();

    if args.version {
        println!("mkfs.wtfs version {}", env!("CARGO_PKG_VERSION"));
        exit(0);
    }
    if args.help {
        print!("{USAGE}");
        exit(0);
    }

    let Some(device) = args.device else {
        eprint!("{USAGE}");
        exit(1);
    };

    if !args.force && is_mounted(&device) {
        fatal(&prog, format_args!("'{}' is already mounted", device.display()));
    }

    if !args.force && mkfs::is_present(&device).unwrap_or(false) {
        eprintln!(
            "{prog}: {} already contains a wtfs filesystem",
            device.display()
        );
        eprint!("This will overwrite an existing wtfs filesystem — continue? [y/N] ");
        use std::io::Write as _;
        std::io::stdout().flush().ok();
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).ok();
        if !answer.trim().eq_ignore_ascii_case("y") {
            eprintln!("{prog}: Abort.");
            exit(1);
        }
    }

    let uuid = match args.uuid.as_deref().map(uuid::Uuid::parse_str) {
        Some(Ok(u)) => Some(u),
        Some(Err(_)) => fatal(&prog, format_args!("invalid UUID '{}'", args.uuid.unwrap())),
        None => None,
    };

    let opts = MkfsOptions {
        quick: args.fast,
        quiet: args.quiet,
        label: args.label,
        uuid,
    };

    if let Err(e) = mkfs::format(&device, &opts) {
        fatal_stage(&prog, "format device", e);
    }
}
