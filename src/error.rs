//! Error taxonomy shared by every component of the filesystem core.

use std::fmt;
use std::io;

/// The error kinds a core operation or CLI tool can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Name lookup or bitmap walk did not find a target.
    NotFound,
    /// Allocator could not satisfy a request.
    NoSpace,
    /// Filename >= 56 bytes or symlink path >= 4094 bytes.
    TooLong,
    /// Zero-length filename passed to directory add.
    EmptyName,
    /// rmdir on a directory with entries other than "." and "..".
    NotEmpty,
    /// Attempt to create or iget an inode with unsupported mode bits.
    NotSupported,
    /// Bad argument (negative seek, misaligned position, ...).
    Invalid,
    /// Underlying block read/write failed.
    IoError,
    /// Magic mismatch, version mismatch, or structural invariant violation.
    BadFs,
    /// Transient allocation failure in the host.
    OutOfMemory,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::NoSpace => "no space left",
            ErrorKind::TooLong => "name too long",
            ErrorKind::EmptyName => "empty name",
            ErrorKind::NotEmpty => "directory not empty",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::Invalid => "invalid argument",
            ErrorKind::IoError => "I/O error",
            ErrorKind::BadFs => "bad filesystem",
            ErrorKind::OutOfMemory => "out of memory",
        };
        f.write_str(s)
    }
}

/// An error with context, as returned by every fallible operation in this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.context, self.kind)
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::new(ErrorKind::IoError, e.to_string())
    }
}

/// Shorthand alias used by every fallible function in this crate.
pub type Result<T> = std::result::Result<T, Error>;

macro_rules! bail {
    ($kind:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::new($kind, format!($($arg)*)))
    };
}
pub(crate) use bail;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = Error::new(ErrorKind::NotFound, "looking up 'hello'");
        assert_eq!(e.to_string(), "looking up 'hello': not found");
    }

    #[test]
    fn display_without_context() {
        let e = Error::new(ErrorKind::NoSpace, "");
        assert_eq!(e.to_string(), "no space left");
    }

    #[test]
    fn from_io_error_maps_to_io_error_kind() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let e: Error = io_err.into();
        assert_eq!(e.kind(), ErrorKind::IoError);
    }
}
