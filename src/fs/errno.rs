//! The filesystem's error type and its mapping to POSIX errno values.

use thiserror::Error;

/// Errors this core can return.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no space left on device")]
    NoSpace,
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("operation not supported")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The POSIX negative-errno value the kernel VFS convention expects for
    /// this error.
    pub fn to_negative_errno(&self) -> i32 {
        -match self {
            Error::Io(_) => libc::EIO,
            Error::NoSpace => libc::ENOSPC,
            Error::NotFound => libc::ENOENT,
            Error::AlreadyExists => libc::EEXIST,
            Error::IsADirectory => libc::EISDIR,
            Error::NotADirectory => libc::ENOTDIR,
            Error::NotEmpty => libc::ENOTEMPTY,
            Error::Unsupported => libc::ENXIO,
        }
    }

    /// The positive errno value `fuser`'s `ReplyError` expects — the mirror
    /// image of the kernel-VFS negative-errno convention `to_negative_errno`
    /// documents, flipped once at the `fuser` adapter boundary.
    pub fn to_positive_errno(&self) -> i32 {
        -self.to_negative_errno()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn maps_to_expected_errno() {
        assert_eq!(Error::NoSpace.to_negative_errno(), -libc::ENOSPC);
        assert_eq!(Error::NotFound.to_positive_errno(), libc::ENOENT);
    }
}
