use std::io;
use thiserror::Error;

/// Errors surfaced by the descriptor shim.
///
/// Every variant maps onto the errno a C caller would observe, see
/// [`FsError::errno`].
#[derive(Error, Debug)]
pub enum FsError {
    /// A builtin-prefixed path is not in the store. Never falls back to the
    /// host filesystem.
    #[error("builtin entry not found")]
    NotFound,
    /// Every slot of the open builtin file table is taken
    #[error("too many open builtin files")]
    TooManyOpenFiles,
    /// No descriptor integer is left below the tracked maximum
    #[error("descriptor namespace exhausted")]
    DescriptorsExhausted,
    /// The descriptor or stream is not open (includes double close)
    #[error("bad file descriptor")]
    BadDescriptor,
    /// Seeking would move the position outside of `[0, size]`
    #[error("invalid seek position")]
    InvalidSeek,
    /// Malformed argument, for example an interior NUL in a path
    #[error("invalid input")]
    InvalidInput,
    /// The real filesystem reported an error
    #[error("host filesystem error: {0}")]
    Host(#[from] io::Error),
}

impl FsError {
    /// The errno value equivalent to this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::TooManyOpenFiles => libc::EMFILE,
            FsError::DescriptorsExhausted => libc::ENFILE,
            FsError::BadDescriptor => libc::EBADF,
            FsError::InvalidSeek => libc::EINVAL,
            FsError::InvalidInput => libc::EINVAL,
            FsError::Host(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Stable name for logging.
    pub fn kind_str(&self) -> &'static str {
        match self {
            FsError::NotFound => "not_found",
            FsError::TooManyOpenFiles => "too_many_open_files",
            FsError::DescriptorsExhausted => "descriptors_exhausted",
            FsError::BadDescriptor => "bad_descriptor",
            FsError::InvalidSeek => "invalid_seek",
            FsError::InvalidInput => "invalid_input",
            FsError::Host(_) => "host",
        }
    }
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;
