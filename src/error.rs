//! The error taxonomy surfaced by every fallible operation in this crate.

use core::fmt::{self, Debug, Display};

/// Reasons a BPB/partition-table decode can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormatError {
    /// Missing `0x55 0xAA` signature, or boot-sector jump bytes unrecognized.
    InvalidBpb,
    /// Bytes-per-sector isn't 512.
    UnsupportedSectorSize,
    /// Classified as FAT12, which this crate does not support.
    UnsupportedFat,
    /// FAT entry is `0` (free) or the BAD-cluster sentinel.
    CorruptCluster,
    /// A cluster chain was walked past its end-of-chain marker.
    UnexpectedEndOfChain,
    /// No GPT, MBR, or tableless candidate yielded a usable FAT partition.
    NoFatPartition,
}

impl Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FormatError::InvalidBpb => "invalid BIOS parameter block",
            FormatError::UnsupportedSectorSize => "unsupported bytes-per-sector",
            FormatError::UnsupportedFat => "unsupported FAT variant (FAT12?)",
            FormatError::CorruptCluster => "corrupt FAT cluster entry",
            FormatError::UnexpectedEndOfChain => "cluster chain ended unexpectedly",
            FormatError::NoFatPartition => "no usable FAT partition found",
        };
        f.write_str(msg)
    }
}

/// Uniform operation-failure type for this crate. `E` is the underlying
/// [`crate::BlockDevice::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<E> {
    /// Called before a successful `mount` or after `unmount`.
    NotInitialized,
    /// Null/empty path, fd out of range, handle not open, invalid `whence`,
    /// bad seek target, invalid `oflag`.
    BadArgument,
    /// The block device returned an error.
    Medium(E),
    /// BPB/FAT-classification failure.
    Format(FormatError),
    /// Create-on-open, write-to-data, or open-of-directory.
    Unsupported,
    /// Directory walk exhausted without a match, or a mid-path component
    /// wasn't a directory.
    NotFound,
    /// No free file handle.
    NoResource,
}

impl<E> From<FormatError> for Error<E> {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl<E: Debug> Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotInitialized => f.write_str("volume is not mounted"),
            Error::BadArgument => f.write_str("invalid argument"),
            Error::Medium(e) => write!(f, "medium error: {:?}", e),
            Error::Format(e) => write!(f, "format error: {}", e),
            Error::Unsupported => f.write_str("operation not supported"),
            Error::NotFound => f.write_str("not found"),
            Error::NoResource => f.write_str("no free file handle"),
        }
    }
}

using_std! {
    impl<E: Debug> std::error::Error for Error<E> {}
    impl std::error::Error for FormatError {}
}
