use std::io;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

const EIO: i32 = 5;
const EINVAL: i32 = 22;

/// An error reading from an archive
///
/// Errors are cheap to clone, so the same failure can be handed to everyone waiting on a load.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("Unknown inode type {0}")]
    UnsupportedInodeType(u16),
    #[error("Malformed inode {inode:#x}: {reason}")]
    MalformedRecord { inode: u64, reason: String },
    #[error(transparent)]
    Superblock(#[from] SuperblockError),
    #[error("Load of inode {0} was abandoned before it completed")]
    Abandoned(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Id index {idx} out of range: the id table has {count} entries")]
    OutOfRange { idx: u16, count: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("Fragment index {idx} out of range: the fragment table has {count} entries")]
    OutOfRange { idx: u32, count: u32 },
    #[error("Fragment {idx} has no valid block address")]
    InvalidBlock { idx: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuperblockError {
    #[error(
        "Magic mismatch: expected {expected:#x}, got {magic:#x}",
        expected = repr::superblock::MAGIC
    )]
    BadMagic { magic: u32 },
    #[error("Invalid archive version {major}.{minor}: only version 4.0 is supported")]
    BadVersion { major: u16, minor: u16 },
    #[error("Block size {block_size} does not match block log {block_log}")]
    CorruptBlockSizes { block_log: u16, block_size: u32 },
    #[error("Unknown compression type: {0}")]
    UnknownCompression(u16),
    #[error("Built without support for {0}")]
    DisabledCompression(crate::compression::Kind),
}

impl Error {
    pub(crate) fn malformed(inode: repr::inode::Ref, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            inode: inode.0,
            reason: reason.into(),
        }
    }

    /// The errno a filesystem host should report for this error
    ///
    /// Only failures of the underlying storage are `EIO`: anything else means this particular
    /// object is invalid.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::Io(_) | Error::Abandoned(_) => EIO,
            Error::Id(_)
            | Error::Fragment(_)
            | Error::UnsupportedInodeType(_)
            | Error::MalformedRecord { .. }
            | Error::Superblock(_) => EINVAL,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}
