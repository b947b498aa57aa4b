//! Error types for the image validator and extractor.
//!
//! Every variant maps to one of the exit codes defined by the `fsck`
//! convention the CLI follows: usage errors exit 16, operational (I/O)
//! errors exit 8, and anything indicating an uncorrected filesystem defect
//! exits 4.

use std::io;
use thiserror::Error;

/// Exit code: everything checked out.
pub const EXIT_OK: i32 = 0;
/// Exit code: uncorrected filesystem errors were found.
pub const EXIT_UNCORRECTED: i32 = 4;
/// Exit code: an operational (I/O, OOM, syscall) error occurred.
pub const EXIT_OPERATIONAL: i32 = 8;
/// Exit code: the command line was malformed.
pub const EXIT_USAGE: i32 = 16;

/// All ways validation or extraction of a polyfs image can fail.
#[derive(Debug, Error)]
pub enum PolyfsckError {
    /// The command line was malformed.
    #[error("{0}")]
    Usage(String),

    /// An I/O operation failed.
    #[error("{0}")]
    Io(String),

    /// A heap allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// Neither candidate superblock offset produced the magic value.
    #[error("superblock magic not found")]
    BadMagic,

    /// `super.size` is smaller than `BLOCK_SIZE`.
    #[error("superblock size is too small")]
    SuperblockTooSmall,

    /// `flags` has bits set outside the supported set.
    #[error("filesystem uses unsupported features")]
    UnsupportedFeature,

    /// `FSID_VERSION_1` is not set.
    #[error("unsupported filesystem version")]
    InvalidVersion,

    /// `fsid.files == 0` while version 1 is declared.
    #[error("filesystem reports zero files")]
    ZeroFileCount,

    /// The underlying file/device is shorter than `super.size`.
    #[error("file length too short to hold filesystem of size {size}")]
    TruncatedImage {
        /// Declared size in the superblock.
        size: u64,
    },

    /// The stored CRC does not match the computed one.
    #[error("crc error")]
    CrcMismatch,

    /// A directory inode has `offset == 0` but `size != 0` (or vice versa).
    #[error("bad directory inode")]
    BadDirInode,

    /// A name's declared length doesn't match its actual length within the
    /// NUL-padding tolerance.
    #[error("bad name length")]
    BadNameLength,

    /// A directory entry has a zero-length name.
    #[error("empty name in directory entry")]
    EmptyName,

    /// A child's offset does not lie strictly after its parent directory.
    #[error("bad child offset in directory entry")]
    BadChildOffset,

    /// The root inode's mode does not carry the directory file-type bits.
    #[error("root inode is not a directory")]
    RootNotDirectory,

    /// The root's byte offset doesn't match the expected post-superblock
    /// location while `SHIFTED_ROOT_OFFSET` is clear.
    #[error("bad root inode offset")]
    BadRootOffset,

    /// A regular file inode has `offset == 0` xor `size == 0`.
    #[error("inconsistent regular file inode")]
    FileInodeInconsistent,

    /// A symlink inode has a zero offset.
    #[error("symlink has zero offset")]
    SymlinkZeroOffset,

    /// A symlink inode has a zero size.
    #[error("symlink has zero size")]
    SymlinkZeroSize,

    /// A decoded symlink target's length doesn't match `inode.size`.
    #[error("symlink target size mismatch")]
    SymlinkSizeMismatch,

    /// A char/block/FIFO/socket inode has a nonzero offset.
    #[error("special file has nonzero offset")]
    SpecialHasOffset,

    /// A FIFO inode has a nonzero size.
    #[error("fifo has nonzero size")]
    FifoHasSize,

    /// A socket inode has a nonzero size.
    #[error("socket has nonzero size")]
    SocketHasSize,

    /// The inode's file-type bits don't match any known kind.
    #[error("bogus inode mode")]
    BogusMode,

    /// A compressed block exceeds the algorithm's maximum size.
    #[error("compressed block too large")]
    BlockTooLarge,

    /// A decompressed block's length doesn't match the expected block size.
    #[error("decompressed block size mismatch")]
    BlockSizeMismatch,

    /// The decompressor failed to produce a complete block.
    #[error("decompression error")]
    DecompressError,

    /// An LZO block decodes differently in place than out of place.
    #[error("lzo overlap safety check failed")]
    LzoOverlapError,

    /// The data region starts before the end of the superblock.
    #[error("data region starts before end of superblock")]
    DataBeforeSuper,

    /// `end_dir != start_data` after the walk completed.
    #[error("gap or overlap between directory and data regions")]
    DirDataGap,

    /// `end_data > super.size`.
    #[error("data region extends past end of filesystem")]
    DataPastEnd,
}

impl From<io::Error> for PolyfsckError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl PolyfsckError {
    /// Returns the process exit code this error corresponds to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Io(_) | Self::OutOfMemory => EXIT_OPERATIONAL,
            _ => EXIT_UNCORRECTED,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PolyfsckError>;
