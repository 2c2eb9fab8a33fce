//! A squashfs filesystem consists of a maximum of nine parts, packed together on a byte alignment:
//!
//! * [Superblock](superblock/index.html)
//! * Compression Options
//! * [Datablocks & Fragments](datablock/index.html)
//! * [Inode Table](inode/index.html)
//! * Directory Table
//! * [Fragment Table](fragment/index.html)
//! * Export Table
//! * [UID/GID Lookup Table](uid_gid/index.html)
//! * [Xattr Table](xattr/index.html)
//!
//! Every multi-byte integer is stored little-endian. The structures in this crate use the
//! [`zerocopy`] little-endian wrappers so they can be read straight out of a byte buffer on any
//! host.

use bitflags::bitflags;
use zerocopy::byteorder::{LittleEndian, U16, U32, U64};

pub mod compression;
pub mod datablock;
pub mod fragment;
pub mod inode;
pub mod metablock;
pub mod superblock;
pub mod uid_gid;
pub mod xattr;

/// A little-endian `u16` as stored on disk
pub type Le16 = U16<LittleEndian>;
/// A little-endian `u32` as stored on disk
pub type Le32 = U32<LittleEndian>;
/// A little-endian `u64` as stored on disk
pub type Le64 = U64<LittleEndian>;

pub const BLOCK_LOG_MIN: u16 = 12;
pub const BLOCK_LOG_MAX: u16 = 20;

bitflags! {
    /// The mode bits of an item: permissions in the low 12 bits, file type in the high 4
    #[derive(Default)]
    pub struct Mode: u16 {
        const OTHER_EXEC =  0o000_001;
        const OTHER_WRITE = 0o000_002;
        const OTHER_READ =  0o000_004;
        const GROUP_EXEC =  0o000_010;
        const GROUP_WRITE = 0o000_020;
        const GROUP_READ =  0o000_040;
        const USER_EXEC =   0o000_100;
        const USER_WRITE =  0o000_200;
        const USER_READ =   0o000_400;
        const BIT_STICKY =  0o001_000;
        const BIT_SGID =    0o002_000;
        const BIT_SUID =    0o004_000;

        const TYPE_FIFO =   0o010_000;
        const TYPE_CHAR =   0o020_000;
        const TYPE_DIR  =   0o040_000;
        const TYPE_BLOCK =  0o060_000;
        const TYPE_FILE =   0o100_000;
        const TYPE_LINK =   0o120_000;
        const TYPE_SOCKET = 0o140_000;

    }
}

impl Mode {
    pub const O755: Mode = Mode { bits: 0o000_755 };
    pub const O644: Mode = Mode { bits: 0o000_644 };
    pub const PERM_MASK: Mode = Mode { bits: 0o007_777 };
    pub const TYPE_MASK: Mode = Mode { bits: 0o170_000 };
    pub const NONE: Mode = Mode { bits: 0 };

    /// Keep only the permission bits of `bits`, discarding anything in the type field
    pub fn permissions(bits: u16) -> Mode {
        Mode::from_bits_truncate(bits) & Mode::PERM_MASK
    }

    /// The file type portion of this mode
    pub fn file_type(self) -> Mode {
        self & Mode::TYPE_MASK
    }
}

#[test]
fn permissions_drop_type_bits() {
    let mode = Mode::permissions(0o100_644);
    assert_eq!(mode, Mode::O644);
    assert_eq!(mode.file_type(), Mode::NONE);
    assert_eq!((mode | Mode::TYPE_LINK).file_type(), Mode::TYPE_LINK);
}
