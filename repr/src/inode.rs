//! Inode Table
//!
//! Metadata (ownership, permissions, etc) for items in the archive
//!
//! Every inode starts with a [`Header`](struct.Header.html), followed by a kind specific body.
//! The structures here contain the header as their first field, so a whole record can be read
//! in one go from its start.

use crate::{datablock, fragment, metablock, uid_gid, xattr, Le16, Le32, Le64, Mode};
use static_assertions::const_assert_eq;
use std::mem;
use zerocopy::{AsBytes, FromBytes, Unaligned};

/// The location of an inode: a 48 bit value.
///
/// The upper 32 bits hold the byte offset of the metadata block containing the inode, relative
/// to the start of the inode table. The lower 16 bits hold the offset of the inode within the
/// uncompressed metadata block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ref(pub u64);

impl Ref {
    #[inline]
    pub fn new(block_start: u32, start_offset: u16) -> Self {
        Ref(u64::from(block_start) << 16 | u64::from(start_offset))
    }

    #[inline]
    pub fn block_start(self) -> u32 {
        ((self.0 >> 16) & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub fn start_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    #[inline]
    pub fn split(self) -> (u32, u16) {
        (self.block_start(), self.start_offset())
    }
}

/// The position of an inode in the full list of inodes
///
/// Unlike a [`Ref`](struct.Ref.html), this says nothing about where the inode is stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Kind(pub u16);

impl Kind {
    /// Stored as a [`BasicDir`](struct.BasicDir.html) structure
    pub const BASIC_DIR: Kind = Kind(1);
    /// Stored as a [`BasicFile`](struct.BasicFile.html) structure
    pub const BASIC_FILE: Kind = Kind(2);
    /// Stored as a [`Symlink`](struct.Symlink.html) structure
    pub const BASIC_SYMLINK: Kind = Kind(3);
    /// Stored as a [`BasicDevice`](struct.BasicDevice.html) structure
    pub const BASIC_BLOCK_DEV: Kind = Kind(4);
    /// Stored as a [`BasicDevice`](struct.BasicDevice.html) structure
    pub const BASIC_CHAR_DEV: Kind = Kind(5);
    /// Stored as a [`BasicIpc`](struct.BasicIpc.html) structure
    pub const BASIC_FIFO: Kind = Kind(6);
    /// Stored as a [`BasicIpc`](struct.BasicIpc.html) structure
    pub const BASIC_SOCKET: Kind = Kind(7);

    /// Stored as a [`ExtendedDir`](struct.ExtendedDir.html) structure
    pub const EXT_DIR: Kind = Kind(8);
    /// Stored as a [`ExtendedFile`](struct.ExtendedFile.html) structure
    pub const EXT_FILE: Kind = Kind(9);
    /// Stored as a [`Symlink`](struct.Symlink.html) structure, with an xattr index after the
    /// target path
    pub const EXT_SYMLINK: Kind = Kind(10);
    /// Stored as a [`ExtendedDevice`](struct.ExtendedDevice.html) structure
    pub const EXT_BLOCK_DEV: Kind = Kind(11);
    /// Stored as a [`ExtendedDevice`](struct.ExtendedDevice.html) structure
    pub const EXT_CHAR_DEV: Kind = Kind(12);
    /// Stored as a [`ExtendedIpc`](struct.ExtendedIpc.html) structure
    pub const EXT_FIFO: Kind = Kind(13);
    /// Stored as a [`ExtendedIpc`](struct.ExtendedIpc.html) structure
    pub const EXT_SOCKET: Kind = Kind(14);

    pub const MAX: Kind = Kind::EXT_SOCKET;

    /// The file type bits of items of this kind, or `None` for an unknown kind
    pub fn file_type(self) -> Option<Mode> {
        let mode = match self {
            Kind::BASIC_DIR | Kind::EXT_DIR => Mode::TYPE_DIR,
            Kind::BASIC_FILE | Kind::EXT_FILE => Mode::TYPE_FILE,
            Kind::BASIC_SYMLINK | Kind::EXT_SYMLINK => Mode::TYPE_LINK,
            Kind::BASIC_BLOCK_DEV | Kind::EXT_BLOCK_DEV => Mode::TYPE_BLOCK,
            Kind::BASIC_CHAR_DEV | Kind::EXT_CHAR_DEV => Mode::TYPE_CHAR,
            Kind::BASIC_FIFO | Kind::EXT_FIFO => Mode::TYPE_FIFO,
            Kind::BASIC_SOCKET | Kind::EXT_SOCKET => Mode::TYPE_SOCKET,
            _ => return None,
        };
        Some(mode)
    }

    pub fn is_extended(self) -> bool {
        self.0 >= Kind::EXT_DIR.0 && self.0 <= Kind::MAX.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct Header {
    /// The type of item described by the inode which follows this header
    pub inode_type: Le16,
    /// A bitmask representing the permissions for the item described by the inode.
    /// The values match with the permission values of mode_t (the mode bits, not the file type)
    pub permissions: Le16,
    /// The index of the user id in the UID/GID Table
    pub uid_idx: Le16,
    /// The index of the group id in the UID/GID Table
    pub gid_idx: Le16,
    /// The unsigned number of seconds (not counting leap seconds) since 00:00, Jan 1 1970 UTC
    /// when the item described by the inode was last modified
    pub modified_time: Le32,
    /// The position of this inode in the full list of inodes.
    /// Value should be in the range `[1, inode_count]` (inclusive)
    /// This can be treated as a unique identifier for this inode, and can be
    /// used as a key to recreate hard links: when processing the archive,
    /// remember the visited values of inode_number. If an inode number has
    /// already been visited, this inode is hardlinked
    pub inode_number: Le32,
}

impl Header {
    pub fn kind(&self) -> Kind {
        Kind(self.inode_type.get())
    }

    pub fn uid_idx(&self) -> uid_gid::Idx {
        uid_gid::Idx(self.uid_idx.get())
    }

    pub fn gid_idx(&self) -> uid_gid::Idx {
        uid_gid::Idx(self.gid_idx.get())
    }

    pub fn inode_number(&self) -> Number {
        Number(self.inode_number.get())
    }
}

/// A basic directory inode structure
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct BasicDir {
    pub header: Header,
    /// The index of the block in the Directory Table where the directory entry information starts
    pub block_idx: Le32,
    /// The number of hard links to this directory
    pub hard_link_count: Le32,
    /// Total (uncompressed) size in bytes of the entries in the Directory Table, including headers
    pub file_size: Le16,
    /// The (uncompressed) offset within the block in the Directory Table where the directory entry
    /// information starts
    pub block_offset: Le16,
    /// The inode_number of the parent of this directory. If this is the root directory, this will be 1
    pub parent_inode_number: Le32,
}

/// A full extended directory inode structure
///
/// This inode is followed by directory index entries for faster lookup in the directory table
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct ExtendedDir {
    pub header: Header,
    /// The number of hard links to this directory
    pub hard_link_count: Le32,
    /// Total (uncompressed) size in bytes of the entries in the Directory Table, including headers
    pub file_size: Le32,
    /// The index of the block in the Directory Table where the directory entry information starts
    pub block_idx: Le32,
    /// The inode_number of the parent of this directory. If this is the root directory, this will be 1
    pub parent_inode_number: Le32,
    /// The number of directory index entries following the inode structure
    pub index_count: Le16,
    /// The (uncompressed) offset within the block in the Directory Table where the directory entry
    /// information starts
    pub block_offset: Le16,
    /// An index into the xattr lookup table. Set to 0xFFFFFFFF if the inode has no extended attributes
    pub xattr_idx: Le32,
}

/// A basic file inode structure
///
/// This inode is followed by a list of `u32` block sizes.
/// If this file ends in a fragment, the size of this list is the number of full data blocks
/// needed to store file_size bytes. If this file does not have a fragment, the size of the list is
/// the number of blocks needed to store file_size bytes, rounded up. Each item in the list
/// describes the (possibly compressed) size of a block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct BasicFile {
    pub header: Header,
    /// The offset from the start of the archive where the data blocks are stored
    pub blocks_start: Le32,
    /// The index of a fragment entry in the fragment table which describes the data block the
    /// fragment of this file is stored in.
    ///
    /// If this file does not end with a fragment, this should be 0xFFFFFFFF
    pub fragment_block_index: Le32,
    /// The (uncompressed) offset within the fragment data block where the fragment for this file.
    ///
    /// If this file does not end with a fragment, the value of this field is undefined (probably zero)
    pub block_offset: Le32,
    /// The (uncompressed) size of this file
    pub file_size: Le32,
}

/// A full extended file inode structure
///
/// Followed by a list of `u32` block sizes, like [`BasicFile`](struct.BasicFile.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct ExtendedFile {
    pub header: Header,
    /// The offset from the start of the archive where the data blocks are stored
    pub blocks_start: Le64,
    /// The (uncompressed) size of this file
    pub file_size: Le64,
    /// The number of bytes saved by omitting blocks of zero bytes.
    /// Used in the kernel for sparse file accounting
    pub sparse: Le64,
    /// The number of hard links to this node
    pub hard_link_count: Le32,
    /// The index of a fragment entry in the fragment table which describes the data block the
    /// fragment of this file is stored in.
    ///
    /// If this file does not end with a fragment, this should be 0xFFFFFFFF
    pub fragment_block_index: Le32,
    /// The (uncompressed) offset within the fragment data block where the fragment for this file.
    pub block_offset: Le32,
    /// An index into the xattr lookup table.
    ///
    /// Set to `0xFFFFFFFF` if the inode has no extended attributes
    pub xattr_idx: Le32,
}

/// A symlink inode structure
///
/// This inode is followed by a path string `target_size` bytes long.
/// The path string may not contain any null characters.
/// If the header had a kind `EXT_SYMLINK`, the path string is followed by an xattr_idx u32, which
/// is an index into the xattr lookup table. Set to 0xFFFFFFFF if the inode has no extended attributes
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct Symlink {
    pub header: Header,
    /// The number of hard links to this symlink
    pub hard_link_count: Le32,
    /// The size in bytes of the target path string following this inode
    pub target_size: Le32,
}

/// A basic device inode structure
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct BasicDevice {
    pub header: Header,
    /// The number of hard links to this device
    pub hard_link_count: Le32,
    /// The device represented, see [`DeviceNumber`](struct.DeviceNumber.html)
    pub device: Le32,
}

/// A full extended device inode structure
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct ExtendedDevice {
    pub header: Header,
    /// The number of hard links to this device
    pub hard_link_count: Le32,
    /// The device represented, see [`DeviceNumber`](struct.DeviceNumber.html)
    pub device: Le32,
    /// An index into the xattr lookup table. Set to 0xFFFFFFFF if the inode has no extended attributes
    pub xattr_idx: Le32,
}

/// A basic IPC (fifo/socket) inode structure
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct BasicIpc {
    pub header: Header,
    /// The number of hard links to this device
    pub hard_link_count: Le32,
}

/// A full extended IPC (fifo/socket) inode structure
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct ExtendedIpc {
    pub header: Header,
    /// The number of hard links to this device
    pub hard_link_count: Le32,
    /// An index into the xattr lookup table. Set to 0xFFFFFFFF if the inode has no extended attributes
    pub xattr_idx: Le32,
}

const_assert_eq!(mem::size_of::<Header>(), 16);
const_assert_eq!(mem::size_of::<BasicDir>(), 32);
const_assert_eq!(mem::size_of::<ExtendedDir>(), 40);
const_assert_eq!(mem::size_of::<BasicFile>(), 32);
const_assert_eq!(mem::size_of::<ExtendedFile>(), 56);
const_assert_eq!(mem::size_of::<Symlink>(), 24);
const_assert_eq!(mem::size_of::<BasicDevice>(), 24);
const_assert_eq!(mem::size_of::<ExtendedDevice>(), 28);
const_assert_eq!(mem::size_of::<BasicIpc>(), 20);
const_assert_eq!(mem::size_of::<ExtendedIpc>(), 24);

/// The fields shared by both regular file layouts
pub trait FileRecord {
    fn blocks_start(&self) -> datablock::Ref;
    fn file_size(&self) -> u64;
    fn sparse(&self) -> u64;
    fn fragment_idx(&self) -> fragment::Idx;
    fn fragment_offset(&self) -> u32;
}

impl FileRecord for BasicFile {
    fn blocks_start(&self) -> datablock::Ref {
        datablock::Ref(self.blocks_start.get().into())
    }

    fn file_size(&self) -> u64 {
        self.file_size.get().into()
    }

    fn sparse(&self) -> u64 {
        0
    }

    fn fragment_idx(&self) -> fragment::Idx {
        fragment::Idx(self.fragment_block_index.get())
    }

    fn fragment_offset(&self) -> u32 {
        self.block_offset.get()
    }
}

impl FileRecord for ExtendedFile {
    fn blocks_start(&self) -> datablock::Ref {
        datablock::Ref(self.blocks_start.get())
    }

    fn file_size(&self) -> u64 {
        self.file_size.get()
    }

    fn sparse(&self) -> u64 {
        self.sparse.get()
    }

    fn fragment_idx(&self) -> fragment::Idx {
        fragment::Idx(self.fragment_block_index.get())
    }

    fn fragment_offset(&self) -> u32 {
        self.block_offset.get()
    }
}

impl ExtendedDir {
    pub fn xattr_idx(&self) -> xattr::Idx {
        xattr::Idx(self.xattr_idx.get())
    }
}

impl ExtendedFile {
    pub fn xattr_idx(&self) -> xattr::Idx {
        xattr::Idx(self.xattr_idx.get())
    }
}

impl ExtendedDevice {
    pub fn xattr_idx(&self) -> xattr::Idx {
        xattr::Idx(self.xattr_idx.get())
    }
}

impl ExtendedIpc {
    pub fn xattr_idx(&self) -> xattr::Idx {
        xattr::Idx(self.xattr_idx.get())
    }
}

/// A device number in the kernel's "new" encoding: 12 bits of major and 20 bits of minor, with
/// the low byte of the minor stored in the lowest byte for compatibility with the old 8:8 format
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeviceNumber(pub u32);

impl DeviceNumber {
    pub fn new(major: u32, minor: u32) -> Self {
        assert!(major <= 0x0_0FFF);
        assert!(minor <= 0xF_FFFF);
        DeviceNumber(major << 8 | minor & 0xFF | (minor & !0xFF) << 12)
    }

    pub fn major(self) -> u32 {
        (self.0 >> 8) & 0xfff
    }

    pub fn minor(self) -> u32 {
        (self.0 & 0xff) | ((self.0 >> 12) & 0xfff00)
    }
}

/// The highest offset an inode can start at within a metadata block
pub const MAX_START_OFFSET: u16 = (metablock::SIZE - 1) as u16;

#[test]
fn ref_round_trip() {
    let pairs = [
        (0, 0),
        (0, MAX_START_OFFSET),
        (8194, 12),
        (u32::MAX, MAX_START_OFFSET),
    ];
    for &(block, offset) in &pairs {
        let r = Ref::new(block, offset);
        assert_eq!(r.split(), (block, offset));
        assert!(r.0 < 1 << 48);
    }
    assert_eq!(Ref(0x0001_2345_0678).split(), (0x1_2345, 0x0678));
}

#[test]
fn device_numbers() {
    let dev = DeviceNumber(0x0000_0801);
    assert_eq!((dev.major(), dev.minor()), (8, 1));

    let dev = DeviceNumber::new(0xABC, 0x12345);
    assert_eq!(dev.0, 0x123A_BC45);
    assert_eq!((dev.major(), dev.minor()), (0xABC, 0x12345));
}

#[test]
fn kind_file_types() {
    assert_eq!(Kind::EXT_FILE.file_type(), Some(Mode::TYPE_FILE));
    assert_eq!(Kind::BASIC_CHAR_DEV.file_type(), Some(Mode::TYPE_CHAR));
    assert_eq!(Kind(0).file_type(), None);
    assert_eq!(Kind(99).file_type(), None);
    assert!(Kind::EXT_SOCKET.is_extended());
    assert!(!Kind::BASIC_SOCKET.is_extended());
}
