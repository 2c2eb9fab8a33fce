//! Fragment Table
//!
//! Fragments are combined into fragment blocks of at most block_size bytes long. This table
//! describes the location and size of these fragment blocks, not the fragments within them.
//!
//! This table is stored in two levels: The fragment block entries are stored in metadata blocks,
//! and the file offsets to these metadata blocks are stored at the offset specified by the
//! `fragment_table_start` field of the superblock.
//!
//! Each metadata block can store 512 fragment block entries (16 bytes per fragment block entry),
//! so there will be `ceil(fragment_entry_count / 512.0)` metadata blocks (and the same number of
//! `u64` offsets stored at `fragment_table_start`)

use crate::{datablock, Le32, Le64};
use static_assertions::const_assert_eq;
use std::mem;
use zerocopy::{AsBytes, FromBytes, Unaligned};

/// Fragment block entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct Entry {
    /// The offset within the archive where the fragment block starts
    pub start: Le64,
    /// This stores two pieces of information
    ///
    /// If the block is uncompressed, the `0x1000000` (`1<<24`) bit wil be set. The remaining bits
    /// describe the size of the fragment block on disk. Because the max value of block_size is
    /// 1 MiB (`1<<20`), and the size of a fragment block should be less than `block_size`, the
    /// uncompressed bit will never be set by the size.
    pub size: Le32,
    /// This field is unused
    pub _unused: Le32,
}

const_assert_eq!(mem::size_of::<Entry>(), 16);

impl Entry {
    pub fn new(start: datablock::Ref, size: datablock::Size) -> Self {
        Self {
            start: Le64::new(start.0),
            size: Le32::new(size.0),
            _unused: Le32::new(0),
        }
    }

    pub fn start(&self) -> datablock::Ref {
        datablock::Ref(self.start.get())
    }

    pub fn size(&self) -> datablock::Size {
        datablock::Size(self.size.get())
    }
}

/// The index of an entry in the fragment table
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Idx(pub u32);

impl Idx {
    /// Stored in a file inode which does not end in a fragment
    pub const INVALID: Idx = Idx(0xFFFF_FFFF);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}
