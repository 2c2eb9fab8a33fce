//! User/Group IDs
//!
//! Inodes do not store owner and group ids directly. They store a 16 bit index into a table of
//! 32 bit ids, so the (usually few) distinct ids in an archive are only stored once.
//!
//! The table is stored in two levels like the [fragment table](../fragment/index.html): `u64`
//! locations of metadata blocks at `id_table_start`, each metadata block holding 2048 ids.

use crate::Le32;
use static_assertions::const_assert_eq;
use std::mem;
use zerocopy::{AsBytes, FromBytes, Unaligned};

/// UID/GIDs are both stored as u32s. Both UIDs and GIDs are treated as IDs
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct Entry(pub Le32);

const_assert_eq!(mem::size_of::<Entry>(), 4);

impl Entry {
    pub fn id(self) -> Id {
        Id(self.0.get())
    }
}

/// A resolved user or group id
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub u32);

/// The index of a user ID in the uid_gid list
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Idx(pub u16);

#[test]
fn entry_id() {
    let entry = Entry(Le32::new(1000));
    assert_eq!(entry.id(), Id(1000));
    assert_eq!(entry.as_bytes(), &[0xE8, 0x03, 0, 0]);
}
