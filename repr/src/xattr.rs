//! Xattr Table
//!
//! Extended attributes are arbitrary key value pairs attached to inodes. Only the extended inode
//! kinds can reference them, through a 32 bit index into the xattr lookup table.

/// An index into the xattr lookup table
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Idx(pub u32);

impl Idx {
    /// Stored by extended inodes which have no extended attributes
    pub const NONE: Idx = Idx(0xFFFF_FFFF);

    /// `None` if this is the [`NONE`](#associatedconstant.NONE) sentinel
    pub fn get(self) -> Option<Idx> {
        if self == Self::NONE {
            None
        } else {
            Some(self)
        }
    }
}
