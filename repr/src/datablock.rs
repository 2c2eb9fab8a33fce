//! Datablocks
//!
//! File contents are stored in blocks of at most `block_size` bytes, each possibly compressed.
//! The tail end of a file that does not fill a whole block may instead be packed into a shared
//! fragment block (see [`fragment`](../fragment/index.html)).

use std::fmt;

/// The max size of a datablock: 1 MiB
pub const MAX_SIZE: usize = 1024 * 1024;

/// The size of a block on disk, along with whether it is stored uncompressed
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Size(pub u32);

impl Size {
    pub const UNCOMPRESSED_FLAG: u32 = 1 << 24;
    pub const ZERO: Size = Size(0);

    pub fn new(mut size: u32, uncompressed: bool) -> Self {
        assert!(size as usize <= MAX_SIZE);
        if uncompressed {
            size |= Self::UNCOMPRESSED_FLAG;
        }
        Self(size)
    }

    /// Size in bytes on disk, with the uncompressed flag masked off
    pub fn size(self) -> u32 {
        self.0 & !Self::UNCOMPRESSED_FLAG
    }

    pub fn uncompressed(self) -> bool {
        self.0 & Self::UNCOMPRESSED_FLAG != 0
    }
}

impl fmt::Debug for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Size")
            .field("size", &self.size())
            .field("uncompressed", &self.uncompressed())
            .finish()
    }
}

/// Number of bytes from the start of the archive where the block starts
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ref(pub u64);

impl Ref {
    /// Marks a block address which does not exist
    pub const INVALID: Ref = Ref(u64::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

#[test]
fn size_flag() {
    let size = Size::new(4000, true);
    assert_eq!(size.0, 0x0100_0FA0);
    assert_eq!(size.size(), 4000);
    assert!(size.uncompressed());
    assert!(!Size::new(4000, false).uncompressed());
}
