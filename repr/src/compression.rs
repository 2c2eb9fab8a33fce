//! Compression ids, as stored in the superblock

use crate::Le16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Id(pub u16);

impl Id {
    pub const GZIP: Id = Id(1);
    pub const LZMA: Id = Id(2);
    pub const LZO: Id = Id(3);
    pub const XZ: Id = Id(4);
    pub const LZ4: Id = Id(5);
    pub const ZSTD: Id = Id(6);

    pub const MAX: Id = Id::ZSTD;
}

impl From<Le16> for Id {
    fn from(raw: Le16) -> Self {
        Id(raw.get())
    }
}
