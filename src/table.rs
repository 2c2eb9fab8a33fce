//! Two level lookup tables
//!
//! The id, fragment and export tables store fixed size entries packed into metadata blocks.
//! A list of `u64` archive offsets of those metadata blocks is stored uncompressed at the
//! table's start offset, so entry `i` lives in metadata block `i / per_block` at offset
//! `(i % per_block) * entry_size`.

use crate::errors::Result;
use crate::metadata::{self, MetablockReader, MetadataSource, Position};
use once_cell::sync::OnceCell;
use positioned_io::ReadAt;
use std::marker::PhantomData;
use std::{fmt, mem};
use zerocopy::{AsBytes, FromBytes};

pub struct Table<R, T> {
    reader: MetablockReader<R>,
    start: u64,
    count: u32,
    /// Locations of the metadata blocks holding the entries, read on first use
    blocks: OnceCell<Vec<u64>>,
    _phantom: PhantomData<fn() -> T>,
}

impl<R: ReadAt, T: AsBytes + FromBytes> Table<R, T> {
    const PER_BLOCK: usize = repr::metablock::SIZE / mem::size_of::<T>();

    pub fn new(reader: MetablockReader<R>, start: u64, count: u32) -> Self {
        Self {
            reader,
            start,
            count,
            blocks: OnceCell::new(),
            _phantom: PhantomData,
        }
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn blocks(&self) -> Result<&[u64]> {
        let blocks = self.blocks.get_or_try_init(|| {
            let entries = self.count as usize;
            let block_count = (entries + Self::PER_BLOCK - 1) / Self::PER_BLOCK;
            metadata::read_u64_list(&self.reader, self.start, block_count)
        })?;
        Ok(blocks)
    }

    /// Read entry `idx`, or `None` if `idx` is out of range
    pub fn get(&self, idx: u32) -> Result<Option<T>> {
        if idx >= self.count {
            return Ok(None);
        }
        let idx = idx as usize;
        let block = self.blocks()?[idx / Self::PER_BLOCK];
        let offset = (idx % Self::PER_BLOCK) * mem::size_of::<T>();

        let mut cursor = self.reader.cursor(Position::new(block, offset as u16))?;
        let entry = metadata::read_struct(&mut cursor)?;
        Ok(Some(entry))
    }
}

impl<R, T> fmt::Debug for Table<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("start", &self.start)
            .field("count", &self.count)
            .field("blocks", &self.blocks.get())
            .finish()
    }
}
