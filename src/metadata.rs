//! Sequential reads over the metadata stream
//!
//! Metadata (inodes, directories, lookup tables) is stored as a sequence of individually
//! compressed 8KiB metadata blocks. A [`Position`] names a byte in the stream by the archive
//! offset of the metadata block holding it and its offset into the decompressed block.
//! A [`MetadataCursor`] reads forward from a position, moving into the following metadata block
//! whenever the current one is exhausted.

use crate::compression::{self, AnyCodec, Decompressor};
use crate::errors::Result;
use indexmap::IndexMap;
use parking_lot::Mutex;
use positioned_io::ReadAt;
use slog::Logger;
use std::cell::RefCell;
use std::io;
use std::sync::Arc;
use thread_local::ThreadLocal;
use zerocopy::{AsBytes, FromBytes};

/// The location of a byte in the metadata stream
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    /// Offset from the start of the archive of the metadata block's header
    pub block: u64,
    /// Offset into the decompressed metadata block
    pub offset: u16,
}

impl Position {
    pub fn new(block: u64, offset: u16) -> Self {
        Position { block, offset }
    }
}

pub trait MetadataCursor: io::Read {
    /// Move the cursor to `pos`
    fn seek(&mut self, pos: Position) -> io::Result<()>;

    /// The position of the next byte to be read
    fn position(&self) -> Position;
}

/// Creates cursors over the metadata stream
pub trait MetadataSource {
    type Cursor: MetadataCursor;

    fn cursor(&self, pos: Position) -> io::Result<Self::Cursor>;
}

/// Read a whole on-disk structure from the cursor
pub(crate) fn read_struct<T, C>(cursor: &mut C) -> io::Result<T>
where
    T: AsBytes + FromBytes,
    C: io::Read + ?Sized,
{
    let mut value = T::new_zeroed();
    cursor.read_exact(value.as_bytes_mut())?;
    Ok(value)
}

#[derive(Debug)]
struct Block {
    data: Vec<u8>,
    /// Archive offset of the metadata block following this one
    next: u64,
}

#[derive(Debug)]
struct Inner<R> {
    reader: R,
    compression: compression::Kind,
    /// One decompressor per reading thread
    codecs: ThreadLocal<RefCell<AnyCodec>>,
    cache: Mutex<IndexMap<u64, Arc<Block>>>,
    cache_size: usize,
    logger: Logger,
}

/// Reads and decompresses metadata blocks from an archive
///
/// Cheap to clone: clones share the underlying reader and the block cache.
#[derive(Debug)]
pub struct MetablockReader<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for MetablockReader<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ReadAt> MetablockReader<R> {
    pub fn new(reader: R, codec: AnyCodec, cache_size: usize, logger: Logger) -> Self {
        let compression = codec.kind();
        let codecs = ThreadLocal::new();
        codecs.get_or(|| RefCell::new(codec));
        Self {
            inner: Arc::new(Inner {
                reader,
                compression,
                codecs,
                cache: Mutex::new(IndexMap::with_capacity(cache_size)),
                cache_size,
                logger,
            }),
        }
    }

    pub fn reader(&self) -> &R {
        &self.inner.reader
    }

    /// Read the raw bytes at `pos` in the archive, bypassing the metadata layer
    pub fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.reader.read_exact_at(pos, buf)
    }

    fn block(&self, start: u64) -> io::Result<Arc<Block>> {
        if let Some(block) = self.inner.cache.lock().get(&start) {
            return Ok(Arc::clone(block));
        }

        let block = Arc::new(self.read_block(start)?);
        if self.inner.cache_size > 0 {
            let mut cache = self.inner.cache.lock();
            if cache.len() >= self.inner.cache_size {
                cache.shift_remove_index(0);
            }
            cache.insert(start, Arc::clone(&block));
        }
        Ok(block)
    }

    fn read_block(&self, start: u64) -> io::Result<Block> {
        let mut header = repr::metablock::Header(repr::Le16::new(0));
        self.inner
            .reader
            .read_exact_at(start, header.as_bytes_mut())?;
        let size = usize::from(header.size());
        if size > repr::metablock::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("metadata block at {:#x} claims {} bytes", start, size),
            ));
        }

        let bounds = start
            .checked_add(repr::metablock::HEADER_SIZE)
            .and_then(|data_start| Some((data_start, data_start.checked_add(size as u64)?)));
        let (data_start, next) = bounds.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("metadata block at {:#x} ends past the address space", start),
            )
        })?;
        let mut raw = vec![0; size];
        self.inner.reader.read_exact_at(data_start, &mut raw)?;

        let data = if header.compressed() {
            let mut data = vec![0; repr::metablock::SIZE];
            let codec = self.codec()?;
            let len = codec
                .borrow_mut()
                .decompress(&raw, &mut data)
                .map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("corrupt metadata block at {:#x}: {}", start, e),
                    )
                })?;
            data.truncate(len);
            data
        } else {
            raw
        };

        slog::trace!(self.inner.logger, "Read metadata block";
            "start" => start,
            "size_on_disk" => size,
            "compressed" => header.compressed(),
            "size" => data.len()
        );
        Ok(Block { data, next })
    }

    /// This thread's decompressor, created on first use
    fn codec(&self) -> io::Result<&RefCell<AnyCodec>> {
        let compression = self.inner.compression;
        self.inner
            .codecs
            .get_or_try(|| AnyCodec::new(compression).map(RefCell::new))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<R: ReadAt> MetadataSource for MetablockReader<R> {
    type Cursor = Cursor<R>;

    fn cursor(&self, pos: Position) -> io::Result<Cursor<R>> {
        let block = self.block(pos.block)?;
        let mut cursor = Cursor {
            reader: self.clone(),
            start: pos.block,
            block,
            offset: 0,
        };
        cursor.set_offset(pos.offset)?;
        Ok(cursor)
    }
}

/// A [`MetadataCursor`] over a [`MetablockReader`]
#[derive(Debug)]
pub struct Cursor<R> {
    reader: MetablockReader<R>,
    start: u64,
    block: Arc<Block>,
    offset: usize,
}

impl<R> Cursor<R> {
    fn set_offset(&mut self, offset: u16) -> io::Result<()> {
        let offset = usize::from(offset);
        if offset > self.block.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "offset {} is past the end of the {} byte metadata block at {:#x}",
                    offset,
                    self.block.data.len(),
                    self.start
                ),
            ));
        }
        self.offset = offset;
        Ok(())
    }
}

impl<R: ReadAt> io::Read for Cursor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.offset == self.block.data.len() {
            let next = self.block.next;
            self.block = self.reader.block(next)?;
            self.start = next;
            self.offset = 0;
            if self.block.data.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("empty metadata block at {:#x}", next),
                ));
            }
        }
        let available = &self.block.data[self.offset..];
        let len = available.len().min(buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.offset += len;
        Ok(len)
    }
}

impl<R: ReadAt> MetadataCursor for Cursor<R> {
    fn seek(&mut self, pos: Position) -> io::Result<()> {
        if pos.block != self.start {
            self.block = self.reader.block(pos.block)?;
            self.start = pos.block;
        }
        self.set_offset(pos.offset)
    }

    fn position(&self) -> Position {
        if self.offset == self.block.data.len() {
            Position::new(self.block.next, 0)
        } else {
            Position::new(self.start, self.offset as u16)
        }
    }
}

/// Read `count` little-endian `u64`s starting at `pos` in the archive
pub(crate) fn read_u64_list<R: ReadAt>(
    reader: &MetablockReader<R>,
    pos: u64,
    count: usize,
) -> Result<Vec<u64>> {
    use byteorder::{ByteOrder, LittleEndian};

    let mut raw = vec![0; count * 8];
    reader.read_exact_at(pos, &mut raw)?;
    let mut list = vec![0; count];
    LittleEndian::read_u64_into(&raw, &mut list);
    Ok(list)
}
