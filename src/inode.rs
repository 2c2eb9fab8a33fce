//! Decoding inodes out of the inode table
//!
//! Every inode record starts with a common [`Header`](repr::inode::Header). The header is read
//! first to resolve ownership and find the kind, then the cursor is returned to the start of the
//! record and the full kind specific structure is read in one go.

use crate::errors::{Error, FragmentError, Result};
use crate::fragments::{FragmentLocation, FragmentResolver};
use crate::ids::IdResolver;
use crate::metadata::{read_struct, MetadataCursor, MetadataSource, Position};
use bstr::BString;
use chrono::{DateTime, Utc};
use repr::inode::{self as raw, DeviceNumber, FileRecord, Kind, Number, Ref};
use repr::uid_gid::Id;
use repr::{datablock, fragment, xattr, Le32, Mode};
use slog::Logger;
use std::io::{self, Read};
use std::time::{Duration, UNIX_EPOCH};
use zerocopy::{AsBytes, FromBytes};

/// Longest symlink target accepted, one page as in the kernel
pub const MAX_SYMLINK_TARGET: u32 = 4096;

/// A fully decoded inode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub kind: Kind,
    /// Permission bits combined with the file type implied by `kind`
    pub mode: Mode,
    pub uid: Id,
    pub gid: Id,
    /// Seconds since the unix epoch
    pub modified_time: u32,
    pub inode_number: Number,
    pub nlink: u32,
    pub xattr: Option<xattr::Idx>,
    pub data: InodeData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InodeData {
    RegularFile(RegularFile),
    ExtendedRegularFile(RegularFile),
    Directory(Directory),
    ExtendedDirectory(Directory),
    Symlink(Symlink),
    Device(Device),
    Ipc(IpcKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularFile {
    pub size: u64,
    /// Bytes of the file made up of zero blocks which are not stored
    pub sparse: u64,
    pub blocks_start: datablock::Ref,
    pub fragment: Option<Fragment>,
    /// Where the list of data block sizes starts. The list itself is not read here.
    pub block_list: Position,
    /// Number of 512 byte sectors backing the file, as reported by `stat`
    pub sectors: u64,
}

impl RegularFile {
    pub fn fragment_size(&self) -> u32 {
        self.fragment.map_or(0, |f| f.location.size.size())
    }

    pub fn fragment_offset(&self) -> u32 {
        self.fragment.map_or(0, |f| f.offset)
    }
}

/// The tail end of a file, stored in a shared fragment block
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub idx: fragment::Idx,
    pub location: FragmentLocation,
    /// Offset of this file's tail within the decompressed fragment block
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Size of the directory listing, as stored
    pub size: u32,
    /// Offset of the metadata block holding the listing, relative to the directory table
    pub start_block: u32,
    pub offset: u16,
    pub parent: Number,
    pub index: Option<DirIndex>,
}

/// The location of an extended directory's lookup index
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirIndex {
    pub position: Position,
    pub count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    pub target: BString,
    /// Where the target is stored in the metadata stream
    pub target_position: Position,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Block,
    Char,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Device {
    pub kind: DeviceKind,
    pub rdev: DeviceNumber,
}

impl Device {
    pub fn major(&self) -> u32 {
        self.rdev.major()
    }

    pub fn minor(&self) -> u32 {
        self.rdev.minor()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IpcKind {
    Fifo,
    Socket,
}

impl Inode {
    pub fn modified(&self) -> DateTime<Utc> {
        DateTime::from(UNIX_EPOCH + Duration::from_secs(self.modified_time.into()))
    }

    /// The size reported for this inode: file length, listing size, or target length
    pub fn size(&self) -> u64 {
        match &self.data {
            InodeData::RegularFile(file) | InodeData::ExtendedRegularFile(file) => file.size,
            InodeData::Directory(dir) | InodeData::ExtendedDirectory(dir) => dir.size.into(),
            InodeData::Symlink(link) => link.target.len() as u64,
            InodeData::Device(_) | InodeData::Ipc(_) => 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode.file_type() == Mode::TYPE_DIR
    }
}

/// The number of sectors needed to hold the stored part of a file
///
/// Any non-empty file takes at least one sector, even if it is entirely sparse.
fn sectors(size: u64, sparse: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    let stored = size - sparse;
    ((stored + 511) / 512).max(1)
}

/// The parts of an inode shared by all kinds
struct Common {
    header: raw::Header,
    uid: Id,
    gid: Id,
}

impl Common {
    fn finish(self, nlink: u32, xattr: Option<xattr::Idx>, data: InodeData) -> Inode {
        let kind = self.header.kind();
        let file_type = kind.file_type().unwrap_or(Mode::NONE);
        Inode {
            kind,
            mode: Mode::permissions(self.header.permissions.get()) | file_type,
            uid: self.uid,
            gid: self.gid,
            modified_time: self.header.modified_time.get(),
            inode_number: self.header.inode_number(),
            nlink,
            xattr,
            data,
        }
    }
}

/// Decodes inodes from an inode table
///
/// Owner and fragment lookups go through the resolvers handed in, so a decoder can run over any
/// metadata source.
#[derive(Debug)]
pub struct Decoder<S, I, F> {
    source: S,
    ids: I,
    fragments: F,
    inode_table_start: u64,
    logger: Logger,
}

impl<S, I, F> Decoder<S, I, F>
where
    S: MetadataSource,
    I: IdResolver,
    F: FragmentResolver,
{
    pub fn new(source: S, ids: I, fragments: F, inode_table_start: u64, logger: Logger) -> Self {
        Self {
            source,
            ids,
            fragments,
            inode_table_start,
            logger,
        }
    }

    /// Where the record `inode_ref` points to starts in the metadata stream
    pub fn position(&self, inode_ref: Ref) -> io::Result<Position> {
        let (block, offset) = inode_ref.split();
        let block = self
            .inode_table_start
            .checked_add(u64::from(block))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("inode ref {:#x} is past the end of the address space", inode_ref.0),
                )
            })?;
        Ok(Position::new(block, offset))
    }

    pub fn decode(&self, inode_ref: Ref) -> Result<Inode> {
        let result = self.decode_record(inode_ref);
        match &result {
            Ok(inode) => slog::trace!(self.logger, "Decoded inode";
                "ref" => format!("{:#x}", inode_ref.0),
                "kind" => inode.kind.0,
                "number" => inode.inode_number.0
            ),
            Err(e) => slog::error!(self.logger, "Unable to read inode";
                "ref" => format!("{:#x}", inode_ref.0),
                "error" => %e
            ),
        }
        result
    }

    fn decode_record(&self, inode_ref: Ref) -> Result<Inode> {
        let start = self.position(inode_ref)?;
        let mut cursor = self.source.cursor(start)?;

        let header: raw::Header = read_struct(&mut cursor)?;
        let common = Common {
            header,
            uid: self.ids.resolve(header.uid_idx())?,
            gid: self.ids.resolve(header.gid_idx())?,
        };
        cursor.seek(start)?;

        let cursor = &mut cursor;
        match header.kind() {
            Kind::BASIC_DIR => basic_dir(cursor, common),
            Kind::EXT_DIR => extended_dir(cursor, common),
            Kind::BASIC_FILE => self.basic_file(cursor, inode_ref, common),
            Kind::EXT_FILE => self.extended_file(cursor, inode_ref, common),
            Kind::BASIC_SYMLINK | Kind::EXT_SYMLINK => symlink(cursor, inode_ref, common),
            Kind::BASIC_BLOCK_DEV | Kind::BASIC_CHAR_DEV => basic_device(cursor, common),
            Kind::EXT_BLOCK_DEV | Kind::EXT_CHAR_DEV => extended_device(cursor, common),
            Kind::BASIC_FIFO | Kind::BASIC_SOCKET => basic_ipc(cursor, common),
            Kind::EXT_FIFO | Kind::EXT_SOCKET => extended_ipc(cursor, common),
            Kind(other) => Err(Error::UnsupportedInodeType(other)),
        }
    }

    fn basic_file<C: MetadataCursor>(
        &self,
        cursor: &mut C,
        inode_ref: Ref,
        common: Common,
    ) -> Result<Inode> {
        let (_, file) = self.file::<raw::BasicFile, C>(cursor, inode_ref)?;
        Ok(common.finish(1, None, InodeData::RegularFile(file)))
    }

    fn extended_file<C: MetadataCursor>(
        &self,
        cursor: &mut C,
        inode_ref: Ref,
        common: Common,
    ) -> Result<Inode> {
        let (record, file) = self.file::<raw::ExtendedFile, C>(cursor, inode_ref)?;
        Ok(common.finish(
            record.hard_link_count.get(),
            record.xattr_idx().get(),
            InodeData::ExtendedRegularFile(file),
        ))
    }

    fn file<T, C>(&self, cursor: &mut C, inode_ref: Ref) -> Result<(T, RegularFile)>
    where
        T: FileRecord + AsBytes + FromBytes,
        C: MetadataCursor,
    {
        let record: T = read_struct(cursor)?;
        let size = record.file_size();
        let sparse = record.sparse();
        if sparse > size {
            return Err(Error::malformed(
                inode_ref,
                format!("sparse byte count {} exceeds file size {}", sparse, size),
            ));
        }
        let fragment = self.fragment(inode_ref, record.fragment_idx(), record.fragment_offset())?;

        let file = RegularFile {
            size,
            sparse,
            blocks_start: record.blocks_start(),
            fragment,
            block_list: cursor.position(),
            sectors: sectors(size, sparse),
        };
        Ok((record, file))
    }

    fn fragment(
        &self,
        inode_ref: Ref,
        idx: fragment::Idx,
        offset: u32,
    ) -> Result<Option<Fragment>> {
        if !idx.is_valid() {
            return Ok(None);
        }
        let location = self.fragments.resolve(idx)?;
        if !location.start.is_valid() {
            return Err(FragmentError::InvalidBlock { idx: idx.0 }.into());
        }
        if location.size.size() == 0 {
            return Err(Error::malformed(
                inode_ref,
                format!("fragment {} has a zero size", idx.0),
            ));
        }
        Ok(Some(Fragment {
            idx,
            location,
            offset,
        }))
    }
}

fn basic_dir<C: MetadataCursor>(cursor: &mut C, common: Common) -> Result<Inode> {
    let record: raw::BasicDir = read_struct(cursor)?;
    let dir = Directory {
        size: record.file_size.get().into(),
        start_block: record.block_idx.get(),
        offset: record.block_offset.get(),
        parent: Number(record.parent_inode_number.get()),
        index: None,
    };
    Ok(common.finish(
        record.hard_link_count.get(),
        None,
        InodeData::Directory(dir),
    ))
}

fn extended_dir<C: MetadataCursor>(cursor: &mut C, common: Common) -> Result<Inode> {
    let record: raw::ExtendedDir = read_struct(cursor)?;
    let dir = Directory {
        size: record.file_size.get(),
        start_block: record.block_idx.get(),
        offset: record.block_offset.get(),
        parent: Number(record.parent_inode_number.get()),
        index: Some(DirIndex {
            position: cursor.position(),
            count: record.index_count.get(),
        }),
    };
    Ok(common.finish(
        record.hard_link_count.get(),
        record.xattr_idx().get(),
        InodeData::ExtendedDirectory(dir),
    ))
}

fn symlink<C: MetadataCursor>(cursor: &mut C, inode_ref: Ref, common: Common) -> Result<Inode> {
    let record: raw::Symlink = read_struct(cursor)?;
    let target_position = cursor.position();

    let len = record.target_size.get();
    if len > MAX_SYMLINK_TARGET {
        return Err(Error::malformed(
            inode_ref,
            format!("symlink target of {} bytes exceeds {}", len, MAX_SYMLINK_TARGET),
        ));
    }
    let mut target = Vec::with_capacity(len as usize);
    cursor.by_ref().take(len.into()).read_to_end(&mut target)?;
    if target.len() as u64 != u64::from(len) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("symlink target ends after {} of {} bytes", target.len(), len),
        )
        .into());
    }

    let xattr = if common.header.kind() == Kind::EXT_SYMLINK {
        let idx: Le32 = read_struct(cursor)?;
        xattr::Idx(idx.get()).get()
    } else {
        None
    };

    let link = Symlink {
        target: target.into(),
        target_position,
    };
    Ok(common.finish(
        record.hard_link_count.get(),
        xattr,
        InodeData::Symlink(link),
    ))
}

fn device_kind(kind: Kind) -> DeviceKind {
    match kind {
        Kind::BASIC_CHAR_DEV | Kind::EXT_CHAR_DEV => DeviceKind::Char,
        _ => DeviceKind::Block,
    }
}

fn basic_device<C: MetadataCursor>(cursor: &mut C, common: Common) -> Result<Inode> {
    let record: raw::BasicDevice = read_struct(cursor)?;
    let device = Device {
        kind: device_kind(common.header.kind()),
        rdev: DeviceNumber(record.device.get()),
    };
    Ok(common.finish(
        record.hard_link_count.get(),
        None,
        InodeData::Device(device),
    ))
}

fn extended_device<C: MetadataCursor>(cursor: &mut C, common: Common) -> Result<Inode> {
    let record: raw::ExtendedDevice = read_struct(cursor)?;
    let device = Device {
        kind: device_kind(common.header.kind()),
        rdev: DeviceNumber(record.device.get()),
    };
    Ok(common.finish(
        record.hard_link_count.get(),
        record.xattr_idx().get(),
        InodeData::Device(device),
    ))
}

fn ipc_kind(kind: Kind) -> IpcKind {
    match kind {
        Kind::BASIC_SOCKET | Kind::EXT_SOCKET => IpcKind::Socket,
        _ => IpcKind::Fifo,
    }
}

fn basic_ipc<C: MetadataCursor>(cursor: &mut C, common: Common) -> Result<Inode> {
    let record: raw::BasicIpc = read_struct(cursor)?;
    let kind = ipc_kind(common.header.kind());
    Ok(common.finish(record.hard_link_count.get(), None, InodeData::Ipc(kind)))
}

fn extended_ipc<C: MetadataCursor>(cursor: &mut C, common: Common) -> Result<Inode> {
    let record: raw::ExtendedIpc = read_struct(cursor)?;
    let kind = ipc_kind(common.header.kind());
    Ok(common.finish(
        record.hard_link_count.get(),
        record.xattr_idx().get(),
        InodeData::Ipc(kind),
    ))
}
