#![cfg(feature = "gzip")]

use sqfs_inode::errors::{FragmentError, IdError, SuperblockError};
use sqfs_inode::inode::{DeviceKind, IpcKind};
use sqfs_inode::metadata::Position;
use sqfs_inode::{Archive, Config, Error, InodeData};

use repr::inode::{self as raw, DeviceNumber, Kind, Number, Ref};
use repr::superblock::Superblock;
use repr::uid_gid::Id;
use repr::{datablock, fragment, uid_gid, xattr, Le16, Le32, Le64, Mode};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;
use slog::Logger;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use zerocopy::{AsBytes, FromBytes};

fn logger() -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Debug);
    builder.destination(Destination::Stderr);
    builder.build().unwrap()
}

/// An archive image under construction
struct Image {
    data: Vec<u8>,
    compress: bool,
}

impl Image {
    fn new(compress: bool) -> Self {
        Image {
            data: vec![0; std::mem::size_of::<Superblock>()],
            compress,
        }
    }

    fn pos(&self) -> u64 {
        self.data.len() as u64
    }

    /// Append a metadata block, compressed when that makes it smaller
    fn metablock(&mut self, contents: &[u8]) -> u64 {
        assert!(contents.len() <= repr::metablock::SIZE);
        let start = self.pos();
        let compressed = if self.compress {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
            encoder.write_all(contents).unwrap();
            Some(encoder.finish().unwrap())
        } else {
            None
        };
        match compressed {
            Some(compressed) if compressed.len() < contents.len() => {
                let header = repr::metablock::Header::new(compressed.len() as u16, true);
                self.data.extend_from_slice(header.as_bytes());
                self.data.extend_from_slice(&compressed);
            }
            _ => {
                let header = repr::metablock::Header::new(contents.len() as u16, false);
                self.data.extend_from_slice(header.as_bytes());
                self.data.extend_from_slice(contents);
            }
        }
        start
    }

    /// Append a lookup table small enough for one metadata block
    fn table<T: AsBytes>(&mut self, entries: &[T]) -> u64 {
        let block = self.metablock(entries.as_bytes());
        let start = self.pos();
        self.data.extend_from_slice(&block.to_le_bytes());
        start
    }
}

/// Records appended to an inode table block, tracking where each one starts
#[derive(Default)]
struct Records {
    data: Vec<u8>,
}

impl Records {
    fn push(&mut self, bytes: &[u8]) -> u16 {
        let offset = self.data.len() as u16;
        self.data.extend_from_slice(bytes);
        offset
    }
}

fn header(kind: Kind, number: u32, permissions: u16) -> raw::Header {
    raw::Header {
        inode_type: Le16::new(kind.0),
        permissions: Le16::new(permissions),
        uid_idx: Le16::new(1),
        gid_idx: Le16::new(2),
        modified_time: Le32::new(1_650_000_000),
        inode_number: Le32::new(number),
    }
}

fn basic_file(number: u32, size: u32, fragment: fragment::Idx) -> raw::BasicFile {
    raw::BasicFile {
        header: header(Kind::BASIC_FILE, number, 0o644),
        blocks_start: Le32::new(96),
        fragment_block_index: Le32::new(fragment.0),
        block_offset: Le32::new(100),
        file_size: Le32::new(size),
    }
}

struct Fixture {
    image: Vec<u8>,
    inode_table_start: u64,
    second_block: u32,
    file: Ref,
    sparse: Ref,
    link: Ref,
    device: Ref,
    socket: Ref,
    big_dir: Ref,
    straddle: Ref,
    bad_owner: Ref,
    bad_fragment: Ref,
}

const LINK_TARGET: &[u8] = b"usr/bin/python3";

fn build(compress: bool) -> Fixture {
    let mut image = Image::new(compress);

    let mut first = Records::default();
    let root = first.push(
        raw::BasicDir {
            header: header(Kind::BASIC_DIR, 1, 0o755),
            block_idx: Le32::new(0),
            hard_link_count: Le32::new(3),
            file_size: Le16::new(50),
            block_offset: Le16::new(0),
            parent_inode_number: Le32::new(11),
        }
        .as_bytes(),
    );
    assert_eq!(root, 0);

    let file = first.push(basic_file(2, 140_000, fragment::Idx(1)).as_bytes());
    first.push(Le32::new(0x1000).as_bytes());

    let sparse = first.push(
        raw::ExtendedFile {
            header: header(Kind::EXT_FILE, 3, 0o600),
            blocks_start: Le64::new(0x20_0000),
            file_size: Le64::new(1_048_576),
            sparse: Le64::new(512_000),
            hard_link_count: Le32::new(2),
            fragment_block_index: Le32::new(fragment::Idx::INVALID.0),
            block_offset: Le32::new(0),
            xattr_idx: Le32::new(xattr::Idx::NONE.0),
        }
        .as_bytes(),
    );
    for _ in 0..8 {
        first.push(Le32::new(0x1_0000).as_bytes());
    }

    let link = first.push(
        raw::Symlink {
            header: header(Kind::EXT_SYMLINK, 4, 0o777),
            hard_link_count: Le32::new(1),
            target_size: Le32::new(LINK_TARGET.len() as u32),
        }
        .as_bytes(),
    );
    first.push(LINK_TARGET);
    first.push(Le32::new(0).as_bytes());

    let device = first.push(
        raw::BasicDevice {
            header: header(Kind::BASIC_CHAR_DEV, 5, 0o620),
            hard_link_count: Le32::new(1),
            device: Le32::new(DeviceNumber::new(4, 64).0),
        }
        .as_bytes(),
    );

    let socket = first.push(
        raw::BasicIpc {
            header: header(Kind::BASIC_SOCKET, 6, 0o755),
            hard_link_count: Le32::new(1),
        }
        .as_bytes(),
    );

    let big_dir = first.push(
        raw::ExtendedDir {
            header: header(Kind::EXT_DIR, 7, 0o755),
            hard_link_count: Le32::new(2),
            file_size: Le32::new(20_000),
            block_idx: Le32::new(0x2000),
            parent_inode_number: Le32::new(1),
            index_count: Le16::new(1),
            block_offset: Le16::new(16),
            xattr_idx: Le32::new(xattr::Idx::NONE.0),
        }
        .as_bytes(),
    );
    // One directory index entry: index, start, name size - 1, name
    first.push(&[0, 0, 0, 0, 0, 0x20, 0, 0, 2, 0, 0, 0, b'a', b'b', b'c']);

    // Fill the block so the next record is split across two blocks
    let straddle_offset = repr::metablock::SIZE - 20;
    first.data.resize(straddle_offset, 0);
    let straddle_record = basic_file(8, 10, fragment::Idx::INVALID);
    let (head, tail) = straddle_record.as_bytes().split_at(20);
    let straddle = first.push(head);
    assert_eq!(first.data.len(), repr::metablock::SIZE);

    let mut second = Records::default();
    second.push(tail);
    second.push(Le32::new(10 | datablock::Size::UNCOMPRESSED_FLAG).as_bytes());

    let mut bad_owner = basic_file(9, 10, fragment::Idx::INVALID);
    bad_owner.header.uid_idx = Le16::new(7);
    let bad_owner = second.push(bad_owner.as_bytes());
    let bad_fragment = second.push(basic_file(10, 10, fragment::Idx(5)).as_bytes());

    let inode_table_start = image.metablock(&first.data);
    let second_start = image.metablock(&second.data);
    let second_block = (second_start - inode_table_start) as u32;

    let fragment_table_start = image.table(&[
        fragment::Entry::new(datablock::Ref(4096), datablock::Size::new(1234, false)),
        fragment::Entry::new(datablock::Ref(9000), datablock::Size::new(800, true)),
    ]);
    let id_table_start = image.table(&[
        uid_gid::Entry(Le32::new(0)),
        uid_gid::Entry(Le32::new(1000)),
        uid_gid::Entry(Le32::new(100)),
    ]);

    let mut superblock = Superblock::new_zeroed();
    superblock.magic = Le32::new(repr::superblock::MAGIC);
    superblock.inode_count = Le32::new(10);
    superblock.modification_time = Le32::new(1_650_000_000);
    superblock.block_size = Le32::new(1 << 17);
    superblock.fragment_entry_count = Le32::new(2);
    superblock.compression_id = Le16::new(repr::compression::Id::GZIP.0);
    superblock.block_log = Le16::new(17);
    superblock.id_count = Le16::new(3);
    superblock.version_major = Le16::new(repr::superblock::VERSION_MAJOR);
    superblock.version_minor = Le16::new(repr::superblock::VERSION_MINOR);
    superblock.root_inode_ref = Le64::new(Ref::new(0, root).0);
    superblock.bytes_used = Le64::new(image.pos());
    superblock.id_table_start = Le64::new(id_table_start);
    superblock.xattr_id_table_start = Le64::new(u64::MAX);
    superblock.inode_table_start = Le64::new(inode_table_start);
    superblock.directory_table_start = Le64::new(second_start);
    superblock.fragment_table_start = Le64::new(fragment_table_start);
    superblock.export_table_start = Le64::new(u64::MAX);
    image.data[..superblock.as_bytes().len()].copy_from_slice(superblock.as_bytes());

    Fixture {
        image: image.data,
        inode_table_start,
        second_block,
        file: Ref::new(0, file),
        sparse: Ref::new(0, sparse),
        link: Ref::new(0, link),
        device: Ref::new(0, device),
        socket: Ref::new(0, socket),
        big_dir: Ref::new(0, big_dir),
        straddle: Ref::new(0, straddle),
        bad_owner: Ref::new(second_block, bad_owner),
        bad_fragment: Ref::new(second_block, bad_fragment),
    }
}

fn write_image(image: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(image).unwrap();
    file.flush().unwrap();
    file
}

fn check_archive<R: positioned_io::ReadAt>(archive: &Archive<R>, fixture: &Fixture) {
    let start = fixture.inode_table_start;

    let root = archive.root().unwrap();
    assert!(root.is_dir());
    assert_eq!(root.inode_number, Number(1));
    assert_eq!(root.mode, Mode::O755 | Mode::TYPE_DIR);
    assert_eq!((root.uid, root.gid), (Id(1000), Id(100)));
    assert_eq!(root.modified().timestamp(), 1_650_000_000);
    match &root.data {
        InodeData::Directory(dir) => {
            assert_eq!(dir.size, 50);
            assert_eq!(dir.parent, Number(11));
            assert_eq!(dir.index, None);
        }
        other => panic!("unexpected {:?}", other),
    }

    let file = archive.inode(Number(2), fixture.file).unwrap();
    assert_eq!(file.nlink, 1);
    match &file.data {
        InodeData::RegularFile(file) => {
            assert_eq!(file.size, 140_000);
            assert_eq!(file.sectors, 274);
            assert_eq!(file.blocks_start, datablock::Ref(96));
            assert_eq!(file.fragment_size(), 800);
            assert_eq!(file.fragment_offset(), 100);
            let fragment = file.fragment.unwrap();
            assert_eq!(fragment.location.start, datablock::Ref(9000));
            assert!(fragment.location.size.uncompressed());
            assert_eq!(
                file.block_list,
                Position::new(start, fixture.file.start_offset() + 32)
            );
        }
        other => panic!("unexpected {:?}", other),
    }

    let sparse = archive.inode(Number(3), fixture.sparse).unwrap();
    assert_eq!(sparse.kind, Kind::EXT_FILE);
    assert_eq!(sparse.nlink, 2);
    assert_eq!(sparse.xattr, None);
    match &sparse.data {
        InodeData::ExtendedRegularFile(file) => {
            assert_eq!(file.sectors, 1048);
            assert_eq!(file.fragment, None);
            assert_eq!(file.fragment_size(), 0);
        }
        other => panic!("unexpected {:?}", other),
    }

    let link = archive.inode(Number(4), fixture.link).unwrap();
    assert_eq!(link.mode.file_type(), Mode::TYPE_LINK);
    assert_eq!(link.xattr, Some(xattr::Idx(0)));
    assert_eq!(link.size(), LINK_TARGET.len() as u64);
    match &link.data {
        InodeData::Symlink(symlink) => assert_eq!(symlink.target, LINK_TARGET),
        other => panic!("unexpected {:?}", other),
    }

    let device = archive.inode(Number(5), fixture.device).unwrap();
    match &device.data {
        InodeData::Device(dev) => {
            assert_eq!(dev.kind, DeviceKind::Char);
            assert_eq!((dev.major(), dev.minor()), (4, 64));
        }
        other => panic!("unexpected {:?}", other),
    }

    let socket = archive.inode(Number(6), fixture.socket).unwrap();
    assert_eq!(socket.data, InodeData::Ipc(IpcKind::Socket));
    assert_eq!(socket.mode.file_type(), Mode::TYPE_SOCKET);

    let big_dir = archive.inode(Number(7), fixture.big_dir).unwrap();
    match &big_dir.data {
        InodeData::ExtendedDirectory(dir) => {
            assert_eq!(dir.size, 20_000);
            let index = dir.index.unwrap();
            assert_eq!(index.count, 1);
            assert_eq!(
                index.position,
                Position::new(start, fixture.big_dir.start_offset() + 40)
            );
        }
        other => panic!("unexpected {:?}", other),
    }

    let straddle = archive.inode(Number(8), fixture.straddle).unwrap();
    match &straddle.data {
        InodeData::RegularFile(file) => {
            assert_eq!(file.size, 10);
            assert_eq!(file.sectors, 1);
            assert_eq!(
                file.block_list,
                Position::new(start + u64::from(fixture.second_block), 12)
            );
        }
        other => panic!("unexpected {:?}", other),
    }

    match archive.inode(Number(9), fixture.bad_owner) {
        Err(e @ Error::Id(IdError::OutOfRange { idx: 7, count: 3 })) => {
            assert_eq!(e.to_errno(), 22)
        }
        other => panic!("unexpected {:?}", other),
    }
    match archive.inode(Number(10), fixture.bad_fragment) {
        Err(Error::Fragment(FragmentError::OutOfRange { idx: 5, count: 2 })) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(archive.cached_inode(Number(10)).is_none());
}

#[test]
fn uncompressed_archive_file() {
    let fixture = build(false);
    let file = write_image(&fixture.image);

    let archive = Archive::open_with_logger(file.path(), logger()).unwrap();
    assert_eq!(archive.superblock().inode_count.get(), 10);
    check_archive(&archive, &fixture);
}

#[test]
fn compressed_archive() {
    let fixture = build(true);
    let uncompressed = build(false);
    assert!(fixture.image.len() < uncompressed.image.len());

    let archive = Archive::with_logger(fixture.image.clone(), logger()).unwrap();
    check_archive(&archive, &fixture);
}

#[test]
fn concurrent_lookups() {
    let fixture = build(true);
    let file = write_image(&fixture.image);
    let archive = Arc::new(Archive::open_with_logger(file.path(), logger()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let archive = Arc::clone(&archive);
            let inode_ref = fixture.sparse;
            thread::spawn(move || archive.inode(Number(3), inode_ref).unwrap())
        })
        .collect();
    let inodes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for inode in &inodes[1..] {
        assert!(Arc::ptr_eq(&inodes[0], inode));
    }

    assert!(archive.forget(Number(3)));
    let reloaded = archive.inode(Number(3), fixture.sparse).unwrap();
    assert!(!Arc::ptr_eq(&inodes[0], &reloaded));
    assert_eq!(*inodes[0], *reloaded);
}

#[test]
fn verified_inode_numbers() {
    let fixture = build(false);
    let mut config = Config::new();
    config.set_verify_inode_numbers(true).set_metablock_cache_size(0);
    let archive = Archive::with_config(fixture.image.clone(), &config, logger()).unwrap();

    match archive.inode(Number(99), fixture.file) {
        Err(Error::MalformedRecord { inode, .. }) => assert_eq!(inode, fixture.file.0),
        other => panic!("unexpected {:?}", other),
    }
    assert!(archive.cached_inode(Number(99)).is_none());
    assert!(archive.inode(Number(2), fixture.file).is_ok());
}

#[test]
fn rejects_bad_superblocks() {
    let fixture = build(false);

    let mut image = fixture.image.clone();
    image[0] = b'x';
    match Archive::with_logger(image, logger()) {
        Err(Error::Superblock(SuperblockError::BadMagic { .. })) => {}
        other => panic!("unexpected {:?}", other),
    }

    let mut image = fixture.image.clone();
    image[20..22].copy_from_slice(&4u16.to_le_bytes());
    match Archive::with_logger(image, logger()) {
        Err(e @ Error::Superblock(SuperblockError::DisabledCompression(_))) => {
            assert_eq!(e.to_errno(), 22)
        }
        other => panic!("unexpected {:?}", other),
    }

    match Archive::with_logger(fixture.image[..50].to_vec(), logger()) {
        Err(e @ Error::Io(_)) => assert_eq!(e.to_errno(), 5),
        other => panic!("unexpected {:?}", other),
    }
}
