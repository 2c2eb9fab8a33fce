use crate::cache::InodeCache;
use crate::compression::{self, AnyCodec};
use crate::config::Config;
use crate::errors::{Result, SuperblockError};
use crate::fragments::FragmentTable;
use crate::ids::IdTable;
use crate::inode::{Decoder, Inode};
use crate::metadata::MetablockReader;
use positioned_io::{RandomAccessFile, ReadAt};
use repr::inode::{Number, Ref};
use repr::superblock::{Flags, Superblock};
use slog::{Drain, Logger};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use zerocopy::{AsBytes, FromBytes};

/// The inode decoder wired to an archive's own tables
pub type ArchiveDecoder<R> = Decoder<MetablockReader<R>, IdTable<R>, FragmentTable<R>>;

/// A squashfs archive opened for reading inodes
pub struct Archive<R> {
    superblock: Superblock,
    compression: compression::Kind,
    inodes: InodeCache<ArchiveDecoder<R>>,
}

pub(crate) fn default_logger() -> Logger {
    slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}

impl Archive<RandomAccessFile> {
    pub fn open<P: AsRef<Path>>(p: P) -> Result<Self> {
        Archive::open_with_logger(p, default_logger())
    }

    pub fn open_with_logger<P: AsRef<Path>>(p: P, logger: Logger) -> Result<Self> {
        Self::_open(p.as_ref(), &Config::default(), logger)
    }

    pub fn open_with_config<P: AsRef<Path>>(
        p: P,
        config: &Config,
        logger: Logger,
    ) -> Result<Self> {
        Self::_open(p.as_ref(), config, logger)
    }

    fn _open(path: &Path, config: &Config, logger: Logger) -> Result<Self> {
        let path_str = path.display().to_string();
        let logger = logger.new(slog::o!("file" => path_str));
        let file = RandomAccessFile::open(path)?;
        Self::with_config(file, config, logger)
    }
}

impl<R: ReadAt> Archive<R> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_logger(reader, default_logger())
    }

    pub fn with_logger(reader: R, logger: Logger) -> Result<Self> {
        Self::with_config(reader, &Config::default(), logger)
    }

    pub fn with_config(reader: R, config: &Config, logger: Logger) -> Result<Self> {
        let mut superblock = Superblock::new_zeroed();
        reader.read_exact_at(0, superblock.as_bytes_mut())?;
        log_superblock(&logger, &superblock);

        let compression = validate_superblock(&superblock)?;
        let codec = AnyCodec::new(compression)?;
        if superblock.flags().contains(Flags::COMPRESSOR_OPTIONS) {
            // Options only tune the compressor, decompression does not need them
            slog::debug!(logger, "Ignoring compressor options");
        }
        slog::info!(logger, "Opened archive";
            "compression_kind" => %compression,
            "inode_count" => superblock.inode_count.get()
        );

        let metadata = MetablockReader::new(
            reader,
            codec,
            config.metablock_cache_size,
            logger.new(slog::o!("table" => "metadata")),
        );
        let ids = IdTable::new(
            metadata.clone(),
            superblock.id_table_start.get(),
            superblock.id_count.get(),
        );
        let fragments = FragmentTable::new(
            metadata.clone(),
            superblock.fragment_table_start.get(),
            superblock.fragment_entry_count.get(),
        );
        let decoder = Decoder::new(
            metadata,
            ids,
            fragments,
            superblock.inode_table_start.get(),
            logger.new(slog::o!("table" => "inode")),
        );
        let inodes = InodeCache::new(decoder, config, logger);

        Ok(Self {
            superblock,
            compression,
            inodes,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn compression(&self) -> compression::Kind {
        self.compression
    }

    pub fn decoder(&self) -> &ArchiveDecoder<R> {
        self.inodes.loader()
    }

    /// Decode the root directory's inode
    pub fn root(&self) -> Result<Inode> {
        self.decoder().decode(self.superblock.root_inode_ref())
    }

    /// Get inode `number`, stored at `inode_ref`
    ///
    /// Each inode is decoded once, however many threads ask for it, and kept until
    /// [`forget`](#method.forget) is called.
    pub fn inode(&self, number: Number, inode_ref: Ref) -> Result<Arc<Inode>> {
        self.inodes.get_or_load(number, inode_ref)
    }

    /// Inode `number` if it is already loaded
    pub fn cached_inode(&self, number: Number) -> Option<Arc<Inode>> {
        self.inodes.get(number)
    }

    pub fn forget(&self, number: Number) -> bool {
        self.inodes.forget(number)
    }
}

impl<R> fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("superblock", &self.superblock)
            .field("compression", &self.compression)
            .field("inodes", &self.inodes)
            .finish()
    }
}

fn validate_superblock(superblock: &Superblock) -> Result<compression::Kind, SuperblockError> {
    let magic = superblock.magic.get();
    if magic != repr::superblock::MAGIC {
        return Err(SuperblockError::BadMagic { magic });
    }

    let (major, minor) = (
        superblock.version_major.get(),
        superblock.version_minor.get(),
    );
    if major != repr::superblock::VERSION_MAJOR || minor != repr::superblock::VERSION_MINOR {
        return Err(SuperblockError::BadVersion { major, minor });
    }

    let block_log = superblock.block_log.get();
    let block_size = superblock.block_size.get();
    if !(repr::BLOCK_LOG_MIN..=repr::BLOCK_LOG_MAX).contains(&block_log)
        || block_size != 1 << block_log
    {
        return Err(SuperblockError::CorruptBlockSizes {
            block_log,
            block_size,
        });
    }

    let compression_kind = compression::Kind::from_id(superblock.compression_id());
    if compression_kind == compression::Kind::Unknown {
        return Err(SuperblockError::UnknownCompression(
            superblock.compression_id.get(),
        ));
    }
    if !compression_kind.supported() {
        return Err(SuperblockError::DisabledCompression(compression_kind));
    }
    Ok(compression_kind)
}

fn log_superblock(logger: &Logger, superblock: &Superblock) {
    slog::debug!(logger, "Read superblock";
        "magic" => superblock.magic.get(),
        "inode_count" => superblock.inode_count.get(),
        "modification_time" => superblock.modification_time.get(),
        "block_size" => superblock.block_size.get(),
        "fragment_entry_count" => superblock.fragment_entry_count.get(),
        "compression_id" => superblock.compression_id.get(),
        "block_log" => superblock.block_log.get(),
        "flags" => ?superblock.flags(),
        "id_count" => superblock.id_count.get(),
        "version_major" => superblock.version_major.get(),
        "version_minor" => superblock.version_minor.get(),
        "root_inode_ref" => format!("{:#x}", superblock.root_inode_ref.get()),
        "bytes_used" => superblock.bytes_used.get(),
        "id_table_start" => superblock.id_table_start.get(),
        "xattr_id_table_start" => superblock.xattr_id_table_start.get(),
        "inode_table_start" => superblock.inode_table_start.get(),
        "directory_table_start" => superblock.directory_table_start.get(),
        "fragment_table_start" => superblock.fragment_table_start.get(),
        "export_table_start" => superblock.export_table_start.get()
    )
}
