/// Options for reading an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The number of decompressed metadata blocks kept in memory
    ///
    /// Each cached block costs up to 8KiB. Zero disables caching entirely.
    pub metablock_cache_size: usize,
    /// Reject an inode whose stored inode number differs from the number it was requested by
    ///
    /// The kernel trusts the directory entry, so this is off by default.
    pub verify_inode_numbers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            metablock_cache_size: 8,
            verify_inode_numbers: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set_metablock_cache_size(&mut self, blocks: usize) -> &mut Self {
        self.metablock_cache_size = blocks;
        self
    }

    pub fn set_verify_inode_numbers(&mut self, verify: bool) -> &mut Self {
        self.verify_inode_numbers = verify;
        self
    }
}
