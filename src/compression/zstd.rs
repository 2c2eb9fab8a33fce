use std::fmt::Formatter;
use std::{fmt, io};
use zstd::bulk as zbulk;

pub struct Zstd(zbulk::Decompressor<'static>);

impl Zstd {
    pub fn new() -> io::Result<Self> {
        Ok(Zstd(zbulk::Decompressor::new()?))
    }

    pub fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> io::Result<usize> {
        self.0.decompress_to_buffer(src, dst)
    }
}

impl fmt::Debug for Zstd {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Zstd").finish()
    }
}
