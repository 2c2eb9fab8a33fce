use flate2::{Decompress, FlushDecompress, Status};
use std::convert::TryFrom;
use std::io;

/// zlib streams, as written by mksquashfs for the "gzip" compressor
#[derive(Debug)]
pub struct Gzip {
    decompressor: Decompress,
}

impl Default for Gzip {
    fn default() -> Self {
        Self {
            decompressor: Decompress::new(true),
        }
    }
}

impl Gzip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> io::Result<usize> {
        let decompressor = &mut self.decompressor;
        decompressor.reset(true);
        loop {
            let consumed = clamp(decompressor.total_in(), src.len());
            let produced = clamp(decompressor.total_out(), dst.len());
            let status = decompressor.decompress(
                &src[consumed..],
                &mut dst[produced..],
                FlushDecompress::Finish,
            )?;
            match status {
                Status::Ok => {}
                Status::StreamEnd => return Ok(clamp(decompressor.total_out(), dst.len())),
                Status::BufError => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "zlib stream is truncated or larger than the output",
                    ))
                }
            }
        }
    }
}

/// A stream total as an index into a buffer of `len` bytes
fn clamp(total: u64, len: usize) -> usize {
    usize::try_from(total).map_or(len, |total| total.min(len))
}
