use crate::errors::{Error, SuperblockError};
use repr::compression::Id as CompressionId;
use std::{fmt, io};

#[cfg(feature = "gzip")]
pub mod gzip;

#[cfg(feature = "zstd")]
pub mod zstd;

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    ZLib = CompressionId::GZIP.0,
    Lzma = CompressionId::LZMA.0,
    Lzo = CompressionId::LZO.0,
    Xz = CompressionId::XZ.0,
    Lz4 = CompressionId::LZ4.0,
    Zstd = CompressionId::ZSTD.0,
    Unknown = 0,
}

pub trait Decompressor {
    /// Decompress all of `src` into `dst`, returning the number of bytes written
    ///
    /// Fails if the decompressed data would not fit in `dst`.
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> io::Result<usize>;
}

#[derive(Debug)]
pub enum AnyCodec {
    #[cfg(feature = "gzip")]
    Gzip(gzip::Gzip),
    #[cfg(feature = "zstd")]
    Zstd(zstd::Zstd),
}

impl AnyCodec {
    pub fn new(kind: Kind) -> Result<AnyCodec, Error> {
        let codec = match kind {
            #[cfg(feature = "gzip")]
            Kind::ZLib => AnyCodec::Gzip(gzip::Gzip::new()),
            #[cfg(feature = "zstd")]
            Kind::Zstd => AnyCodec::Zstd(zstd::Zstd::new()?),
            Kind::Unknown => return Err(SuperblockError::UnknownCompression(kind.id()).into()),
            _ => return Err(SuperblockError::DisabledCompression(kind).into()),
        };
        Ok(codec)
    }

    pub fn kind(&self) -> Kind {
        match *self {
            #[cfg(feature = "gzip")]
            AnyCodec::Gzip(_) => Kind::ZLib,
            #[cfg(feature = "zstd")]
            AnyCodec::Zstd(_) => Kind::Zstd,
        }
    }
}

impl Decompressor for AnyCodec {
    fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(feature = "gzip")]
            AnyCodec::Gzip(gzip) => gzip.decompress(src, dst),
            #[cfg(feature = "zstd")]
            AnyCodec::Zstd(zstd) => zstd.decompress(src, dst),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Kind {
    pub fn from_id(id: CompressionId) -> Kind {
        match id {
            CompressionId::GZIP => Kind::ZLib,
            CompressionId::LZMA => Kind::Lzma,
            CompressionId::LZO => Kind::Lzo,
            CompressionId::XZ => Kind::Xz,
            CompressionId::LZ4 => Kind::Lz4,
            CompressionId::ZSTD => Kind::Zstd,
            _ => Kind::Unknown,
        }
    }

    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::ZLib => "gzip",
            Kind::Lzma => "lzma",
            Kind::Lzo => "lzo",
            Kind::Xz => "xz",
            Kind::Lz4 => "lz4",
            Kind::Zstd => "zstd",
            Kind::Unknown => "unknown",
        }
    }

    pub fn supported(self) -> bool {
        match self {
            Kind::ZLib => cfg!(feature = "gzip"),
            Kind::Zstd => cfg!(feature = "zstd"),
            Kind::Lzma | Kind::Lzo | Kind::Xz | Kind::Lz4 | Kind::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_by_id() {
        assert_eq!(Kind::from_id(CompressionId::ZSTD), Kind::Zstd);
        assert_eq!(Kind::from_id(CompressionId(42)), Kind::Unknown);
        assert_eq!(Kind::Xz.id(), 4);
        assert_eq!(Kind::Lz4.to_string(), "lz4");
        assert!(!Kind::Unknown.supported());
    }

    #[test]
    fn unsupported_kinds_are_rejected() {
        assert!(matches!(
            AnyCodec::new(Kind::Unknown),
            Err(Error::Superblock(SuperblockError::UnknownCompression(0)))
        ));
        assert!(matches!(
            AnyCodec::new(Kind::Lzo),
            Err(Error::Superblock(SuperblockError::DisabledCompression(
                Kind::Lzo
            )))
        ));
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_decompressor() {
        use std::io::Write;

        let src: &[u8] = b"11111111111111111111111111111111111c111";
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(src).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut codec = AnyCodec::new(Kind::ZLib).unwrap();
        let mut dst = [0; 64];
        let size = codec.decompress(&compressed, &mut dst).unwrap();
        assert_eq!(&dst[..size], src);

        // The codec is reusable
        let size = codec.decompress(&compressed, &mut dst).unwrap();
        assert_eq!(&dst[..size], src);

        let mut small = [0; 4];
        codec
            .decompress(&compressed, &mut small)
            .expect_err("cannot decompress into 4 bytes");
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_decompressor() {
        let src: &[u8] = b"11111111111111111111111111111111111c111";
        let compressed = ::zstd::bulk::compress(src, 3).unwrap();

        let mut codec = AnyCodec::new(Kind::Zstd).unwrap();
        let mut dst = [0; 64];
        let size = codec.decompress(&compressed, &mut dst).unwrap();
        assert_eq!(&dst[..size], src);

        let mut small = [0; 4];
        codec
            .decompress(&compressed, &mut small)
            .expect_err("cannot decompress into 4 bytes");
    }
}
