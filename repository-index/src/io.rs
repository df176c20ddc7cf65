// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers.

This module holds the compression dispatcher shared by every repository format
and a content digester computing the checksums package indices record.
*/

use {
    crate::error::Result,
    digest::Digest,
    serde::{Deserialize, Serialize},
    std::{
        fmt::Formatter,
        io::{Read, Write},
    },
    strum_macros::{Display, EnumIter, EnumString},
};

/// Compression format applied to repository files.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// Gzip compression (.gz extension).
    Gzip,

    /// Bzip2 compression (.bz2 extension).
    Bzip2,

    /// XZ compression (.xz extension).
    Xz,

    /// LZMA compression (.lzma extension).
    Lzma,

    /// LZ4 frame compression (.lz4 extension).
    Lz4,

    /// Zstandard compression (.zst extension).
    Zstd,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
            Self::Lzma => ".lzma",
            Self::Lz4 => ".lz4",
            Self::Zstd => ".zst",
        }
    }

    /// Resolve the compression format from a filename extension.
    ///
    /// The extension may be given with or without its leading dot. Unknown
    /// extensions resolve to [Compression::None].
    pub fn from_extension(extension: &str) -> Self {
        match extension.trim_start_matches('.') {
            "gz" => Self::Gzip,
            "bz2" => Self::Bzip2,
            "xz" => Self::Xz,
            "lzma" => Self::Lzma,
            "lz4" => Self::Lz4,
            "zst" | "zstd" => Self::Zstd,
            _ => Self::None,
        }
    }

    /// Resolve the compression format of a file name from its final extension.
    pub fn from_filename(filename: &str) -> Self {
        match filename.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Self::None,
        }
    }

    /// Sniff the compression format from the leading bytes of a stream.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else if data.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Self::Xz
        } else if data.starts_with(b"BZh") {
            Self::Bzip2
        } else if data.starts_with(&[0x04, 0x22, 0x4d, 0x18]) {
            Self::Lz4
        } else {
            Self::None
        }
    }

    /// Compress a buffer.
    ///
    /// Output is deterministic: gzip streams carry no timestamp or file name
    /// and every encoder runs at its strongest setting.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(match self {
            Self::None => data.to_vec(),
            Self::Gzip => {
                let mut encoder = flate2::GzBuilder::new()
                    .mtime(0)
                    .write(Vec::new(), flate2::Compression::best());
                encoder.write_all(data)?;
                encoder.finish()?
            }
            Self::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
                encoder.write_all(data)?;
                encoder.finish()?
            }
            Self::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 9);
                encoder.write_all(data)?;
                encoder.finish()?
            }
            Self::Lzma => {
                let options = xz2::stream::LzmaOptions::new_preset(9)
                    .map_err(std::io::Error::from)?;
                let stream = xz2::stream::Stream::new_lzma_encoder(&options)
                    .map_err(std::io::Error::from)?;
                let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
                encoder.write_all(data)?;
                encoder.finish()?
            }
            Self::Lz4 => {
                let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
                encoder.write_all(data)?;
                encoder
                    .finish()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
            }
            Self::Zstd => zstd::stream::encode_all(data, 19)?,
        })
    }

    /// Wrap a reader with transparent decompression.
    ///
    /// Gzip input may consist of several concatenated members.
    pub fn decompress<'a>(&self, reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(reader),
            Self::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            Self::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Self::Lzma => {
                let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                    .map_err(std::io::Error::from)?;
                Box::new(xz2::read::XzDecoder::new_stream(reader, stream))
            }
            Self::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(reader)),
            Self::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }

    /// Decompress a complete buffer.
    pub fn decompress_all(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![];
        self.decompress(data)?.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Holds the digests recorded for a package or index file.
#[derive(Clone, Eq, PartialEq)]
pub struct MultiContentDigest {
    pub md5: [u8; 16],
    pub sha1: [u8; 20],
    pub sha256: [u8; 32],
}

impl std::fmt::Debug for MultiContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiContentDigest")
            .field("md5", &hex::encode(self.md5))
            .field("sha1", &hex::encode(self.sha1))
            .field("sha256", &hex::encode(self.sha256))
            .finish()
    }
}

impl MultiContentDigest {
    /// Digest a complete buffer.
    pub fn digest(data: &[u8]) -> Self {
        let mut digester = MultiDigester::default();
        digester.update(data);
        digester.finish()
    }
}

/// A content digester that simultaneously computes multiple digest types.
#[derive(Clone, Default)]
pub struct MultiDigester {
    md5: md5::Md5,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
    size: u64,
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.size += data.len() as u64;
    }

    /// Number of bytes digested so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Finish digesting content.
    ///
    /// Consumes the instance and returns a [MultiContentDigest] holding all the digests.
    pub fn finish(self) -> MultiContentDigest {
        let mut digest = MultiContentDigest {
            md5: [0; 16],
            sha1: [0; 20],
            sha256: [0; 32],
        };
        digest.md5.copy_from_slice(&self.md5.finalize());
        digest.sha1.copy_from_slice(&self.sha1.finalize());
        digest.sha256.copy_from_slice(&self.sha256.finalize());

        digest
    }
}

impl Write for MultiDigester {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Compute the SHA-256 of a buffer.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut out = [0; 32];
    out.copy_from_slice(&sha2::Sha256::digest(data));
    out
}

/// Compute the SHA-1 of a buffer.
pub fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut out = [0; 20];
    out.copy_from_slice(&sha1::Sha1::digest(data));
    out
}
