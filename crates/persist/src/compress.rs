//! Compression capability
//!
//! One small trait over the two supported algorithms plus the pass-through
//! OFF mode. A compressor consumes a staged byte run and produces one
//! finished compressed segment; segments are self-contained so a reader can
//! decompress each output file slice independently.

use std::io::{self, Write};

use thiserror::Error;

/// Compression failure.
///
/// The caller keeps the staged input intact and retries on the next flush.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("compression failed: {0}")]
    Io(#[from] io::Error),
}

/// Compression algorithm selector.
///
/// Wire values are part of the control ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum CompressAlg {
    /// No compression; staged bytes are written verbatim.
    #[default]
    Off = 0,
    /// Deflate with a zlib header.
    Zlib = 1,
    /// Zstandard.
    Zstd = 2,
}

impl CompressAlg {
    /// Decode from the control wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Zlib),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// The control wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Output file suffix for this algorithm.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Off => "",
            Self::Zlib => ".gz",
            Self::Zstd => ".zst",
        }
    }

    /// Build the compressor, or `None` for OFF.
    pub fn compressor(self) -> Option<Box<dyn Compress>> {
        match self {
            Self::Off => None,
            Self::Zlib => Some(Box::new(ZlibCompress::default())),
            Self::Zstd => Some(Box::new(ZstdCompress::default())),
        }
    }
}

/// Compress one input run into one finished segment.
pub trait Compress: Send {
    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, CompressError>;
}

/// Zlib (deflate) compressor.
pub struct ZlibCompress {
    level: flate2::Compression,
}

impl Default for ZlibCompress {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl Compress for ZlibCompress {
    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, CompressError> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::with_capacity(input.len() / 2), self.level);
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }
}

/// Zstandard compressor.
pub struct ZstdCompress {
    level: i32,
}

impl Default for ZstdCompress {
    fn default() -> Self {
        Self {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Compress for ZstdCompress {
    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, CompressError> {
        Ok(zstd::bulk::compress(input, self.level)?)
    }
}

#[cfg(test)]
#[path = "compress_test.rs"]
mod compress_test;
