use crate::codec::CodecError;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// A reversible byte transformation applied to payloads.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Gzip compressor backed by `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipCompressor {
    /// `level` ranges from 0 (store) to 9 (best compression).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Compress(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CodecError::Compress(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompress(e.to_string()))?;
        Ok(out)
    }
}
