//! Compression pipeline for large cache values.
//!
//! Values whose encoded form exceeds the configured threshold are zstd
//! compressed before storage. Decompression reverses the pipeline on read.

use crate::cache::value::CodecError;
use crate::config::CompressionConfig;

/// Outcome of [`Compressor::compress`].
#[derive(Debug, PartialEq, Eq)]
pub enum Compressed {
    /// Stored compressed; `saved` is the byte reduction.
    Packed { data: Vec<u8>, saved: usize },
    /// Below threshold, disabled, or no gain.
    Skipped,
}

/// The compression engine.
pub struct Compressor {
    config: CompressionConfig,
    threshold: usize,
    enabled: bool,
}

impl Compressor {
    pub fn new(config: CompressionConfig, threshold: usize, enabled: bool) -> Self {
        Self {
            config,
            threshold,
            enabled,
        }
    }

    /// Whether a value of `size` encoded bytes qualifies for compression.
    pub fn should_compress(&self, size: usize) -> bool {
        self.enabled && size > self.threshold
    }

    /// Compress `raw` when it qualifies and the result is actually smaller.
    pub fn compress(&self, raw: &[u8]) -> Result<Compressed, CodecError> {
        if !self.should_compress(raw.len()) {
            return Ok(Compressed::Skipped);
        }
        let data = self.zstd_compress(raw)?;
        if data.len() >= raw.len() {
            return Ok(Compressed::Skipped);
        }
        let saved = raw.len() - data.len();
        Ok(Compressed::Packed { data, saved })
    }

    /// Decompress bytes produced by [`Compressor::compress`].
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.zstd_decompress(data)
    }

    fn zstd_compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let compressed = zstd::encode_all(data, self.config.zstd_level)?;
        Ok(compressed)
    }

    fn zstd_decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let decompressed = zstd::decode_all(data)?;
        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::value::CacheValue;

    fn compressor() -> Compressor {
        Compressor::new(CompressionConfig::default(), 1024, true)
    }

    #[test]
    fn test_zstd_roundtrip() {
        let compressor = compressor();
        let data = vec![42u8; 4096];

        let compressed = compressor.zstd_compress(&data).unwrap();
        assert!(compressed.len() < data.len()); // should compress well

        let decompressed = compressor.zstd_decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_large_value_roundtrip() {
        let compressor = compressor();
        let value = "the quick brown fox jumps over the lazy dog ".repeat(100);
        let raw = value.encode().unwrap();

        let Compressed::Packed { data, saved } = compressor.compress(&raw).unwrap() else {
            panic!("value above threshold should compress");
        };
        assert_eq!(saved, raw.len() - data.len());

        let restored = String::decode(&compressor.decompress(&data).unwrap()).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_small_value_skipped() {
        let compressor = compressor();
        assert_eq!(compressor.compress(&[1u8; 1024]).unwrap(), Compressed::Skipped);
    }

    #[test]
    fn test_disabled_skips() {
        let compressor = Compressor::new(CompressionConfig::default(), 1024, false);
        assert_eq!(compressor.compress(&[0u8; 8192]).unwrap(), Compressed::Skipped);
    }

    #[test]
    fn test_incompressible_skipped() {
        let compressor = compressor();
        // xorshift noise does not shrink under zstd.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let noise: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect();
        assert_eq!(compressor.compress(&noise).unwrap(), Compressed::Skipped);
    }

    #[test]
    fn test_garbage_decompress_errors() {
        let compressor = compressor();
        assert!(compressor.decompress(b"not zstd at all").is_err());
    }
}
