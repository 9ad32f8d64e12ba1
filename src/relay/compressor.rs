//! zstd compression for event batches and stored segments
//!
//! Two distinct layers share this type: the *inner* layer compresses each
//! flushed buffer snapshot inside the relay queue, and the *outer* layer
//! compresses a whole merged segment at ingest time. Streaming consumers
//! decode only the outer layer; the two must never be conflated.

use crate::utils::errors::{EngineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Compression levels
#[derive(Debug, Clone, Copy, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    /// Fast compression (level 1)
    Fast,

    /// Balanced (level 3)
    #[default]
    Balanced,

    /// Best compression (level 19)
    Best,
}

impl CompressionLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

/// Compressor using zstd
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    /// Compress raw bytes
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, self.level.as_i32())
            .map_err(|e| EngineError::Compression(format!("encode error: {}", e)))?;

        debug!(
            "compressed {} bytes -> {} bytes",
            data.len(),
            compressed.len()
        );

        Ok(compressed)
    }

    /// Decompress raw bytes
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data)
            .map_err(|e| EngineError::Compression(format!("decode error: {}", e)))
    }

    /// Serialize a value to JSON and compress it
    pub fn compress_json<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value)?;
        self.compress(&json)
    }

    /// Decompress bytes and deserialize the JSON inside
    pub fn decompress_json<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        let json = self.decompress(data)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
