//! Value encoding used for sizing and compression.
//!
//! A cache instance stores one value type. That type states how it turns into
//! bytes and back through [`CacheValue`]; the cache never inspects values any
//! other way.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Zstd codec failed: {0}")]
    Zstd(#[from] std::io::Error),

    #[error("JSON codec failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored bytes are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A value that can live in the cache.
pub trait CacheValue: Clone + Send + Sync + 'static {
    /// Serialize to the byte form used for size estimates and compression.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Rebuild a value from bytes produced by [`CacheValue::encode`].
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl CacheValue for String {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl CacheValue for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl CacheValue for Bytes {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

impl CacheValue for serde_json::Value {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Wrapper storing any serde type as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> CacheValue for Json<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}
