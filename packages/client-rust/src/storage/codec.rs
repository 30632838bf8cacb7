//! `MsgPack` encoding of values stored in a [`CacheStore`](super::CacheStore).

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::{CacheError, CacheKey};

/// Serializes `value` for storage under `key`.
///
/// # Errors
///
/// Returns [`CacheError::Corrupt`] if the value cannot be encoded.
pub fn encode<T: Serialize>(key: &CacheKey, value: &T) -> Result<Vec<u8>, CacheError> {
    rmp_serde::to_vec_named(value).map_err(|e| CacheError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Deserializes a payload previously written with [`encode`].
///
/// # Errors
///
/// Returns [`CacheError::Corrupt`] if the payload does not decode as `T`.
pub fn decode<T: DeserializeOwned>(key: &CacheKey, payload: &[u8]) -> Result<T, CacheError> {
    rmp_serde::from_slice(payload).map_err(|e| CacheError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
