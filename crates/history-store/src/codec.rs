//! Key and value encoding.
//!
//! The store deals in string keys and opaque byte values. Typed callers
//! encode keys with [`encode_key`] and pick a [`ValueSerializer`] for values.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Converts values of one type to and from stored bytes.
pub trait ValueSerializer<V>: Send + Sync {
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError>;

    /// Name recorded in the cache identity in place of the value type.
    fn describe(&self) -> String;
}

/// Encode a key into its stored form.
///
/// Keys are stored as compact JSON so that `"1"` and `1` stay distinct.
pub fn encode_key<K: Serialize + ?Sized>(key: &K) -> Result<String, CodecError> {
    serde_json::to_string(key).map_err(|e| CodecError::Encode {
        what: "key",
        reason: e.to_string(),
    })
}

/// serde_json based serializer, usable for any serde type.
pub struct JsonSerializer<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonSerializer<V> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for JsonSerializer<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ValueSerializer<V> for JsonSerializer<V>
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            what: "value",
            reason: e.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            what: "value",
            reason: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        format!("json<{}>", std::any::type_name::<V>())
    }
}

/// Stores strings as raw UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl ValueSerializer<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>, CodecError> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Decode {
            what: "value",
            reason: e.to_string(),
        })
    }

    fn describe(&self) -> String {
        "utf8".to_string()
    }
}
