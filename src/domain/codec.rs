// src/domain/codec.rs

//! Payload codec abstraction.
//!
//! A codec turns raw payload bytes into typed values and back. Decoding
//! never fails loudly: a payload that cannot become the requested type
//! yields `None`, and the caller decides how to report it.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Typed payload codec.
///
/// `decode` must be deterministic and must not panic on malformed input;
/// `None` is the only "no value" signal.
pub trait Codec: Send + Sync + 'static {
    // ---
    /// Decode `raw` into a `T`, or `None` if the payload holds no `T`.
    fn decode<T>(&self, raw: &[u8]) -> Option<T>
    where
        T: DeserializeOwned;

    /// Encode `value` into payload bytes.
    fn encode<T>(&self, value: &T) -> Result<Bytes>
    where
        T: Serialize + ?Sized;
}
