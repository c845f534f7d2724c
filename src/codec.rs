//! JSON payload codec.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Codec, Result};

/// [`Codec`] backed by `serde_json`.
///
/// Yields `None` for an empty or whitespace-only payload, malformed JSON,
/// JSON of the wrong shape, and a literal `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode<T>(&self, raw: &[u8]) -> Option<T>
    where
        T: DeserializeOwned,
    {
        // ---
        if raw.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        // `null` deserializes to `None` here rather than to a default `T`.
        serde_json::from_slice::<Option<T>>(raw).ok().flatten()
    }

    fn encode<T>(&self, value: &T) -> Result<Bytes>
    where
        T: Serialize + ?Sized,
    {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }
}
