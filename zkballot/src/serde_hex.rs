// Fixed-width byte arrays as lowercase hex strings.
//
// Variable-length buffers use `hex_serde` directly; this covers the 32-byte
// secrets and digests that `hex_serde` cannot deserialize into an array.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::convert::TryInto;

/// `#[serde(with = "Hex32")]` for `[u8; 32]`
#[allow(non_snake_case)]
pub mod Hex32 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::custom(format!("expected 32 bytes, found {}", bytes.len())))
    }
}
