//! Deterministic mapping of arbitrary bytes into the BN254 scalar field.
//!
//! Every identifier that takes part in a commitment (voter identities, election
//! ids, tree nodes) is normalized into this field first, so that a circuit over
//! the same curve can reproduce every hash.

use crate::*;
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::str::FromStr;

/// Width of a serialized field element.
pub const FIELD_BYTES: usize = 32;

/// Big-endian bytes of the BN254 scalar field modulus (a 254-bit prime).
pub const MODULUS_BYTES: [u8; FIELD_BYTES] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58, 0x5d,
    0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00, 0x00, 0x01,
];

lazy_static! {
    static ref MODULUS: BigUint = BigUint::from_bytes_be(&MODULUS_BYTES);
}

/// An element of the working prime field, always kept reduced.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(BigUint);

impl FieldElement {
    pub fn zero() -> Self {
        FieldElement(BigUint::default())
    }

    pub fn from_u64(value: u64) -> Self {
        FieldElement(BigUint::from(value) % &*MODULUS)
    }

    /// Interpret big-endian bytes of any length and reduce them into the field.
    pub fn from_bytes_reduced(bytes: &[u8]) -> Self {
        FieldElement(BigUint::from_bytes_be(bytes) % &*MODULUS)
    }

    /// Parse a canonical 32-byte big-endian encoding. Values at or above the
    /// modulus are rejected rather than silently reduced.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != FIELD_BYTES {
            return Err(Error::InvalidFieldElement);
        }
        let value = BigUint::from_bytes_be(bytes);
        if value >= *MODULUS {
            return Err(Error::InvalidFieldElement);
        }
        Ok(FieldElement(value))
    }

    /// Fixed-width big-endian encoding.
    pub fn to_bytes(&self) -> [u8; FIELD_BYTES] {
        let raw = self.0.to_bytes_be();
        let mut bytes = [0u8; FIELD_BYTES];
        // Reduced values never exceed 32 bytes
        bytes[FIELD_BYTES - raw.len()..].copy_from_slice(&raw);
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }
}

/// Hash arbitrary bytes into the field.
///
/// SHA-512 output is reduced modulo the 254-bit prime; the wide digest keeps the
/// reduction bias negligible.
pub fn hash_to_field(data: &[u8]) -> FieldElement {
    let digest = Sha512::digest(data);
    FieldElement::from_bytes_reduced(&digest)
}

/// Hash the concatenation of several byte strings into the field.
pub fn hash_concat(parts: &[&[u8]]) -> FieldElement {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    FieldElement::from_bytes_reduced(&hasher.finalize())
}

const LEAF_TAG: &[u8] = &[0x00];
const NODE_TAG: &[u8] = &[0x01];

/// Leaf node of the eligibility tree holding a voter identity.
pub fn hash_leaf(identity: &FieldElement) -> FieldElement {
    hash_concat(&[LEAF_TAG, &identity.to_bytes()[..]])
}

/// Parent node of two field elements, used by the eligibility tree.
///
/// Leaves and parents carry different tags, so no parent can pass for a leaf.
pub fn hash_pair(left: &FieldElement, right: &FieldElement) -> FieldElement {
    hash_concat(&[NODE_TAG, &left.to_bytes()[..], &right.to_bytes()[..]])
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FieldElement(0x{})", self)
    }
}

impl FromStr for FieldElement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHex)?;
        FieldElement::from_canonical_bytes(&bytes)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FieldElement::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for FieldElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<FieldElement> for [u8; FIELD_BYTES] {
    fn from(item: FieldElement) -> Self {
        item.to_bytes()
    }
}

impl From<u64> for FieldElement {
    fn from(item: u64) -> Self {
        FieldElement::from_u64(item)
    }
}
