//! Entity identifiers derived from collision-resistant hashes.
//!
//! Every primary id in the ledger (output, input, transaction, block) is a
//! 256-bit unsigned integer obtained by hashing the entity's canonical
//! document. Ids compare numerically and are written to the store and into
//! signature material as lowercase hex without leading zeros.

use crate::error::ChainError;
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(BigUint);

impl Id {
    /// Hash a canonical document. `Value` renders object keys in sorted
    /// order, so the text form is canonical for any document.
    pub fn of(document: &Value) -> Self {
        Self::of_text(&document.to_string())
    }

    pub fn of_text(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Id(BigUint::from_bytes_be(&digest))
    }

    /// The all-zero id, used as the previous-block id of a genesis block.
    pub fn zero() -> Self {
        Id::default()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_str_radix(16)
    }

    pub fn from_hex(text: &str) -> Result<Self, ChainError> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChainError::SerializationError(format!(
                "invalid hex id: {:?}",
                text
            )));
        }
        BigUint::parse_bytes(text.as_bytes(), 16)
            .map(Id)
            .ok_or_else(|| ChainError::SerializationError(format!("invalid hex id: {:?}", text)))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Id::from_hex(&text).map_err(de::Error::custom)
    }
}
