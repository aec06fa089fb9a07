//! Opaque MLS group identifier

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cryptographic group ID as chosen by the MLS engine.
///
/// The bytes carry no meaning for storage; they are compared and persisted as-is.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(Vec<u8>);

impl GroupId {
    /// Create a new GroupId from a byte slice
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Borrow the raw bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Copy the raw bytes into a new vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.clone()
    }

    /// Lowercase hex encoding of the bytes
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Whether the ID has no bytes at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for GroupId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.to_hex())
    }
}
