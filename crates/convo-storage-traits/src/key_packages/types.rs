//! Types for the key packages module

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Timestamp;

/// A key package we published so others can add us without interaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPackage {
    /// Key package ID, by default the hex SHA-256 of `key_package_data`
    pub key_package_id: String,
    /// Serialized key package
    pub key_package_data: Vec<u8>,
    /// MLS cipher suite identifier
    pub cipher_suite: u16,
    /// Did of the owner
    pub owner_did: String,
    /// Set once the package was consumed by a join
    pub is_used: bool,
    /// When the package was consumed
    pub used_at: Option<Timestamp>,
    /// The conversation the package was consumed for
    pub conversation_id: Option<String>,
    /// After this time the package must not be used
    pub expires_at: Timestamp,
}

impl KeyPackage {
    /// Compute the default ID for serialized key package bytes
    pub fn compute_id(key_package_data: &[u8]) -> String {
        hex::encode(Sha256::digest(key_package_data))
    }

    /// Whether the package can still be consumed at `now`
    pub fn is_available(&self, now: Timestamp) -> bool {
        !self.is_used && self.expires_at > now
    }
}

/// Input for storing a key package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewKeyPackage {
    /// Key package ID
    pub key_package_id: String,
    /// Serialized key package
    pub key_package_data: Vec<u8>,
    /// MLS cipher suite identifier
    pub cipher_suite: u16,
    /// Did of the owner
    pub owner_did: String,
    /// Expiry
    pub expires_at: Timestamp,
}

impl NewKeyPackage {
    /// Create the input, deriving the ID from the data
    pub fn new<S>(
        key_package_data: Vec<u8>,
        cipher_suite: u16,
        owner_did: S,
        expires_at: Timestamp,
    ) -> Self
    where
        S: Into<String>,
    {
        Self {
            key_package_id: KeyPackage::compute_id(&key_package_data),
            key_package_data,
            cipher_suite,
            owner_did: owner_did.into(),
            expires_at,
        }
    }

    /// Materialize the stored row
    pub fn into_key_package(self) -> KeyPackage {
        KeyPackage {
            key_package_id: self.key_package_id,
            key_package_data: self.key_package_data,
            cipher_suite: self.cipher_suite,
            owner_did: self.owner_did,
            is_used: false,
            used_at: None,
            conversation_id: None,
            expires_at: self.expires_at,
        }
    }
}
