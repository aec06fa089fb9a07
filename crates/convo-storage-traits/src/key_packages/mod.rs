//! Key packages module
//!
//! Each key package may be consumed by at most one join. Consumption links it to
//! the joined conversation; expired packages are swept by maintenance.

use crate::{StorageError, Timestamp, validate_stored_integer};

pub mod types;

use self::types::{KeyPackage, NewKeyPackage};

/// Storage traits for the key packages module
pub trait KeyPackageStorage {
    /// Store a freshly generated key package
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateId`] if the ID is already stored.
    fn create_key_package(&self, key_package: NewKeyPackage) -> Result<KeyPackage, StorageError>;

    /// Find a key package by ID
    fn find_key_package(&self, key_package_id: &str) -> Result<Option<KeyPackage>, StorageError>;

    /// Unused, unexpired packages of an owner, soonest expiry first
    fn available_key_packages(
        &self,
        owner_did: &str,
        now: Timestamp,
    ) -> Result<Vec<KeyPackage>, StorageError>;

    /// Number of unused, unexpired packages of an owner
    fn count_available_key_packages(
        &self,
        owner_did: &str,
        now: Timestamp,
    ) -> Result<usize, StorageError>;

    /// Consume a key package for a conversation.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the package does not exist
    /// - [`StorageError::UnknownConversation`] if the conversation does not exist
    /// - [`StorageError::KeyPackageUnavailable`] if it was already used or expired
    fn mark_key_package_as_used(
        &self,
        key_package_id: &str,
        conversation_id: &str,
    ) -> Result<KeyPackage, StorageError>;

    /// Delete one key package. Returns whether it existed.
    fn delete_key_package(&self, key_package_id: &str) -> Result<bool, StorageError>;

    /// Permanently delete every package whose expiry is not after `now`.
    ///
    /// Returns the number of deleted packages.
    fn delete_expired_key_packages(&self, now: Timestamp) -> Result<usize, StorageError>;
}

/// Validate a key package before storing it
pub fn validate_new_key_package(key_package: &NewKeyPackage) -> Result<(), StorageError> {
    if key_package.key_package_id.is_empty() || key_package.key_package_data.is_empty() {
        return Err(StorageError::InvalidParameters(
            "Key package ID and data must not be empty".to_string(),
        ));
    }
    if !key_package.owner_did.starts_with("did:") {
        return Err(StorageError::InvalidParameters(format!(
            "Invalid owner did: {}",
            key_package.owner_did
        )));
    }
    validate_stored_integer("expires_at", key_package.expires_at.as_secs())

}
