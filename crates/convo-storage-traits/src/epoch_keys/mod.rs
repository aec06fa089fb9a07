//! Epoch keys module
//!
//! Forward secrecy is enforced in two phases. [`EpochKeyStorage::delete_old_epoch_keys`]
//! marks every key outside the retention window; [`EpochKeyStorage::delete_marked_epoch_keys`]
//! later erases the marked rows for good. Between the two, marked keys can be audited
//! but no longer decrypt anything.

use crate::{EpochSecret, StorageError};

pub mod types;

use self::types::EpochKey;

/// Storage traits for the epoch keys module
pub trait EpochKeyStorage {
    /// Record the key of a new epoch as active.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnknownConversation`] if the conversation does not exist
    /// - [`StorageError::DuplicateId`] if a key for this epoch already exists
    fn record_epoch_key(
        &self,
        conversation_id: &str,
        epoch: u64,
        secret: Option<EpochSecret>,
    ) -> Result<EpochKey, StorageError>;

    /// Keys of a conversation in ascending epoch order. With `active_only`,
    /// marked keys are left out.
    fn epoch_keys(&self, conversation_id: &str, active_only: bool)
    -> Result<Vec<EpochKey>, StorageError>;

    /// The secret of an epoch, only while its key is active
    fn epoch_secret(
        &self,
        conversation_id: &str,
        epoch: u64,
    ) -> Result<Option<EpochSecret>, StorageError>;

    /// Mark all but the `keep_last` highest-epoch active keys of a conversation.
    ///
    /// Idempotent: a second call with the same `keep_last` marks nothing.
    /// Returns the number of keys newly marked.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownConversation`] if the conversation does not exist.
    fn delete_old_epoch_keys(
        &self,
        conversation_id: &str,
        keep_last: usize,
    ) -> Result<usize, StorageError>;

    /// Irrecoverably erase every marked key in every conversation.
    ///
    /// Returns the erased rows with state `Purged` and no secret.
    fn delete_marked_epoch_keys(&self) -> Result<Vec<EpochKey>, StorageError>;
}
