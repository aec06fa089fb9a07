//! Messages module
//!
//! Messages are stored as ciphertext together with the epoch they were encrypted
//! under. Retention cleanup deletes them permanently once they are older than the
//! configured message-key retention window.

use crate::{StorageError, Timestamp, validate_stored_integer};

pub mod types;

use self::types::{Message, NewMessage};

/// Maximum size for message content (1 MB)
pub const MAX_MESSAGE_CONTENT_SIZE: usize = 1024 * 1024;

/// Storage traits for the messages module
pub trait MessageStorage {
    /// Store a message and assign the next sequence number of its conversation.
    ///
    /// Sequence numbers start at 1 and are strictly increasing per conversation.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnknownConversation`] if the conversation does not exist
    /// - [`StorageError::DuplicateId`] if the message ID is taken
    /// - [`StorageError::InvalidParameters`] if the content is too large
    fn create_message(&self, message: NewMessage) -> Result<Message, StorageError>;

    /// Find a message by ID
    fn find_message(&self, message_id: &str) -> Result<Option<Message>, StorageError>;

    /// All messages of a conversation in ascending sequence order
    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, StorageError>;

    /// Flag a message as delivered
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the message does not exist.
    fn mark_message_delivered(&self, message_id: &str) -> Result<(), StorageError>;

    /// Flag a message as read. Reading implies delivery.
    fn mark_message_read(&self, message_id: &str) -> Result<(), StorageError>;

    /// Permanently delete every message whose timestamp is before `older_than`.
    ///
    /// Returns the number of deleted messages.
    fn cleanup_message_keys(&self, older_than: Timestamp) -> Result<usize, StorageError>;

    /// Permanently delete the messages of a conversation encrypted under an epoch
    /// lower than `min_epoch`. Used once those epoch keys are gone.
    ///
    /// Returns the number of deleted messages.
    fn delete_messages_before_epoch(
        &self,
        conversation_id: &str,
        min_epoch: u64,
    ) -> Result<usize, StorageError>;
}

/// Validate a new message before storing it
pub fn validate_new_message(message: &NewMessage) -> Result<(), StorageError> {
    if message.message_id.is_empty() {
        return Err(StorageError::InvalidParameters(
            "Message ID must not be empty".to_string(),
        ));
    }
    if message.content.len() > MAX_MESSAGE_CONTENT_SIZE {
        return Err(StorageError::InvalidParameters(format!(
            "Message content exceeds maximum size of {} bytes (got {} bytes)",
            MAX_MESSAGE_CONTENT_SIZE,
            message.content.len()
        )));
    }
    validate_stored_integer("epoch", message.epoch)?;
    validate_stored_integer("timestamp", message.timestamp.as_secs())

}
