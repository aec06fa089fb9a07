//! Conversations module
//!
//! A conversation is the local record of one MLS group: its cryptographic group ID,
//! the epoch we last applied, and some display metadata. Members, messages and epoch
//! keys all hang off a conversation and are removed with it.

use crate::{GroupId, StorageError, validate_stored_integer};

pub mod types;

use self::types::{Conversation, NewConversation};

/// Maximum length for a conversation title (255 bytes, UTF-8 encoded)
pub const MAX_TITLE_LENGTH: usize = 255;

/// Storage traits for the conversations module
pub trait ConversationStorage {
    /// Create a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateId`] if a conversation with the same ID (or
    /// the same group ID) already exists.
    fn create_conversation(&self, conversation: NewConversation)
    -> Result<Conversation, StorageError>;

    /// Find a conversation by its ID
    fn find_conversation(&self, conversation_id: &str)
    -> Result<Option<Conversation>, StorageError>;

    /// Find a conversation by its MLS group ID
    fn find_conversation_by_group_id(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<Conversation>, StorageError>;

    /// Get all conversations, ordered by creation time
    fn all_conversations(&self) -> Result<Vec<Conversation>, StorageError>;

    /// Update the mutable fields of an existing conversation: epoch, title,
    /// member count and the active flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownConversation`] if it does not exist and
    /// [`StorageError::InvalidParameters`] if the epoch would move backwards.
    fn save_conversation(&self, conversation: &Conversation) -> Result<(), StorageError>;

    /// Delete a conversation together with all of its members, messages and
    /// epoch keys. Key packages consumed for it lose their back-reference.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownConversation`] if it does not exist.
    fn delete_conversation(&self, conversation_id: &str) -> Result<(), StorageError>;
}

/// Validate a conversation title
pub fn validate_title(title: Option<&str>) -> Result<(), StorageError> {
    if let Some(title) = title
        && title.len() > MAX_TITLE_LENGTH
    {
        return Err(StorageError::InvalidParameters(format!(
            "Title exceeds maximum length of {} bytes (got {} bytes)",
            MAX_TITLE_LENGTH,
            title.len()
        )));
    }
    Ok(())
}

/// Validate the identity fields of a new conversation
pub fn validate_new_conversation(conversation: &NewConversation) -> Result<(), StorageError> {
    if conversation.conversation_id.is_empty() {
        return Err(StorageError::InvalidParameters(
            "Conversation ID must not be empty".to_string(),
        ));
    }
    if conversation.group_id.is_empty() {
        return Err(StorageError::InvalidParameters(
            "Group ID must not be empty".to_string(),
        ));
    }
    validate_stored_integer("epoch", conversation.epoch)?;
    validate_title(conversation.title.as_deref())
}
