//! Memory-based storage implementation of MessageStorage

use convo_storage_traits::messages::types::{Message, NewMessage};
use convo_storage_traits::messages::{MessageStorage, validate_new_message};
use convo_storage_traits::{StorageError, Timestamp, validate_stored_integer};

use crate::ConvoMemoryStorage;

impl MessageStorage for ConvoMemoryStorage {
    fn create_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        validate_new_message(&message)?;

        let mut inner = self.inner.write();
        inner.ensure_conversation(&message.conversation_id)?;

        if inner.messages.contains_key(&message.message_id) {
            return Err(StorageError::duplicate("message", &message.message_id));
        }

        let stored = inner
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| StorageError::unknown_conversation(&message.conversation_id))?;
        stored.last_sequence_number += 1;
        let message = message.into_message(stored.last_sequence_number);

        inner
            .messages
            .insert(message.message_id.clone(), message.clone());
        Ok(message)
    }

    fn find_message(&self, message_id: &str) -> Result<Option<Message>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.messages.get(message_id).cloned())
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, StorageError> {
        let inner = self.inner.read();
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sequence_number);
        Ok(messages)
    }

    fn mark_message_delivered(&self, message_id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let message = inner
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        message.is_delivered = true;
        Ok(())
    }

    fn mark_message_read(&self, message_id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let message = inner
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        message.is_delivered = true;
        message.is_read = true;
        Ok(())
    }

    fn cleanup_message_keys(&self, older_than: Timestamp) -> Result<usize, StorageError> {
        validate_stored_integer("older_than", older_than.as_secs())?;
        let mut inner = self.inner.write();
        let before = inner.messages.len();
        inner.messages.retain(|_, m| m.timestamp >= older_than);
        Ok(before - inner.messages.len())
    }

    fn delete_messages_before_epoch(
        &self,
        conversation_id: &str,
        min_epoch: u64,
    ) -> Result<usize, StorageError> {
        validate_stored_integer("min_epoch", min_epoch)?;
        let mut inner = self.inner.write();
        let before = inner.messages.len();
        inner
            .messages
            .retain(|_, m| m.conversation_id != conversation_id || m.epoch >= min_epoch);
        Ok(before - inner.messages.len())
    }
}
