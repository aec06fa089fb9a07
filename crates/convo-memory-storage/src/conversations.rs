//! Memory-based storage implementation of ConversationStorage

use convo_storage_traits::conversations::types::{Conversation, NewConversation};
use convo_storage_traits::conversations::{
    ConversationStorage, validate_new_conversation, validate_title,
};
use convo_storage_traits::{GroupId, StorageError, Timestamp, validate_stored_integer};

use crate::{ConvoMemoryStorage, StoredConversation};

impl ConversationStorage for ConvoMemoryStorage {
    fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<Conversation, StorageError> {
        validate_new_conversation(&conversation)?;

        let mut inner = self.inner.write();

        if inner.conversations.contains_key(&conversation.conversation_id) {
            return Err(StorageError::duplicate(
                "conversation",
                &conversation.conversation_id,
            ));
        }
        if inner
            .conversations_by_group_id
            .contains_key(&conversation.group_id)
        {
            return Err(StorageError::duplicate("group", &conversation.group_id));
        }

        let conversation = conversation.into_conversation(Timestamp::now());
        let insertion_order = inner.next_insertion_order;
        inner.next_insertion_order += 1;

        inner.conversations_by_group_id.insert(
            conversation.group_id.clone(),
            conversation.conversation_id.clone(),
        );
        inner.conversations.insert(
            conversation.conversation_id.clone(),
            StoredConversation {
                conversation: conversation.clone(),
                insertion_order,
                last_sequence_number: 0,
            },
        );

        Ok(conversation)
    }

    fn find_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .conversations
            .get(conversation_id)
            .map(|stored| stored.conversation.clone()))
    }

    fn find_conversation_by_group_id(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<Conversation>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .conversations_by_group_id
            .get(group_id)
            .and_then(|id| inner.conversations.get(id))
            .map(|stored| stored.conversation.clone()))
    }

    fn all_conversations(&self) -> Result<Vec<Conversation>, StorageError> {
        let inner = self.inner.read();
        let mut stored: Vec<&StoredConversation> = inner.conversations.values().collect();
        stored.sort_by_key(|s| (s.conversation.created_at, s.insertion_order));
        Ok(stored.into_iter().map(|s| s.conversation.clone()).collect())
    }

    fn save_conversation(&self, conversation: &Conversation) -> Result<(), StorageError> {
        validate_stored_integer("epoch", conversation.epoch)?;
        validate_title(conversation.title.as_deref())?;

        let mut inner = self.inner.write();
        let stored = inner
            .conversations
            .get_mut(&conversation.conversation_id)
            .ok_or_else(|| StorageError::unknown_conversation(&conversation.conversation_id))?;

        if conversation.epoch < stored.conversation.epoch {
            return Err(StorageError::InvalidParameters(format!(
                "Epoch cannot move backwards: {} -> {}",
                stored.conversation.epoch, conversation.epoch
            )));
        }

        // Identity and creation time are immutable
        let current = &mut stored.conversation;
        current.epoch = conversation.epoch;
        current.title = conversation.title.clone();
        current.member_count = conversation.member_count;
        current.is_active = conversation.is_active;

        Ok(())
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();

        let stored = inner
            .conversations
            .remove(conversation_id)
            .ok_or_else(|| StorageError::unknown_conversation(conversation_id))?;
        inner
            .conversations_by_group_id
            .remove(&stored.conversation.group_id);

        inner
            .members
            .retain(|_, member| member.conversation_id != conversation_id);
        inner
            .messages
            .retain(|_, message| message.conversation_id != conversation_id);
        inner
            .epoch_keys
            .retain(|(convo, _), _| convo != conversation_id);

        for key_package in inner.key_packages.values_mut() {
            if key_package.conversation_id.as_deref() == Some(conversation_id) {
                key_package.conversation_id = None;
            }
        }

        Ok(())
    }
}
