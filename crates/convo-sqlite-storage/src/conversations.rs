//! Implementation of ConversationStorage trait for SQLite storage.

use convo_storage_traits::conversations::types::{Conversation, NewConversation};
use convo_storage_traits::conversations::{ConversationStorage, validate_new_conversation};
use convo_storage_traits::{GroupId, StorageError, Timestamp, validate_stored_integer};
use rusqlite::{Connection, OptionalExtension, params};

use crate::db::{self, to_sql_u64};
use crate::{ConvoSqliteStorage, into_storage_err};

/// Whether a conversation row exists. Used by the other entity modules.
pub(crate) fn conversation_exists(
    conn: &Connection,
    conversation_id: &str,
) -> Result<bool, StorageError> {
    conn.query_row(
        "SELECT 1 FROM conversations WHERE conversation_id = ?",
        params![conversation_id],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(into_storage_err)
}

pub(crate) fn ensure_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> Result<(), StorageError> {
    if conversation_exists(conn, conversation_id)? {
        Ok(())
    } else {
        Err(StorageError::unknown_conversation(conversation_id))
    }
}

fn find_conversation_with(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Option<Conversation>, StorageError> {
    conn.prepare("SELECT * FROM conversations WHERE conversation_id = ?")
        .map_err(into_storage_err)?
        .query_row(params![conversation_id], db::row_to_conversation)
        .optional()
        .map_err(into_storage_err)
}

impl ConversationStorage for ConvoSqliteStorage {
    fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<Conversation, StorageError> {
        validate_new_conversation(&conversation)?;

        let conversation = conversation.into_conversation(Timestamp::now());

        self.with_savepoint("convo_create_conversation", |conn| {
            if conversation_exists(conn, &conversation.conversation_id)? {
                return Err(StorageError::duplicate(
                    "conversation",
                    &conversation.conversation_id,
                ));
            }

            let group_taken: bool = conn
                .query_row(
                    "SELECT 1 FROM conversations WHERE group_id = ?",
                    params![conversation.group_id.as_slice()],
                    |_| Ok(()),
                )
                .optional()
                .map_err(into_storage_err)?
                .is_some();
            if group_taken {
                return Err(StorageError::duplicate("group", &conversation.group_id));
            }

            conn.execute(
                "INSERT INTO conversations
                 (conversation_id, group_id, epoch, title, member_count, is_active, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    &conversation.conversation_id,
                    conversation.group_id.as_slice(),
                    to_sql_u64(conversation.epoch)?,
                    &conversation.title,
                    conversation.member_count,
                    conversation.is_active,
                    to_sql_u64(conversation.created_at.as_secs())?,
                ],
            )
            .map_err(into_storage_err)?;

            Ok(conversation)
        })
    }

    fn find_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StorageError> {
        self.with_connection(|conn| find_conversation_with(conn, conversation_id))
    }

    fn find_conversation_by_group_id(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<Conversation>, StorageError> {
        self.with_connection(|conn| {
            conn.prepare("SELECT * FROM conversations WHERE group_id = ?")
                .map_err(into_storage_err)?
                .query_row(params![group_id.as_slice()], db::row_to_conversation)
                .optional()
                .map_err(into_storage_err)
        })
    }

    fn all_conversations(&self) -> Result<Vec<Conversation>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM conversations ORDER BY created_at ASC, rowid ASC")
                .map_err(into_storage_err)?;

            let rows = stmt
                .query_map([], db::row_to_conversation)
                .map_err(into_storage_err)?;

            let mut conversations: Vec<Conversation> = Vec::new();

            for row in rows {
                match row {
                    Ok(conversation) => conversations.push(conversation),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Failed to deserialize conversation row, skipping"
                        );
                    }
                }
            }

            Ok(conversations)
        })
    }

    fn save_conversation(&self, conversation: &Conversation) -> Result<(), StorageError> {
        validate_stored_integer("epoch", conversation.epoch)?;
        convo_storage_traits::conversations::validate_title(conversation.title.as_deref())?;

        self.with_savepoint("convo_save_conversation", |conn| {
            let stored = find_conversation_with(conn, &conversation.conversation_id)?
                .ok_or_else(|| StorageError::unknown_conversation(&conversation.conversation_id))?;

            if conversation.epoch < stored.epoch {
                return Err(StorageError::InvalidParameters(format!(
                    "Epoch cannot move backwards: {} -> {}",
                    stored.epoch, conversation.epoch
                )));
            }

            conn.execute(
                "UPDATE conversations
                 SET epoch = ?, title = ?, member_count = ?, is_active = ?
                 WHERE conversation_id = ?",
                params![
                    to_sql_u64(conversation.epoch)?,
                    &conversation.title,
                    conversation.member_count,
                    conversation.is_active,
                    &conversation.conversation_id,
                ],
            )
            .map_err(into_storage_err)?;

            Ok(())
        })
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            // Members, messages and epoch keys go with it through ON DELETE CASCADE;
            // consumed key packages keep their row with a NULL conversation.
            let deleted = conn
                .execute(
                    "DELETE FROM conversations WHERE conversation_id = ?",
                    params![conversation_id],
                )
                .map_err(into_storage_err)?;

            if deleted == 0 {
                return Err(StorageError::unknown_conversation(conversation_id));
            }

            tracing::debug!(conversation_id, "Deleted conversation");
            Ok(())
        })
    }
}
