//! Implementation of MessageStorage trait for SQLite storage.

use convo_storage_traits::messages::types::{Message, NewMessage};
use convo_storage_traits::messages::{MessageStorage, validate_new_message};
use convo_storage_traits::{StorageError, Timestamp, validate_stored_integer};
use rusqlite::{OptionalExtension, params};

use crate::conversations::ensure_conversation;
use crate::db::{self, to_sql_u64};
use crate::{ConvoSqliteStorage, into_storage_err};

impl ConvoSqliteStorage {
    fn set_message_flags(&self, message_id: &str, sql: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            let updated = conn
                .execute(sql, params![message_id])
                .map_err(into_storage_err)?;
            if updated == 0 {
                return Err(StorageError::not_found("message", message_id));
            }
            Ok(())
        })
    }
}

impl MessageStorage for ConvoSqliteStorage {
    fn create_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        validate_new_message(&message)?;

        self.with_savepoint("convo_create_message", |conn| {
            ensure_conversation(conn, &message.conversation_id)?;

            let exists = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE message_id = ?",
                    params![&message.message_id],
                    |_| Ok(()),
                )
                .optional()
                .map_err(into_storage_err)?
                .is_some();
            if exists {
                return Err(StorageError::duplicate("message", &message.message_id));
            }

            // The counter lives on the conversation so numbers are never reused,
            // even after the newest messages were cleaned up.
            let sequence_number: i64 = conn
                .query_row(
                    "UPDATE conversations SET last_sequence_number = last_sequence_number + 1
                     WHERE conversation_id = ?
                     RETURNING last_sequence_number",
                    params![&message.conversation_id],
                    |row| row.get(0),
                )
                .map_err(into_storage_err)?;
            let sequence_number = u64::try_from(sequence_number).map_err(into_storage_err)?;

            let message = message.into_message(sequence_number);

            conn.execute(
                "INSERT INTO messages
                 (message_id, conversation_id, sender_id, content, content_type, epoch,
                  sequence_number, timestamp, is_delivered, is_read)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    &message.message_id,
                    &message.conversation_id,
                    &message.sender_id,
                    &message.content,
                    &message.content_type,
                    to_sql_u64(message.epoch)?,
                    to_sql_u64(message.sequence_number)?,
                    to_sql_u64(message.timestamp.as_secs())?,
                    message.is_delivered,
                    message.is_read,
                ],
            )
            .map_err(into_storage_err)?;

            Ok(message)
        })
    }

    fn find_message(&self, message_id: &str) -> Result<Option<Message>, StorageError> {
        self.with_connection(|conn| {
            conn.prepare("SELECT * FROM messages WHERE message_id = ?")
                .map_err(into_storage_err)?
                .query_row(params![message_id], db::row_to_message)
                .optional()
                .map_err(into_storage_err)
        })
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM messages WHERE conversation_id = ? \
                     ORDER BY sequence_number ASC",
                )
                .map_err(into_storage_err)?;

            let rows = stmt
                .query_map(params![conversation_id], db::row_to_message)
                .map_err(into_storage_err)?;

            let mut messages: Vec<Message> = Vec::new();
            for row in rows {
                messages.push(row.map_err(into_storage_err)?);
            }
            Ok(messages)
        })
    }

    fn mark_message_delivered(&self, message_id: &str) -> Result<(), StorageError> {
        self.set_message_flags(
            message_id,
            "UPDATE messages SET is_delivered = 1 WHERE message_id = ?",
        )
    }

    fn mark_message_read(&self, message_id: &str) -> Result<(), StorageError> {
        self.set_message_flags(
            message_id,
            "UPDATE messages SET is_delivered = 1, is_read = 1 WHERE message_id = ?",
        )
    }

    fn cleanup_message_keys(&self, older_than: Timestamp) -> Result<usize, StorageError> {
        validate_stored_integer("older_than", older_than.as_secs())?;
        self.with_connection(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM messages WHERE timestamp < ?",
                    params![to_sql_u64(older_than.as_secs())?],
                )
                .map_err(into_storage_err)?;

            if deleted > 0 {
                tracing::debug!(deleted, cutoff = older_than.as_secs(), "Cleaned up messages");
            }
            Ok(deleted)
        })
    }

    fn delete_messages_before_epoch(
        &self,
        conversation_id: &str,
        min_epoch: u64,
    ) -> Result<usize, StorageError> {
        validate_stored_integer("min_epoch", min_epoch)?;
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM messages WHERE conversation_id = ? AND epoch < ?",
                params![conversation_id, to_sql_u64(min_epoch)?],
            )
            .map_err(into_storage_err)
        })
    }
}
