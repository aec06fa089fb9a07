//! Implementation of EpochKeyStorage trait for SQLite storage.

use convo_storage_traits::epoch_keys::EpochKeyStorage;
use convo_storage_traits::epoch_keys::types::{EpochKey, EpochKeyState};
use convo_storage_traits::{EpochSecret, StorageError, Timestamp, validate_stored_integer};
use rusqlite::{OptionalExtension, params};

use crate::conversations::ensure_conversation;
use crate::db::{self, to_sql_u64};
use crate::{ConvoSqliteStorage, into_storage_err};

impl EpochKeyStorage for ConvoSqliteStorage {
    fn record_epoch_key(
        &self,
        conversation_id: &str,
        epoch: u64,
        secret: Option<EpochSecret>,
    ) -> Result<EpochKey, StorageError> {
        validate_stored_integer("epoch", epoch)?;
        let created_at = Timestamp::now();

        self.with_savepoint("convo_record_epoch_key", |conn| {
            ensure_conversation(conn, conversation_id)?;

            let exists = conn
                .query_row(
                    "SELECT 1 FROM epoch_keys WHERE conversation_id = ? AND epoch = ?",
                    params![conversation_id, to_sql_u64(epoch)?],
                    |_| Ok(()),
                )
                .optional()
                .map_err(into_storage_err)?
                .is_some();
            if exists {
                return Err(StorageError::duplicate(
                    "epoch key",
                    format!("{conversation_id}@{epoch}"),
                ));
            }

            conn.execute(
                "INSERT INTO epoch_keys (conversation_id, epoch, secret, state, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    conversation_id,
                    to_sql_u64(epoch)?,
                    secret.as_ref().map(EpochSecret::expose),
                    EpochKeyState::Active.as_str(),
                    to_sql_u64(created_at.as_secs())?,
                ],
            )
            .map_err(into_storage_err)?;

            Ok(EpochKey {
                conversation_id: conversation_id.to_string(),
                epoch,
                secret,
                state: EpochKeyState::Active,
                created_at,
                deleted_at: None,
            })
        })
    }

    fn epoch_keys(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> Result<Vec<EpochKey>, StorageError> {
        self.with_connection(|conn| {
            let query = if active_only {
                "SELECT * FROM epoch_keys WHERE conversation_id = ? AND state = 'active' \
                 ORDER BY epoch ASC"
            } else {
                "SELECT * FROM epoch_keys WHERE conversation_id = ? ORDER BY epoch ASC"
            };

            let mut stmt = conn.prepare(query).map_err(into_storage_err)?;
            let rows = stmt
                .query_map(params![conversation_id], db::row_to_epoch_key)
                .map_err(into_storage_err)?;

            let mut keys: Vec<EpochKey> = Vec::new();
            for row in rows {
                keys.push(row.map_err(into_storage_err)?);
            }
            Ok(keys)
        })
    }

    fn epoch_secret(
        &self,
        conversation_id: &str,
        epoch: u64,
    ) -> Result<Option<EpochSecret>, StorageError> {
        validate_stored_integer("epoch", epoch)?;
        self.with_connection(|conn| {
            let secret: Option<Option<Vec<u8>>> = conn
                .query_row(
                    "SELECT secret FROM epoch_keys
                     WHERE conversation_id = ? AND epoch = ? AND state = 'active'",
                    params![conversation_id, to_sql_u64(epoch)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(into_storage_err)?;

            Ok(secret.flatten().map(EpochSecret::new))
        })
    }

    fn delete_old_epoch_keys(
        &self,
        conversation_id: &str,
        keep_last: usize,
    ) -> Result<usize, StorageError> {
        let now = Timestamp::now();

        self.with_savepoint("convo_delete_old_epoch_keys", |conn| {
            ensure_conversation(conn, conversation_id)?;

            // Every active key below the `keep_last` highest active epochs
            let marked = conn
                .execute(
                    "UPDATE epoch_keys SET state = 'marked', deleted_at = ?
                     WHERE conversation_id = ? AND state = 'active' AND epoch NOT IN (
                         SELECT epoch FROM epoch_keys
                         WHERE conversation_id = ? AND state = 'active'
                         ORDER BY epoch DESC
                         LIMIT ?
                     )",
                    params![
                        to_sql_u64(now.as_secs())?,
                        conversation_id,
                        conversation_id,
                        i64::try_from(keep_last).unwrap_or(i64::MAX),
                    ],
                )
                .map_err(into_storage_err)?;

            if marked > 0 {
                tracing::debug!(conversation_id, marked, keep_last, "Marked old epoch keys");
            }
            Ok(marked)
        })
    }

    fn delete_marked_epoch_keys(&self) -> Result<Vec<EpochKey>, StorageError> {
        self.with_savepoint("convo_delete_marked_epoch_keys", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM epoch_keys WHERE state = 'marked' \
                     ORDER BY conversation_id ASC, epoch ASC",
                )
                .map_err(into_storage_err)?;
            let rows = stmt
                .query_map([], db::row_to_epoch_key)
                .map_err(into_storage_err)?;

            let mut purged: Vec<EpochKey> = Vec::new();
            for row in rows {
                let mut key = row.map_err(into_storage_err)?;
                key.secret = None;
                key.state = EpochKeyState::Purged;
                purged.push(key);
            }

            // Overwrite before delete so the secret bytes do not linger in free pages
            conn.execute(
                "UPDATE epoch_keys SET secret = zeroblob(length(secret))
                 WHERE state = 'marked' AND secret IS NOT NULL",
                [],
            )
            .map_err(into_storage_err)?;
            conn.execute("DELETE FROM epoch_keys WHERE state = 'marked'", [])
                .map_err(into_storage_err)?;

            if !purged.is_empty() {
                tracing::info!(purged = purged.len(), "Purged marked epoch keys");
            }
            Ok(purged)
        })
    }
}
