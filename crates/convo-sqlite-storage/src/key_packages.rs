//! Implementation of KeyPackageStorage trait for SQLite storage.

use convo_storage_traits::key_packages::{KeyPackageStorage, validate_new_key_package};
use convo_storage_traits::key_packages::types::{KeyPackage, NewKeyPackage};
use convo_storage_traits::{StorageError, Timestamp, validate_stored_integer};
use rusqlite::{Connection, OptionalExtension, params};

use crate::conversations::ensure_conversation;
use crate::db::{self, to_sql_u64};
use crate::{ConvoSqliteStorage, into_storage_err};

fn find_key_package_with(
    conn: &Connection,
    key_package_id: &str,
) -> Result<Option<KeyPackage>, StorageError> {
    conn.prepare("SELECT * FROM key_packages WHERE key_package_id = ?")
        .map_err(into_storage_err)?
        .query_row(params![key_package_id], db::row_to_key_package)
        .optional()
        .map_err(into_storage_err)
}

impl KeyPackageStorage for ConvoSqliteStorage {
    fn create_key_package(&self, key_package: NewKeyPackage) -> Result<KeyPackage, StorageError> {
        validate_new_key_package(&key_package)?;

        self.with_savepoint("convo_create_key_package", |conn| {
            if find_key_package_with(conn, &key_package.key_package_id)?.is_some() {
                return Err(StorageError::duplicate(
                    "key package",
                    &key_package.key_package_id,
                ));
            }

            let key_package = key_package.into_key_package();

            conn.execute(
                "INSERT INTO key_packages
                 (key_package_id, key_package_data, cipher_suite, owner_did, is_used, expires_at)
                 VALUES (?, ?, ?, ?, 0, ?)",
                params![
                    &key_package.key_package_id,
                    &key_package.key_package_data,
                    key_package.cipher_suite,
                    &key_package.owner_did,
                    to_sql_u64(key_package.expires_at.as_secs())?,
                ],
            )
            .map_err(into_storage_err)?;

            Ok(key_package)
        })
    }

    fn find_key_package(&self, key_package_id: &str) -> Result<Option<KeyPackage>, StorageError> {
        self.with_connection(|conn| find_key_package_with(conn, key_package_id))
    }

    fn available_key_packages(
        &self,
        owner_did: &str,
        now: Timestamp,
    ) -> Result<Vec<KeyPackage>, StorageError> {
        validate_stored_integer("now", now.as_secs())?;
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM key_packages
                     WHERE owner_did = ? AND is_used = 0 AND expires_at > ?
                     ORDER BY expires_at ASC, key_package_id ASC",
                )
                .map_err(into_storage_err)?;

            let rows = stmt
                .query_map(
                    params![owner_did, to_sql_u64(now.as_secs())?],
                    db::row_to_key_package,
                )
                .map_err(into_storage_err)?;

            let mut key_packages: Vec<KeyPackage> = Vec::new();
            for row in rows {
                key_packages.push(row.map_err(into_storage_err)?);
            }
            Ok(key_packages)
        })
    }

    fn count_available_key_packages(
        &self,
        owner_did: &str,
        now: Timestamp,
    ) -> Result<usize, StorageError> {
        validate_stored_integer("now", now.as_secs())?;
        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM key_packages
                     WHERE owner_did = ? AND is_used = 0 AND expires_at > ?",
                    params![owner_did, to_sql_u64(now.as_secs())?],
                    |row| row.get(0),
                )
                .map_err(into_storage_err)?;
            usize::try_from(count).map_err(into_storage_err)
        })
    }

    fn mark_key_package_as_used(
        &self,
        key_package_id: &str,
        conversation_id: &str,
    ) -> Result<KeyPackage, StorageError> {
        let now = Timestamp::now();

        self.with_savepoint("convo_mark_key_package_as_used", |conn| {
            let mut key_package = find_key_package_with(conn, key_package_id)?
                .ok_or_else(|| StorageError::not_found("key package", key_package_id))?;

            ensure_conversation(conn, conversation_id)?;

            if !key_package.is_available(now) {
                return Err(StorageError::KeyPackageUnavailable(
                    key_package_id.to_string(),
                ));
            }

            conn.execute(
                "UPDATE key_packages SET is_used = 1, used_at = ?, conversation_id = ?
                 WHERE key_package_id = ?",
                params![to_sql_u64(now.as_secs())?, conversation_id, key_package_id],
            )
            .map_err(into_storage_err)?;

            key_package.is_used = true;
            key_package.used_at = Some(now);
            key_package.conversation_id = Some(conversation_id.to_string());
            Ok(key_package)
        })
    }

    fn delete_key_package(&self, key_package_id: &str) -> Result<bool, StorageError> {
        self.with_connection(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM key_packages WHERE key_package_id = ?",
                    params![key_package_id],
                )
                .map_err(into_storage_err)?;
            Ok(deleted > 0)
        })
    }

    fn delete_expired_key_packages(&self, now: Timestamp) -> Result<usize, StorageError> {
        validate_stored_integer("now", now.as_secs())?;
        self.with_connection(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM key_packages WHERE expires_at <= ?",
                    params![to_sql_u64(now.as_secs())?],
                )
                .map_err(into_storage_err)?;

            if deleted > 0 {
                tracing::debug!(deleted, "Deleted expired key packages");
            }
            Ok(deleted)
        })
    }
}
