//! SQLite-based storage implementation for MLS conversations.
//!
//! Implements [`ConvoStorageProvider`] on top of a single SQLite connection.
//! Data is persisted to a file, so this is the backend for production clients.
//!
//! # Encryption
//!
//! Epoch secrets live in this database. Use [`ConvoSqliteStorage::new_with_key`] to
//! encrypt it at rest with SQLCipher:
//!
//! ```no_run
//! use convo_sqlite_storage::{ConvoSqliteStorage, EncryptionConfig};
//!
//! let config = EncryptionConfig::generate()?;
//! // Store `config.key()` in the platform keystore before using the database
//! let storage = ConvoSqliteStorage::new_with_key("/path/to/convo.db", config)?;
//! # Ok::<(), convo_sqlite_storage::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use convo_storage_traits::{Backend, ConvoStorageProvider, StorageError};
use rusqlite::Connection;

mod conversations;
mod db;
pub mod encryption;
mod epoch_keys;
pub mod error;
mod key_packages;
mod members;
mod messages;
mod migrations;
mod permissions;

pub use self::encryption::EncryptionConfig;
use self::error::Error;
use self::permissions::{precreate_secure_database_file, set_secure_file_permissions};

#[inline]
pub(crate) fn into_storage_err<T>(e: T) -> StorageError
where
    T: std::error::Error,
{
    StorageError::Database(e.to_string())
}

/// A SQLite-based storage implementation for MLS conversations.
///
/// All reads and writes go through one connection guarded by a mutex, so every
/// trait operation sees a consistent database. Operations that touch several rows
/// run inside a savepoint and either fully apply or roll back.
pub struct ConvoSqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for ConvoSqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvoSqliteStorage").finish_non_exhaustive()
    }
}

impl ConvoSqliteStorage {
    /// Creates an encrypted [`ConvoSqliteStorage`] with a caller-managed key.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An existing database was created without encryption
    /// - An existing database cannot be decrypted with the provided key
    /// - The database file cannot be created, opened or migrated
    pub fn new_with_key<P>(file_path: P, config: EncryptionConfig) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_path = file_path.as_ref();

        // A clearer error than letting PRAGMA key fail on a plain file
        if file_path.exists() && !encryption::is_database_encrypted(file_path)? {
            return Err(Error::UnencryptedDatabaseWithEncryption);
        }

        Self::new_internal(file_path, Some(config))
    }

    /// Creates an unencrypted [`ConvoSqliteStorage`].
    ///
    /// Epoch secrets will be stored in plaintext. Only use this for development or
    /// testing. Accepts `":memory:"` for a throwaway database.
    pub fn new_unencrypted<P>(file_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        tracing::warn!(
            "Creating unencrypted database. Epoch secrets will be stored in plaintext. \
             For production use, use new_with_key() instead."
        );
        Self::new_internal(file_path, None)
    }

    /// Creates an in-memory [`ConvoSqliteStorage`]. Nothing is persisted.
    pub fn new_in_memory() -> Result<Self, Error> {
        let mut connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&mut connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn new_internal<P>(
        file_path: P,
        encryption_config: Option<EncryptionConfig>,
    ) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_path = file_path.as_ref();

        let created = precreate_secure_database_file(file_path)?;
        tracing::debug!(
            path = %file_path.display(),
            created,
            encrypted = encryption_config.is_some(),
            "Opening conversation database"
        );

        let mut connection = Connection::open(file_path)?;

        // Must be the first statement on the connection
        if let Some(config) = encryption_config.as_ref() {
            encryption::apply_encryption(&connection, config)?;
        }

        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&mut connection)?;

        if !permissions::is_special_path(file_path) {
            set_secure_file_permissions(file_path)?;
        }

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_connection<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Connection) -> T,
    {
        // A panic while holding the lock cannot leave a half-applied savepoint
        // behind, so a poisoned lock is still safe to use.
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    /// Run `f` inside a named savepoint. Works both inside and outside an
    /// existing transaction.
    pub(crate) fn with_savepoint<F, T>(&self, name: &str, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        self.with_connection(|conn| {
            conn.execute_batch(&format!("SAVEPOINT {name}"))
                .map_err(into_storage_err)?;

            match f(conn) {
                Ok(value) => {
                    conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))
                        .map_err(into_storage_err)?;
                    Ok(value)
                }
                Err(e) => {
                    // Best-effort cleanup to keep connection usable.
                    let _ = conn.execute_batch(&format!(
                        "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name};"
                    ));
                    Err(e)
                }
            }
        })
    }
}

impl ConvoStorageProvider for ConvoSqliteStorage {
    fn backend(&self) -> Backend {
        Backend::SQLite
    }
}
