//! Errors raised while opening the conversation database

use convo_storage_traits::StorageError;

/// Failure to open, key or migrate a database.
///
/// Trait operations on an open [`crate::ConvoSqliteStorage`] report
/// [`StorageError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem or connection setup failure
    #[error("database unavailable: {0}")]
    Database(String),
    /// SQLite rejected a statement
    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
    /// A schema migration failed
    #[error("schema migration failed: {0}")]
    Refinery(#[from] refinery::Error),
    /// Key was not 32 bytes long
    #[error("encryption key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    /// Key does not open the existing file
    #[error("encryption key does not open this database")]
    WrongEncryptionKey,
    /// A key was supplied for a file created in plaintext
    #[error("database was created unencrypted and cannot be opened with a key")]
    UnencryptedDatabaseWithEncryption,
    /// OS RNG failure
    #[error("could not generate encryption key: {0}")]
    KeyGeneration(String),
    /// Restricting file permissions failed
    #[error("could not secure database file: {0}")]
    FilePermission(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<Error> for StorageError {
    fn from(e: Error) -> Self {
        StorageError::Database(e.to_string())
    }
}
