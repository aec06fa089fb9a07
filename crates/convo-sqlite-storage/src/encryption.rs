//! At-rest encryption of the conversation database
//!
//! Epoch secrets live in the same file as the roster, so production databases are
//! opened through SQLCipher with a 256-bit raw key supplied by the caller.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;

use rusqlite::Connection;
use zeroize::Zeroizing;

use crate::error::Error;

/// Length of a SQLCipher raw key
pub const KEY_LEN: usize = 32;

/// First bytes of every plaintext SQLite file
const PLAINTEXT_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Raw SQLCipher key for a conversation database.
///
/// Wiped on drop; `Debug` never shows it.
#[derive(Clone)]
pub struct EncryptionConfig {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl EncryptionConfig {
    /// Wrap an existing key, e.g. one loaded from the platform keystore
    #[must_use]
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Wrap a key of unchecked length
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self::new)
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))
    }

    /// Draw a fresh key from the OS RNG
    pub fn generate() -> Result<Self, Error> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        getrandom::fill(key.as_mut_slice()).map_err(|e| Error::KeyGeneration(e.to_string()))?;
        Ok(Self { key })
    }

    /// Key bytes, for handing back to the keystore
    #[must_use]
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// `PRAGMA key` statement with the key as a blob literal
    fn key_pragma(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "PRAGMA key = \"x'{}'\";",
            hex::encode(self.key.as_slice())
        ))
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Key `conn` and make sure the key opens the file.
///
/// Has to be the first statement on a new connection.
pub fn apply_encryption(conn: &Connection, config: &EncryptionConfig) -> Result<(), Error> {
    conn.execute_batch(&config.key_pragma())?;
    conn.execute_batch(
        "PRAGMA cipher_compatibility = 4;
         PRAGMA temp_store = MEMORY;",
    )?;

    // A wrong key is only noticed on the first read
    let first_read = conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    });
    match first_read {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ffi::ErrorCode::NotADatabase =>
        {
            Err(Error::WrongEncryptionKey)
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether the file at `path` lacks the plaintext SQLite header.
///
/// Missing and empty files report `false`.
pub fn is_database_encrypted<P>(path: P) -> Result<bool, Error>
where
    P: AsRef<Path>,
{
    let mut header = [0u8; PLAINTEXT_MAGIC.len()];
    let read = std::fs::File::open(path).and_then(|mut file| file.read_exact(&mut header));
    match read {
        Ok(()) => Ok(&header != PLAINTEXT_MAGIC),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::UnexpectedEof) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
