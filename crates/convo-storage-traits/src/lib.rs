//! Convo storage - storage provider traits and types for MLS conversations
//!
//! The traits in this crate describe the durable state an MLS client keeps next to
//! the cryptographic engine: conversations, their members and messages, the epoch
//! keys retained for late-arriving messages, and the key packages published for
//! other clients to add us to groups.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod conversations;
pub mod epoch_keys;
pub mod error;
pub mod group_id;
pub mod key_packages;
pub mod members;
pub mod messages;
/// Zeroizing wrapper for epoch secrets
pub mod secret;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod timestamp;

pub use error::StorageError;
pub use group_id::GroupId;
pub use secret::EpochSecret;
pub use timestamp::Timestamp;

use self::conversations::ConversationStorage;
use self::epoch_keys::EpochKeyStorage;
use self::key_packages::KeyPackageStorage;
use self::members::MemberStorage;
use self::messages::MessageStorage;

/// Largest integer any backend can persist.
///
/// SQLite stores integers as signed 64-bit values, so epochs, sequence numbers
/// and timestamps above this are rejected rather than truncated.
pub const MAX_STORED_INTEGER: u64 = i64::MAX as u64;

/// Reject an integer field no backend can store losslessly
pub fn validate_stored_integer(field: &str, value: u64) -> Result<(), StorageError> {
    if value > MAX_STORED_INTEGER {
        return Err(StorageError::InvalidParameters(format!(
            "{field} {value} exceeds the storable maximum of {MAX_STORED_INTEGER}"
        )));
    }
    Ok(())
}

/// Backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Memory
    Memory,
    /// SQLite
    SQLite,
}

impl Backend {
    /// Check if it's a persistent backend
    ///
    /// All values different from [`Backend::Memory`] are considered persistent
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

/// Storage provider for conversation state.
///
/// Every single operation is atomic: it either fully applies or leaves no trace
/// visible to later reads. Sequences of operations are not transactional; callers
/// that need several writes to land together must compensate on failure.
///
/// Implementors must provide:
/// - Conversation storage, including cascade deletion
/// - Member storage with leaf-index uniqueness among active members
/// - Message storage with per-conversation sequence numbers
/// - Epoch key storage with two-phase (mark, then sweep) deletion
/// - Key package storage with single-use consumption
pub trait ConvoStorageProvider:
    ConversationStorage + MemberStorage + MessageStorage + EpochKeyStorage + KeyPackageStorage
{
    /// Returns the backend type.
    fn backend(&self) -> Backend;
}
