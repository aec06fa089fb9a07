//! Error types for storage operations

use thiserror::Error;

/// Error type shared by every storage trait.
///
/// These errors describe the local database only. They are kept apart from the
/// errors reported by the remote coordination service so a caller can tell a
/// broken database from a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The referenced conversation does not exist
    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    /// An entity with the same identity already exists
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// Requested item was not found
    #[error("not found: {0}")]
    NotFound(String),

    /// The key package was already consumed or has expired
    #[error("key package unavailable: {0}")]
    KeyPackageUnavailable(String),

    /// Another active member already occupies this leaf index
    #[error("leaf index {leaf_index} already in use in conversation {conversation_id}")]
    LeafIndexInUse {
        /// Conversation the collision happened in
        conversation_id: String,
        /// The contested leaf index
        leaf_index: u32,
    },

    /// Input rejected before touching the database
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    /// Shorthand for [`StorageError::UnknownConversation`]
    pub fn unknown_conversation<S>(conversation_id: S) -> Self
    where
        S: Into<String>,
    {
        Self::UnknownConversation(conversation_id.into())
    }

    /// [`StorageError::DuplicateId`] for an entity kind and key
    pub fn duplicate(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::DuplicateId(format!("{kind} {id}"))
    }

    /// [`StorageError::NotFound`] for an entity kind and key
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }
}
