//! Memory-based storage implementation for MLS conversations.
//!
//! Implements [`ConvoStorageProvider`] with plain in-memory maps. Nothing is
//! persisted; the data is gone when the storage is dropped. Useful for tests and
//! ephemeral clients.
//!
//! Every operation takes the single [`RwLock`] for its whole duration, so each one
//! is atomic with respect to the others. Nothing is ever evicted: a conversation's
//! state leaves memory only through the trait's delete operations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use convo_storage_traits::conversations::types::Conversation;
use convo_storage_traits::epoch_keys::types::EpochKey;
use convo_storage_traits::key_packages::types::KeyPackage;
use convo_storage_traits::members::types::Member;
use convo_storage_traits::messages::types::Message;
use convo_storage_traits::{Backend, ConvoStorageProvider, GroupId, StorageError};
use parking_lot::RwLock;

mod conversations;
mod epoch_keys;
mod key_packages;
mod members;
mod messages;

/// A memory-based storage implementation for MLS conversations.
#[derive(Default)]
pub struct ConvoMemoryStorage {
    inner: RwLock<ConvoMemoryStorageInner>,
}

/// A conversation row plus the bookkeeping SQLite keeps in hidden columns
#[derive(Debug, Clone)]
struct StoredConversation {
    conversation: Conversation,
    /// Insertion order, the tie-breaker for equal creation times
    insertion_order: u64,
    /// Highest message sequence number handed out so far
    last_sequence_number: u64,
}

#[derive(Default)]
struct ConvoMemoryStorageInner {
    conversations: HashMap<String, StoredConversation>,
    conversations_by_group_id: HashMap<GroupId, String>,
    next_insertion_order: u64,
    /// Keyed by member ID
    members: BTreeMap<String, Member>,
    /// Keyed by message ID
    messages: HashMap<String, Message>,
    /// Keyed by (conversation ID, epoch)
    epoch_keys: BTreeMap<(String, u64), EpochKey>,
    /// Keyed by key package ID
    key_packages: HashMap<String, KeyPackage>,
}

impl ConvoMemoryStorageInner {
    fn ensure_conversation(&self, conversation_id: &str) -> Result<(), StorageError> {
        if self.conversations.contains_key(conversation_id) {
            Ok(())
        } else {
            Err(StorageError::unknown_conversation(conversation_id))
        }
    }
}

impl fmt::Debug for ConvoMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ConvoMemoryStorage")
            .field("conversations", &inner.conversations.len())
            .field("members", &inner.members.len())
            .field("messages", &inner.messages.len())
            .field("epoch_keys", &inner.epoch_keys.len())
            .field("key_packages", &inner.key_packages.len())
            .finish()
    }
}

impl ConvoMemoryStorage {
    /// Creates a new, empty `ConvoMemoryStorage`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConvoStorageProvider for ConvoMemoryStorage {
    fn backend(&self) -> Backend {
        Backend::Memory
    }
}
