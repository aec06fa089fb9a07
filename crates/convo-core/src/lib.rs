//! Conversation and key lifecycle manager for MLS group messaging
//!
//! This crate orchestrates group operations against a remote coordination service
//! and reconciles their results into local storage: membership changes, epoch
//! progression, retention of epoch keys for late messages, key package supply and
//! moderation.
//!
//! Every membership-changing operation follows the same path: a local fast-fail
//! check, the remote call (the server is authoritative), then the local commit.
//! Local state is never touched when the remote call fails.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use convo_storage_traits::ConvoStorageProvider;
use convo_storage_traits::conversations::types::Conversation;
use convo_storage_traits::members::types::Member;
use tokio::sync::OwnedMutexGuard;

pub mod api;
pub mod config;
pub mod constant;
pub mod conversations;
pub mod crypto;
pub mod error;
pub mod key_packages;
pub mod maintenance;
pub mod membership;
pub mod moderation;
#[cfg(test)]
pub mod test_util;
mod util;

pub use self::api::CoordinationApi;
pub use self::config::{ConfigError, ConvoConfig, RemoteConfig};
pub use self::crypto::GroupCrypto;
pub use self::error::{ConversationError, Error};
use self::util::ConversationLocks;

// Re-export for convenience
pub use convo_storage_traits::{GroupId, StorageError, Timestamp};

/// Builder for constructing a [`ConversationManager`]
///
/// # Examples
///
/// ```ignore
/// let manager = ConversationManager::builder(storage, api, crypto, "did:plc:me")
///     .with_config(ConvoConfig::max_forward_secrecy())
///     .build()?;
/// ```
#[derive(Debug)]
pub struct ConversationManagerBuilder<Storage> {
    storage: Storage,
    api: Arc<dyn CoordinationApi>,
    crypto: Arc<dyn GroupCrypto>,
    own_did: String,
    config: ConvoConfig,
}

impl<Storage> ConversationManagerBuilder<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// Create a new builder with the default configuration
    pub fn new<S>(
        storage: Storage,
        api: Arc<dyn CoordinationApi>,
        crypto: Arc<dyn GroupCrypto>,
        own_did: S,
    ) -> Self
    where
        S: Into<String>,
    {
        Self {
            storage,
            api,
            crypto,
            own_did: own_did.into(),
            config: ConvoConfig::default(),
        }
    }

    /// Set a custom configuration
    pub fn with_config(mut self, config: ConvoConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and build the manager
    pub fn build(self) -> Result<ConversationManager<Storage>, Error> {
        self.config.validate()?;
        if util::validate_did(&self.own_did).is_err() {
            return Err(ConfigError::InvalidOwnDid(self.own_did).into());
        }

        // Finish sweeps interrupted by a previous run
        if self.config.enable_automatic_cleanup && self.storage.backend().is_persistent() {
            match self.storage.delete_marked_epoch_keys() {
                Ok(purged) if !purged.is_empty() => {
                    tracing::info!(purged = purged.len(), "Purged marked epoch keys on startup");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Startup epoch key sweep failed"),
            }
        }

        Ok(ConversationManager {
            storage: self.storage,
            api: self.api,
            crypto: self.crypto,
            own_did: self.own_did,
            config: self.config,
            locks: ConversationLocks::default(),
            stale: parking_lot::Mutex::new(HashSet::new()),
            resolved_reports: parking_lot::Mutex::new(HashMap::new()),
        })
    }
}

/// Conversation manager
///
/// Owns the local view of every conversation the client takes part in. Calls
/// that change a conversation's roster are serialized per conversation: a second
/// one either waits or fails with [`ConversationError::Conflict`], depending on
/// [`ConvoConfig::queue_concurrent_operations`].
#[derive(Debug)]
pub struct ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    storage: Storage,
    api: Arc<dyn CoordinationApi>,
    crypto: Arc<dyn GroupCrypto>,
    own_did: String,
    config: ConvoConfig,
    locks: ConversationLocks,
    /// Conversations whose local state missed a remote change
    stale: parking_lot::Mutex<HashSet<String>>,
    /// Report ids resolved through this manager, per conversation
    resolved_reports: parking_lot::Mutex<HashMap<String, HashSet<String>>>,
}

impl<Storage> ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// Create a builder for constructing a manager
    pub fn builder<S>(
        storage: Storage,
        api: Arc<dyn CoordinationApi>,
        crypto: Arc<dyn GroupCrypto>,
        own_did: S,
    ) -> ConversationManagerBuilder<Storage>
    where
        S: Into<String>,
    {
        ConversationManagerBuilder::new(storage, api, crypto, own_did)
    }

    /// The did this manager acts as
    pub fn own_did(&self) -> &str {
        &self.own_did
    }

    /// The configuration the manager was built with
    pub fn config(&self) -> &ConvoConfig {
        &self.config
    }

    /// Get the storage provider
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether the local state of `convo_id` is due for a resync
    pub fn is_stale(&self, convo_id: &str) -> bool {
        self.stale.lock().contains(convo_id)
    }

    pub(crate) fn mark_stale(&self, convo_id: &str) {
        self.stale.lock().insert(convo_id.to_string());
    }

    pub(crate) fn clear_stale(&self, convo_id: &str) {
        self.stale.lock().remove(convo_id);
    }

    /// Drop all in-memory bookkeeping of a conversation that no longer exists
    pub(crate) fn forget_conversation(&self, convo_id: &str) {
        self.locks.forget(convo_id);
        self.clear_stale(convo_id);
        self.resolved_reports.lock().remove(convo_id);
    }

    /// The stored conversation, or `UnknownConversation`
    pub(crate) fn load_conversation(&self, convo_id: &str) -> Result<Conversation, Error> {
        self.storage
            .find_conversation(convo_id)?
            .ok_or_else(|| StorageError::unknown_conversation(convo_id).into())
    }

    /// Serialize with other roster changes of `convo_id` and bring its local
    /// state up to date.
    ///
    /// The returned guard must be held until the local commit is done.
    pub(crate) async fn begin_operation(
        &self,
        convo_id: &str,
    ) -> Result<(OwnedMutexGuard<()>, Conversation), Error> {
        let guard = self
            .locks
            .acquire(convo_id, self.config.queue_concurrent_operations)
            .await?;

        if self.is_stale(convo_id) {
            tracing::info!(convo_id, "Local state is stale, resyncing");
            self.resync_locked(convo_id).await?;
        }

        let conversation = self.load_conversation(convo_id)?;
        Ok((guard, conversation))
    }

    /// Local fast-fail admin check. The server check still follows.
    pub(crate) fn require_admin(&self, convo_id: &str) -> Result<Member, Error> {
        match self.storage.find_member(convo_id, &self.own_did)? {
            Some(member) if member.role.is_admin() => Ok(member),
            _ => Err(ConversationError::Forbidden(format!(
                "{} is not an admin of {convo_id}",
                self.own_did
            ))
            .into()),
        }
    }

    /// Run the local half of an operation whose remote half already succeeded.
    ///
    /// On failure the conversation is flagged stale so the next operation
    /// resyncs it first.
    pub(crate) fn commit_locally<T, F>(&self, convo_id: &str, commit: F) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        commit().inspect_err(|e| {
            tracing::warn!(
                convo_id,
                error = %e,
                "Remote change succeeded but local commit failed; marking stale"
            );
            self.mark_stale(convo_id);
        })
    }
}
