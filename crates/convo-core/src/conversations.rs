//! Conversation lifecycle: creation, join, epoch progression and resync

use std::collections::HashMap;

use convo_storage_traits::conversations::types::{Conversation, NewConversation};
use convo_storage_traits::members::types::{Member, MemberRole, NewMember};
use convo_storage_traits::{ConvoStorageProvider, GroupId, StorageError};

use crate::api::{RemoteConversation, RemoteMember};
use crate::constant::CREATOR_LEAF_INDEX;
use crate::crypto::DecryptionWindow;
use crate::util::{self, call_with_retries};
use crate::{ConversationManager, Error};

/// What the coordination service hands out when we are added to a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    /// Conversation ID
    pub convo_id: String,
    /// MLS group ID
    pub group_id: GroupId,
    /// Epoch of the welcome
    pub epoch: u64,
    /// Optional title
    pub title: Option<String>,
    /// Our key package the welcome was encrypted to
    pub key_package_id: String,
    /// Roster at `epoch`, including ourselves
    pub members: Vec<RemoteMember>,
}

impl<Storage> ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// A stored conversation
    pub fn conversation(&self, convo_id: &str) -> Result<Option<Conversation>, Error> {
        Ok(self.storage.find_conversation(convo_id)?)
    }

    /// All stored conversations, oldest first
    pub fn conversations(&self) -> Result<Vec<Conversation>, Error> {
        Ok(self.storage.all_conversations()?)
    }

    /// Active members of a conversation, by leaf index
    pub fn members(&self, convo_id: &str) -> Result<Vec<Member>, Error> {
        self.load_conversation(convo_id)?;
        Ok(self.storage.members(convo_id, true)?)
    }

    /// Dids of the active admins of a conversation
    pub fn admins(&self, convo_id: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .members(convo_id)?
            .into_iter()
            .filter(|m| m.role.is_admin())
            .map(|m| m.did)
            .collect())
    }

    /// Store a group we created after the server registered it.
    ///
    /// We become admin at leaf 0; `members` are stored as given. Nothing is left
    /// behind when any step fails.
    pub fn create_conversation(
        &self,
        convo_id: &str,
        group_id: GroupId,
        title: Option<String>,
        members: Vec<RemoteMember>,
    ) -> Result<Conversation, Error> {
        for member in &members {
            util::validate_did(&member.did)?;
        }

        let mut new_conversation = NewConversation::new(convo_id, group_id.clone(), 0);
        new_conversation.title = title;
        self.storage.create_conversation(new_conversation)?;

        let creator = RemoteMember {
            did: self.own_did.clone(),
            leaf_index: CREATOR_LEAF_INDEX,
            role: MemberRole::Admin,
            handle: None,
        };
        let roster: Vec<RemoteMember> = std::iter::once(creator).chain(members).collect();

        let result = self.populate_conversation(convo_id, &group_id, 0, &roster);
        self.finish_or_discard(convo_id, result)
    }

    /// Store a group we were added to, consuming the key package the welcome
    /// was encrypted to.
    pub fn join_conversation(&self, info: JoinInfo) -> Result<Conversation, Error> {
        for member in &info.members {
            util::validate_did(&member.did)?;
        }

        let mut new_conversation =
            NewConversation::new(info.convo_id.clone(), info.group_id.clone(), info.epoch);
        new_conversation.title = info.title;
        self.storage.create_conversation(new_conversation)?;

        let result = self
            .storage
            .mark_key_package_as_used(&info.key_package_id, &info.convo_id)
            .map_err(Error::from)
            .and_then(|_| {
                self.populate_conversation(&info.convo_id, &info.group_id, info.epoch, &info.members)
            });

        let conversation = self.finish_or_discard(&info.convo_id, result)?;
        tracing::info!(
            convo_id = %info.convo_id,
            epoch = info.epoch,
            key_package_id = %info.key_package_id,
            "Joined conversation"
        );

        match self.local_key_packages_low() {
            Ok(true) => tracing::info!(
                key_package_target = self.config.key_package_target,
                "Key package supply below target, replenishment due"
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to count key packages"),
        }
        Ok(conversation)
    }

    fn populate_conversation(
        &self,
        convo_id: &str,
        group_id: &GroupId,
        epoch: u64,
        roster: &[RemoteMember],
    ) -> Result<Conversation, Error> {
        self.crypto.configure_group(
            group_id,
            DecryptionWindow {
                out_of_order_tolerance: self.config.out_of_order_tolerance,
                maximum_forward_distance: self.config.maximum_forward_distance,
            },
        )?;

        for member in roster {
            self.storage.create_member(new_member(convo_id, member))?;
        }

        let secret = self.crypto.export_epoch_secret(group_id, epoch)?;
        self.storage.record_epoch_key(convo_id, epoch, Some(secret))?;

        let mut conversation = self.load_conversation(convo_id)?;
        self.refresh_member_count(&mut conversation)?;
        self.storage.save_conversation(&conversation)?;
        Ok(conversation)
    }

    fn finish_or_discard(
        &self,
        convo_id: &str,
        result: Result<Conversation, Error>,
    ) -> Result<Conversation, Error> {
        result.inspect_err(|e| {
            tracing::warn!(convo_id, error = %e, "Discarding partially stored conversation");
            if let Err(e) = self.storage.delete_conversation(convo_id) {
                tracing::warn!(convo_id, error = %e, "Failed to discard conversation");
            }
            self.forget_conversation(convo_id);
        })
    }

    /// Apply a commit another member produced
    ///
    /// Replays of an epoch already applied are ignored.
    pub async fn apply_remote_commit(
        &self,
        convo_id: &str,
        new_epoch: u64,
    ) -> Result<Conversation, Error> {
        let (_guard, mut conversation) = self.begin_operation(convo_id).await?;

        if new_epoch <= conversation.epoch {
            tracing::debug!(
                convo_id,
                epoch = conversation.epoch,
                new_epoch,
                "Commit already applied"
            );
            return Ok(conversation);
        }

        self.commit_locally(convo_id, || {
            self.advance_epoch(&mut conversation, new_epoch)?;
            Ok(conversation)
        })
    }

    /// Remove a conversation we left or that was deleted, together with its
    /// members, messages and epoch keys.
    ///
    /// Takes the conversation's operation lock like any roster change.
    pub async fn delete_conversation(&self, convo_id: &str) -> Result<(), Error> {
        let guard = self
            .locks
            .acquire(convo_id, self.config.queue_concurrent_operations)
            .await?;

        let result = self
            .load_conversation(convo_id)
            .and_then(|_| Ok(self.storage.delete_conversation(convo_id)?));
        drop(guard);

        match result {
            Ok(()) => {
                self.forget_conversation(convo_id);
                tracing::info!(convo_id, "Conversation deleted");
                Ok(())
            }
            Err(Error::Storage(StorageError::UnknownConversation(id))) => {
                self.forget_conversation(convo_id);
                Err(StorageError::UnknownConversation(id).into())
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite the local view of a conversation with the server's
    pub async fn resync_conversation(&self, convo_id: &str) -> Result<Conversation, Error> {
        let _guard = self
            .locks
            .acquire(convo_id, self.config.queue_concurrent_operations)
            .await?;
        self.resync_locked(convo_id).await
    }

    /// Resync while holding the conversation's operation lock
    pub(crate) async fn resync_locked(&self, convo_id: &str) -> Result<Conversation, Error> {
        let mut conversation = self.load_conversation(convo_id)?;

        let remote: RemoteConversation =
            call_with_retries(&self.config.remote, "get_conversation", || {
                self.api.get_conversation(convo_id)
            })
            .await?;

        self.reconcile_roster(convo_id, &remote.members)?;

        if remote.epoch > conversation.epoch {
            self.advance_epoch(&mut conversation, remote.epoch)?;
        } else {
            if remote.epoch < conversation.epoch {
                tracing::warn!(
                    convo_id,
                    local_epoch = conversation.epoch,
                    remote_epoch = remote.epoch,
                    "Server reports an older epoch; keeping local epoch"
                );
            }
            self.refresh_member_count(&mut conversation)?;
            self.storage.save_conversation(&conversation)?;
        }

        self.clear_stale(convo_id);
        tracing::info!(convo_id, epoch = conversation.epoch, "Conversation resynced");
        Ok(conversation)
    }

    /// Make the active local roster match `remote`
    fn reconcile_roster(&self, convo_id: &str, remote: &[RemoteMember]) -> Result<(), Error> {
        let wanted: HashMap<&str, &RemoteMember> =
            remote.iter().map(|m| (m.did.as_str(), m)).collect();
        let local = self.storage.members(convo_id, true)?;

        // Removals first so freed leaves can be reused by the additions
        let mut kept: HashMap<String, Member> = HashMap::new();
        for member in local {
            match wanted.get(member.did.as_str()) {
                Some(target) if target.leaf_index == member.leaf_index => {
                    kept.insert(member.did.clone(), member);
                }
                _ => {
                    self.storage.mark_member_removed(convo_id, &member.did)?;
                }
            }
        }

        for target in remote {
            match kept.get(&target.did) {
                Some(member) if member.role != target.role => {
                    self.storage
                        .update_member_role(convo_id, &target.did, target.role)?;
                }
                Some(_) => {}
                None => {
                    self.storage.create_member(new_member(convo_id, target))?;
                }
            }
        }
        Ok(())
    }

    /// Move `conversation` to `new_epoch`: record the epoch key, persist the
    /// epoch and apply the retention policy.
    pub(crate) fn advance_epoch(
        &self,
        conversation: &mut Conversation,
        new_epoch: u64,
    ) -> Result<(), Error> {
        let convo_id = conversation.conversation_id.clone();
        let secret = self
            .crypto
            .export_epoch_secret(&conversation.group_id, new_epoch)?;

        match self
            .storage
            .record_epoch_key(&convo_id, new_epoch, Some(secret))
        {
            Ok(_) => {}
            Err(StorageError::DuplicateId(_)) => {
                tracing::debug!(convo_id, epoch = new_epoch, "Epoch key already recorded");
            }
            Err(e) => return Err(e.into()),
        }

        let previous = conversation.epoch;
        conversation.epoch = new_epoch;
        self.refresh_member_count(conversation)?;
        self.storage.save_conversation(conversation)?;
        tracing::info!(convo_id, from = previous, to = new_epoch, "Epoch advanced");

        self.apply_retention(&convo_id)
    }

    /// Epoch the server reported for a commit we asked for
    ///
    /// The local epoch moves by at least one. A gap means we missed commits, so
    /// the roster is resynced before the next operation.
    pub(crate) fn next_epoch(&self, conversation: &Conversation, reported: u64) -> u64 {
        let expected = conversation.epoch + 1;
        if reported != expected {
            tracing::warn!(
                convo_id = %conversation.conversation_id,
                expected,
                reported,
                "Unexpected epoch from server; scheduling resync"
            );
            self.mark_stale(&conversation.conversation_id);
        }
        reported.max(expected)
    }

    /// Trim epoch keys of `convo_id` to the configured window
    fn apply_retention(&self, convo_id: &str) -> Result<(), Error> {
        if !self.config.enable_automatic_cleanup {
            return Ok(());
        }

        let marked = self
            .storage
            .delete_old_epoch_keys(convo_id, self.config.retained_epoch_keys())?;
        if marked > 0 {
            tracing::debug!(convo_id, marked, "Marked old epoch keys");
        }

        // Nothing from past epochs may survive the advance
        if self.config.max_past_epochs == 0 && marked > 0 {
            let purged = self.storage.delete_marked_epoch_keys()?;
            tracing::info!(convo_id, purged = purged.len(), "Purged epoch keys");
        }
        Ok(())
    }

    pub(crate) fn refresh_member_count(&self, conversation: &mut Conversation) -> Result<(), Error> {
        let active = self
            .storage
            .members(&conversation.conversation_id, true)?
            .len();
        conversation.member_count = u32::try_from(active).unwrap_or(u32::MAX);
        Ok(())
    }
}

fn new_member(convo_id: &str, member: &RemoteMember) -> NewMember {
    let mut new_member = NewMember::new(convo_id, member.did.clone(), member.leaf_index)
        .role(member.role);
    new_member.handle = member.handle.clone();
    new_member
}
