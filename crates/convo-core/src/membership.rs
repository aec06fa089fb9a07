//! Membership changes: add, remove, promote and demote
//!
//! Each operation runs the local fast-fail checks, asks the coordination service
//! to commit, and only then applies the change and the epoch advance locally.

use convo_storage_traits::conversations::types::Conversation;
use convo_storage_traits::members::types::{Member, MemberRole, NewMember};
use convo_storage_traits::messages::types::NewMessage;
use convo_storage_traits::{ConvoStorageProvider, Timestamp};
use serde::{Deserialize, Serialize};

use crate::api::{
    AddMemberOutput, AddMemberRequest, AdminChangeRequest, BlockRelationship, CommitOutput,
    RemoveMemberRequest, SendMessageOutput, SendMessageRequest,
};
use crate::constant::ROSTER_UPDATE_CONTENT_TYPE;
use crate::util::{self, call_with_retries, idempotency_key};
use crate::{ConversationError, ConversationManager, Error};

/// Admin roster broadcast to the group after a promotion or demotion.
///
/// Informational only: the server's membership state stays canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterUpdate {
    /// Conversation
    pub convo_id: String,
    /// Epoch after the change
    pub epoch: u64,
    /// Dids of all admins after the change
    pub admins: Vec<String>,
}

impl<Storage> ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// Add `member_did` to a conversation.
    ///
    /// Fails with `Conflict` when the server reports a block between us and the
    /// new member.
    pub async fn add_member(
        &self,
        convo_id: &str,
        member_did: &str,
        key_package_hint: Option<String>,
    ) -> Result<Member, Error> {
        util::validate_did(member_did)?;
        let (_guard, mut conversation) = self.begin_operation(convo_id).await?;
        self.require_admin(convo_id)?;

        if self.storage.find_member(convo_id, member_did)?.is_some() {
            return Err(ConversationError::InvalidTarget(format!(
                "{member_did} is already a member of {convo_id}"
            ))
            .into());
        }

        let blocks = self
            .check_blocks(&[self.own_did.clone(), member_did.to_string()])
            .await?;
        if let Some(block) = blocks.iter().find(|b| involves(b, member_did)) {
            return Err(ConversationError::Conflict(format!(
                "{} has blocked {}",
                block.blocker_did, block.blocked_did
            ))
            .into());
        }

        let request = AddMemberRequest {
            convo_id: convo_id.to_string(),
            member_did: member_did.to_string(),
            key_package_hint,
            idempotency_key: idempotency_key(),
        };
        let output: AddMemberOutput = call_with_retries(&self.config.remote, "add_member", || {
            self.api.add_member(request.clone())
        })
        .await?;

        self.commit_locally(convo_id, || {
            let member = self.storage.create_member(NewMember::new(
                convo_id,
                member_did,
                output.leaf_index,
            ))?;
            let epoch = self.next_epoch(&conversation, output.epoch);
            self.advance_epoch(&mut conversation, epoch)?;
            tracing::info!(convo_id, member_did, leaf_index = output.leaf_index, "Member added");
            Ok(member)
        })
    }

    /// Remove `member_did` from a conversation
    pub async fn remove_member(
        &self,
        convo_id: &str,
        member_did: &str,
        reason: Option<String>,
    ) -> Result<(), Error> {
        util::validate_did(member_did)?;
        let (_guard, mut conversation) = self.begin_operation(convo_id).await?;
        self.require_admin(convo_id)?;
        self.require_member(convo_id, member_did)?;

        let request = RemoveMemberRequest {
            convo_id: convo_id.to_string(),
            member_did: member_did.to_string(),
            reason,
            idempotency_key: idempotency_key(),
        };
        let output: CommitOutput = call_with_retries(&self.config.remote, "remove_member", || {
            self.api.remove_member(request.clone())
        })
        .await?;

        self.commit_locally(convo_id, || {
            self.storage.mark_member_removed(convo_id, member_did)?;
            let epoch = self.next_epoch(&conversation, output.epoch);
            self.advance_epoch(&mut conversation, epoch)?;
            tracing::info!(convo_id, member_did, "Member removed");
            Ok(())
        })
    }

    /// Grant admin rights to `member_did`
    pub async fn promote_admin(&self, convo_id: &str, member_did: &str) -> Result<Member, Error> {
        self.change_admin(convo_id, member_did, true).await
    }

    /// Revoke admin rights from `member_did`
    pub async fn demote_admin(&self, convo_id: &str, member_did: &str) -> Result<Member, Error> {
        self.change_admin(convo_id, member_did, false).await
    }

    async fn change_admin(
        &self,
        convo_id: &str,
        member_did: &str,
        promote: bool,
    ) -> Result<Member, Error> {
        util::validate_did(member_did)?;
        let (_guard, mut conversation) = self.begin_operation(convo_id).await?;
        self.require_admin(convo_id)?;
        let member = self.require_member(convo_id, member_did)?;

        if member.role.is_admin() == promote {
            tracing::debug!(convo_id, member_did, promote, "Admin state already as requested");
            return Ok(member);
        }

        let (operation, role) = if promote {
            ("promote_admin", MemberRole::Admin)
        } else {
            ("demote_admin", MemberRole::Member)
        };
        let request = AdminChangeRequest {
            convo_id: convo_id.to_string(),
            member_did: member_did.to_string(),
            idempotency_key: idempotency_key(),
        };
        let output: CommitOutput = call_with_retries(&self.config.remote, operation, || {
            if promote {
                self.api.promote_admin(request.clone())
            } else {
                self.api.demote_admin(request.clone())
            }
        })
        .await?;

        let member = self.commit_locally(convo_id, || {
            let member = self.storage.update_member_role(convo_id, member_did, role)?;
            let epoch = self.next_epoch(&conversation, output.epoch);
            self.advance_epoch(&mut conversation, epoch)?;
            tracing::info!(convo_id, member_did, role = %role, "Admin state changed");
            Ok(member)
        })?;

        self.send_roster_update(&conversation).await;
        Ok(member)
    }

    fn require_member(&self, convo_id: &str, member_did: &str) -> Result<Member, Error> {
        self.storage
            .find_member(convo_id, member_did)?
            .ok_or_else(|| {
                ConversationError::NotFound(format!("{member_did} is not a member of {convo_id}"))
                    .into()
            })
    }

    /// Encrypt the admin roster and send it to the group. Best effort.
    async fn send_roster_update(&self, conversation: &Conversation) {
        if let Err(e) = self.try_send_roster_update(conversation).await {
            tracing::warn!(
                convo_id = %conversation.conversation_id,
                error = %e,
                "Failed to send roster update"
            );
        }
    }

    async fn try_send_roster_update(&self, conversation: &Conversation) -> Result<(), Error> {
        let convo_id = &conversation.conversation_id;
        let update = RosterUpdate {
            convo_id: convo_id.clone(),
            epoch: conversation.epoch,
            admins: self.admins(convo_id)?,
        };
        let plaintext = serde_json::to_vec(&update).map_err(|e| Error::Crypto(e.to_string()))?;
        let ciphertext = self
            .crypto
            .encrypt_application_message(&conversation.group_id, &plaintext)?;

        let request = SendMessageRequest {
            convo_id: convo_id.clone(),
            epoch: conversation.epoch,
            ciphertext: ciphertext.clone(),
            idempotency_key: idempotency_key(),
        };
        let output: SendMessageOutput =
            call_with_retries(&self.config.remote, "send_message", || {
                self.api.send_message(request.clone())
            })
            .await?;

        let message = self.storage.create_message(NewMessage {
            message_id: output.message_id,
            conversation_id: convo_id.clone(),
            sender_id: self.own_did.clone(),
            content: ciphertext,
            content_type: ROSTER_UPDATE_CONTENT_TYPE.to_string(),
            epoch: conversation.epoch,
            timestamp: Timestamp::now(),
        })?;
        self.storage.mark_message_delivered(&message.message_id)?;
        Ok(())
    }
}

fn involves(block: &BlockRelationship, did: &str) -> bool {
    block.blocker_did == did || block.blocked_did == did
}
