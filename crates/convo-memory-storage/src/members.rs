//! Memory-based storage implementation of MemberStorage

use convo_storage_traits::members::types::{Member, MemberRole, NewMember};
use convo_storage_traits::members::{MemberStorage, validate_new_member};
use convo_storage_traits::{StorageError, Timestamp};

use crate::ConvoMemoryStorage;

impl ConvoMemoryStorage {
    /// Apply `f` to the active member with `did`, returning the updated row
    fn update_active_member<F>(
        &self,
        conversation_id: &str,
        did: &str,
        f: F,
    ) -> Result<Member, StorageError>
    where
        F: FnOnce(&mut Member),
    {
        let mut inner = self.inner.write();
        let member = inner
            .members
            .values_mut()
            .find(|m| m.conversation_id == conversation_id && m.did == did && m.is_active)
            .ok_or_else(|| StorageError::not_found("member", did))?;
        f(member);
        Ok(member.clone())
    }
}

impl MemberStorage for ConvoMemoryStorage {
    fn create_member(&self, member: NewMember) -> Result<Member, StorageError> {
        validate_new_member(&member)?;

        let mut inner = self.inner.write();
        inner.ensure_conversation(&member.conversation_id)?;

        let active = inner
            .members
            .values()
            .filter(|m| m.conversation_id == member.conversation_id && m.is_active);
        let mut leaf_taken = false;
        let mut did_taken = false;
        for existing in active {
            leaf_taken |= existing.leaf_index == member.leaf_index;
            did_taken |= existing.did == member.did;
        }

        if leaf_taken {
            return Err(StorageError::LeafIndexInUse {
                conversation_id: member.conversation_id,
                leaf_index: member.leaf_index,
            });
        }
        if did_taken {
            return Err(StorageError::duplicate("member", &member.did));
        }

        // A did rejoining at its old leaf replaces the soft-removed row
        let member = member.into_member();
        inner
            .members
            .insert(member.member_id.clone(), member.clone());
        Ok(member)
    }

    fn find_member(
        &self,
        conversation_id: &str,
        did: &str,
    ) -> Result<Option<Member>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .members
            .values()
            .find(|m| m.conversation_id == conversation_id && m.did == did && m.is_active)
            .cloned())
    }

    fn members(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> Result<Vec<Member>, StorageError> {
        let inner = self.inner.read();
        let mut members: Vec<Member> = inner
            .members
            .values()
            .filter(|m| m.conversation_id == conversation_id && (!active_only || m.is_active))
            .cloned()
            .collect();
        // BTreeMap iteration already orders by member ID
        members.sort_by_key(|m| m.leaf_index);
        Ok(members)
    }

    fn update_member_role(
        &self,
        conversation_id: &str,
        did: &str,
        role: MemberRole,
    ) -> Result<Member, StorageError> {
        self.update_active_member(conversation_id, did, |member| member.role = role)
    }

    fn mark_member_removed(
        &self,
        conversation_id: &str,
        did: &str,
    ) -> Result<Member, StorageError> {
        let now = Timestamp::now();
        self.update_active_member(conversation_id, did, |member| {
            member.is_active = false;
            member.removed_at = Some(now);
        })
    }
}
