//! Members module
//!
//! Members are soft-removed: the row stays for history with `is_active = false`
//! and a `removed_at` time, and its leaf index becomes free for a later join.

use crate::StorageError;

pub mod types;

use self::types::{Member, MemberRole, NewMember};

/// Storage traits for the members module
pub trait MemberStorage {
    /// Create a member.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnknownConversation`] if the conversation does not exist
    /// - [`StorageError::LeafIndexInUse`] if an active member already holds the leaf
    /// - [`StorageError::DuplicateId`] if the did is already an active member
    fn create_member(&self, member: NewMember) -> Result<Member, StorageError>;

    /// Find the active member with the given did
    fn find_member(&self, conversation_id: &str, did: &str)
    -> Result<Option<Member>, StorageError>;

    /// Members of a conversation ordered by leaf index. With `active_only`,
    /// soft-removed members are left out.
    fn members(&self, conversation_id: &str, active_only: bool)
    -> Result<Vec<Member>, StorageError>;

    /// Change the role of an active member
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no active member has this did.
    fn update_member_role(
        &self,
        conversation_id: &str,
        did: &str,
        role: MemberRole,
    ) -> Result<Member, StorageError>;

    /// Soft-remove an active member
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no active member has this did.
    fn mark_member_removed(&self, conversation_id: &str, did: &str)
    -> Result<Member, StorageError>;
}

/// Validate the did and optional profile strings of a new member
pub fn validate_new_member(member: &NewMember) -> Result<(), StorageError> {
    if !member.did.starts_with("did:") || member.did.len() <= "did:".len() {
        return Err(StorageError::InvalidParameters(format!(
            "Invalid did: {}",
            member.did
        )));
    }
    Ok(())
}
