//! Builders shared by storage and manager tests

use crate::conversations::types::NewConversation;
use crate::key_packages::types::NewKeyPackage;
use crate::members::types::{MemberRole, NewMember};
use crate::messages::types::NewMessage;
use crate::{GroupId, Timestamp};

/// A conversation input whose group ID is derived from the conversation ID
pub fn new_conversation(conversation_id: &str) -> NewConversation {
    let group_id = GroupId::from_slice(format!("group-{conversation_id}").as_bytes());
    NewConversation::new(conversation_id, group_id, 0)
        .title(format!("Conversation {conversation_id}"))
}

/// A test did for a short name
pub fn did(name: &str) -> String {
    format!("did:plc:{name}")
}

/// A member input for `did:plc:{name}`
pub fn new_member(conversation_id: &str, name: &str, leaf_index: u32) -> NewMember {
    NewMember::new(conversation_id, did(name), leaf_index).handle(format!("{name}.test"))
}

/// An admin input for `did:plc:{name}`
pub fn new_admin(conversation_id: &str, name: &str, leaf_index: u32) -> NewMember {
    new_member(conversation_id, name, leaf_index).role(MemberRole::Admin)
}

/// A message input with a fixed timestamp
pub fn new_message(
    conversation_id: &str,
    message_id: &str,
    epoch: u64,
    timestamp: Timestamp,
) -> NewMessage {
    NewMessage {
        message_id: message_id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: did("alice"),
        content: format!("ciphertext-{message_id}").into_bytes(),
        content_type: "text/plain".to_string(),
        epoch,
        timestamp,
    }
}

/// A key package input with unique bytes per `seed`
pub fn new_key_package(owner: &str, seed: u8, expires_at: Timestamp) -> NewKeyPackage {
    NewKeyPackage::new(vec![0x4b, 0x50, seed], 1, did(owner), expires_at)
}
