//! Shared storage test functions, run against every backend

#![allow(dead_code)]

use convo_storage_traits::conversations::types::NewConversation;
use convo_storage_traits::key_packages::types::NewKeyPackage;
use convo_storage_traits::members::types::{MemberRole, NewMember};
use convo_storage_traits::messages::types::NewMessage;
use convo_storage_traits::{GroupId, Timestamp};

pub mod conversation_tests;
pub mod epoch_key_tests;
pub mod key_package_tests;
pub mod member_tests;
pub mod message_tests;

/// Create a conversation input with a group ID derived from the ID
pub fn create_test_conversation(conversation_id: &str) -> NewConversation {
    NewConversation::new(
        conversation_id,
        GroupId::from_slice(format!("group-{conversation_id}").as_bytes()),
        0,
    )
    .title("Test Conversation")
}

pub fn did(name: &str) -> String {
    format!("did:plc:{name}")
}

pub fn create_test_member(conversation_id: &str, name: &str, leaf_index: u32) -> NewMember {
    NewMember::new(conversation_id, did(name), leaf_index)
}

pub fn create_test_admin(conversation_id: &str, name: &str, leaf_index: u32) -> NewMember {
    create_test_member(conversation_id, name, leaf_index).role(MemberRole::Admin)
}

pub fn create_test_message(conversation_id: &str, message_id: &str, timestamp: u64) -> NewMessage {
    NewMessage {
        message_id: message_id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: did("alice"),
        content: vec![0xc1, 0xc2, 0xc3],
        content_type: "text/plain".to_string(),
        epoch: 0,
        timestamp: Timestamp::from_secs(timestamp),
    }
}

pub fn create_test_key_package(seed: u8, expires_at: u64) -> NewKeyPackage {
    NewKeyPackage::new(
        vec![0x4b, 0x50, seed],
        1,
        did("me"),
        Timestamp::from_secs(expires_at),
    )
}
