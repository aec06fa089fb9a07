//! Types for the conversations module

use serde::{Deserialize, Serialize};

use crate::{GroupId, Timestamp};

/// A conversation backed by one MLS group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned conversation ID, the primary key
    pub conversation_id: String,
    /// MLS group ID, unique across conversations
    pub group_id: GroupId,
    /// Current epoch. Only ever increases.
    pub epoch: u64,
    /// Optional human readable title
    pub title: Option<String>,
    /// Number of active members, as last reconciled
    pub member_count: u32,
    /// Whether the conversation is still in use by this client
    pub is_active: bool,
    /// When this client first stored the conversation
    pub created_at: Timestamp,
}

/// Input for creating a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    /// Server-assigned conversation ID
    pub conversation_id: String,
    /// MLS group ID
    pub group_id: GroupId,
    /// Epoch the group is at when we first see it
    pub epoch: u64,
    /// Optional title
    pub title: Option<String>,
}

impl NewConversation {
    /// Create the input for a conversation with no title
    pub fn new<S>(conversation_id: S, group_id: GroupId, epoch: u64) -> Self
    where
        S: Into<String>,
    {
        Self {
            conversation_id: conversation_id.into(),
            group_id,
            epoch,
            title: None,
        }
    }

    /// Set the title
    pub fn title<S>(mut self, title: S) -> Self
    where
        S: Into<String>,
    {
        self.title = Some(title.into());
        self
    }

    /// Materialize the stored row with a creation time
    pub fn into_conversation(self, created_at: Timestamp) -> Conversation {
        Conversation {
            conversation_id: self.conversation_id,
            group_id: self.group_id,
            epoch: self.epoch,
            title: self.title,
            member_count: 0,
            is_active: true,
            created_at,
        }
    }
}
