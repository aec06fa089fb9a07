//! Types for the members module

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{StorageError, Timestamp};

/// Role of a member inside a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberRole {
    /// Can change membership and moderate
    Admin,
    /// Regular participant
    Member,
    /// Can review reports but not change membership
    Moderator,
}

impl MemberRole {
    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Moderator => "moderator",
        }
    }

    /// Whether this role carries admin rights
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "moderator" => Ok(Self::Moderator),
            _ => Err(StorageError::InvalidParameters(format!(
                "Invalid member role: {}",
                s
            ))),
        }
    }
}

impl Serialize for MemberRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemberRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A participant of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Row ID, unique across all conversations
    pub member_id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Decentralized identifier of the participant. Never changes.
    pub did: String,
    /// Optional handle
    pub handle: Option<String>,
    /// Optional display name
    pub display_name: Option<String>,
    /// Position in the ratchet tree, unique among active members
    pub leaf_index: u32,
    /// Role in the conversation
    pub role: MemberRole,
    /// False once the member was removed
    pub is_active: bool,
    /// When the member was removed
    pub removed_at: Option<Timestamp>,
}

impl Member {
    /// The row ID derived for a `(conversation, did, leaf)` triple
    pub fn derive_id(conversation_id: &str, did: &str, leaf_index: u32) -> String {
        format!("{conversation_id}:{did}:{leaf_index}")
    }
}

/// Input for creating a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    /// Owning conversation
    pub conversation_id: String,
    /// Decentralized identifier
    pub did: String,
    /// Optional handle
    pub handle: Option<String>,
    /// Optional display name
    pub display_name: Option<String>,
    /// Leaf index assigned by the group
    pub leaf_index: u32,
    /// Initial role
    pub role: MemberRole,
}

impl NewMember {
    /// Create a plain member at the given leaf
    pub fn new<C, D>(conversation_id: C, did: D, leaf_index: u32) -> Self
    where
        C: Into<String>,
        D: Into<String>,
    {
        Self {
            conversation_id: conversation_id.into(),
            did: did.into(),
            handle: None,
            display_name: None,
            leaf_index,
            role: MemberRole::Member,
        }
    }

    /// Set the role
    pub fn role(mut self, role: MemberRole) -> Self {
        self.role = role;
        self
    }

    /// Set the handle
    pub fn handle<S>(mut self, handle: S) -> Self
    where
        S: Into<String>,
    {
        self.handle = Some(handle.into());
        self
    }

    /// Set the display name
    pub fn display_name<S>(mut self, display_name: S) -> Self
    where
        S: Into<String>,
    {
        self.display_name = Some(display_name.into());
        self
    }

    /// Materialize the stored row
    pub fn into_member(self) -> Member {
        Member {
            member_id: Member::derive_id(&self.conversation_id, &self.did, self.leaf_index),
            conversation_id: self.conversation_id,
            did: self.did,
            handle: self.handle,
            display_name: self.display_name,
            leaf_index: self.leaf_index,
            role: self.role,
            is_active: true,
            removed_at: None,
        }
    }
}
