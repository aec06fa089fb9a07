//! Types for the messages module

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// A stored group message.
///
/// `content` is the ciphertext as received; decryption happens in the MLS engine
/// with the epoch key of `epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Message ID, unique across conversations
    pub message_id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Did of the sender
    pub sender_id: String,
    /// Opaque ciphertext
    pub content: Vec<u8>,
    /// Content type hint, e.g. `text/plain`
    pub content_type: String,
    /// Epoch the message was encrypted under
    pub epoch: u64,
    /// Strictly increasing per conversation, assigned by storage
    pub sequence_number: u64,
    /// Sender timestamp
    pub timestamp: Timestamp,
    /// Delivered to the server
    pub is_delivered: bool,
    /// Read locally
    pub is_read: bool,
}

/// Input for creating a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Message ID
    pub message_id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Did of the sender
    pub sender_id: String,
    /// Opaque ciphertext
    pub content: Vec<u8>,
    /// Content type hint
    pub content_type: String,
    /// Epoch the message was encrypted under
    pub epoch: u64,
    /// Sender timestamp
    pub timestamp: Timestamp,
}

impl NewMessage {
    /// Materialize the stored row with its sequence number
    pub fn into_message(self, sequence_number: u64) -> Message {
        Message {
            message_id: self.message_id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            content_type: self.content_type,
            epoch: self.epoch,
            sequence_number,
            timestamp: self.timestamp,
            is_delivered: false,
            is_read: false,
        }
    }
}
