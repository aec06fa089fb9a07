//! Coordination service boundary
//!
//! The [`CoordinationApi`] trait is the request/response surface of the remote
//! service that owns group membership and moderation. The manager only ever talks
//! to it through this trait, so an HTTP client and a scripted test double are
//! interchangeable.
//!
//! Every mutating request carries an idempotency key. The manager generates one
//! per logical operation and reuses it for all retries of that operation.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use convo_storage_traits::Timestamp;
use convo_storage_traits::members::types::MemberRole;
use serde::{Deserialize, Serialize};

use crate::error::ConversationError;

/// Failure below the protocol level: the request got no HTTP-style answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport gave up waiting
    #[error("transport timeout")]
    Timeout,
    /// Connection could not be established or broke
    #[error("connection error: {0}")]
    Connection(String),
}

/// Status code plus typed payload of one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// HTTP-style status code
    pub status: u16,
    /// Payload, present on success
    pub body: Option<T>,
    /// Error description, if any
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// A `200` response with a payload
    pub fn ok(body: T) -> Self {
        Self {
            status: 200,
            body: Some(body),
            message: None,
        }
    }

    /// A response without payload
    pub fn status<S>(status: u16, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            status,
            body: None,
            message: Some(message.into()),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Payload of a successful response, or the typed error
    pub fn into_result(self) -> Result<T, ConversationError> {
        if !self.is_success() {
            return Err(ConversationError::from_status(
                self.status,
                self.message.unwrap_or_default(),
            ));
        }
        self.body.ok_or_else(|| {
            ConversationError::ServerError(format!("status {} without payload", self.status))
        })
    }
}

/// Request to add a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberRequest {
    /// Conversation
    pub convo_id: String,
    /// Did to add
    pub member_did: String,
    /// Key package the server should prefer, if the caller knows one
    pub key_package_hint: Option<String>,
    /// Idempotency key
    pub idempotency_key: String,
}

/// Outcome of an add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberOutput {
    /// Epoch after the commit
    pub epoch: u64,
    /// Leaf the new member occupies
    pub leaf_index: u32,
}

/// Request to remove a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMemberRequest {
    /// Conversation
    pub convo_id: String,
    /// Did to remove
    pub member_did: String,
    /// Reason shown to the group
    pub reason: Option<String>,
    /// Idempotency key
    pub idempotency_key: String,
}

/// Request to promote or demote a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminChangeRequest {
    /// Conversation
    pub convo_id: String,
    /// Target did
    pub member_did: String,
    /// Idempotency key
    pub idempotency_key: String,
}

/// Outcome of a membership-changing commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutput {
    /// Epoch after the commit
    pub epoch: u64,
}

/// Request to report a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMemberRequest {
    /// Conversation
    pub convo_id: String,
    /// Reported did
    pub member_did: String,
    /// Report category
    pub reason: String,
    /// Free-form details
    pub details: Option<String>,
    /// Idempotency key
    pub idempotency_key: String,
}

/// Outcome of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMemberOutput {
    /// Server-assigned report ID
    pub report_id: String,
}

/// Review state of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Waiting for an admin
    Pending,
    /// Resolved; terminal
    Resolved,
}

/// What an admin did about a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    /// No action
    Dismiss,
    /// Warn the reported member
    Warn,
    /// Remove the reported member
    RemoveMember,
}

/// A moderation report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report ID
    pub report_id: String,
    /// Conversation
    pub convo_id: String,
    /// Who filed it
    pub reporter_did: String,
    /// Who it is about
    pub target_did: String,
    /// Category
    pub reason: String,
    /// Free-form details
    pub details: Option<String>,
    /// Review state
    pub status: ReportStatus,
    /// Resolution, once resolved
    pub action: Option<ReportAction>,
    /// Admin notes, once resolved
    pub notes: Option<String>,
    /// Filing time
    pub created_at: Timestamp,
    /// Resolution time
    pub resolved_at: Option<Timestamp>,
}

/// Request to resolve a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReportRequest {
    /// Conversation the report belongs to
    pub convo_id: String,
    /// Report ID
    pub report_id: String,
    /// Resolution
    pub action: ReportAction,
    /// Admin notes
    pub notes: Option<String>,
    /// Idempotency key
    pub idempotency_key: String,
}

/// A block between two identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRelationship {
    /// Did that blocked
    pub blocker_did: String,
    /// Did that was blocked
    pub blocked_did: String,
}

/// Key package supply of one owner on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPackageStats {
    /// Unconsumed packages on the server
    pub available: u32,
    /// Replenish below this many
    pub threshold: u32,
}

impl KeyPackageStats {
    /// Whether fresh key packages should be published
    pub fn needs_replenish(&self) -> bool {
        self.available < self.threshold
    }
}

/// One key package to publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKeyPackage {
    /// Key package ID
    pub key_package_id: String,
    /// Serialized key package
    pub key_package_data: Vec<u8>,
    /// MLS cipher suite identifier
    pub cipher_suite: u16,
    /// Expiry
    pub expires_at: Timestamp,
}

/// Request to publish key packages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishKeyPackagesRequest {
    /// Owner did
    pub owner_did: String,
    /// Packages to publish
    pub key_packages: Vec<PublishedKeyPackage>,
    /// Idempotency key
    pub idempotency_key: String,
}

/// Outcome of a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishKeyPackagesOutput {
    /// Packages the server accepted
    pub published: u32,
}

/// Moderation counters of a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    /// Reports ever filed
    pub total_reports: u32,
    /// Reports waiting for review
    pub pending_reports: u32,
    /// Reports resolved
    pub resolved_reports: u32,
    /// Report count per category
    pub reports_by_reason: BTreeMap<String, u32>,
    /// Mean time from filing to resolution
    pub average_resolution_secs: Option<u64>,
    /// Members removed through moderation
    pub removed_members: u32,
}

/// Request to deliver an encrypted application message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Conversation
    pub convo_id: String,
    /// Epoch the ciphertext was produced under
    pub epoch: u64,
    /// Ciphertext
    pub ciphertext: Vec<u8>,
    /// Idempotency key
    pub idempotency_key: String,
}

/// Outcome of a send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageOutput {
    /// Server-assigned message ID
    pub message_id: String,
}

/// A member as the server sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMember {
    /// Did
    pub did: String,
    /// Leaf index
    pub leaf_index: u32,
    /// Role
    pub role: MemberRole,
    /// Handle
    pub handle: Option<String>,
}

/// The server view of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConversation {
    /// Conversation
    pub convo_id: String,
    /// Current epoch
    pub epoch: u64,
    /// Active members
    pub members: Vec<RemoteMember>,
}

/// Remote coordination service
#[async_trait]
pub trait CoordinationApi: Send + Sync + fmt::Debug {
    /// Add a member; the server commits and assigns the leaf
    async fn add_member(
        &self,
        request: AddMemberRequest,
    ) -> Result<ApiResponse<AddMemberOutput>, TransportError>;

    /// Remove a member
    async fn remove_member(
        &self,
        request: RemoveMemberRequest,
    ) -> Result<ApiResponse<CommitOutput>, TransportError>;

    /// Grant admin rights
    async fn promote_admin(
        &self,
        request: AdminChangeRequest,
    ) -> Result<ApiResponse<CommitOutput>, TransportError>;

    /// Revoke admin rights
    async fn demote_admin(
        &self,
        request: AdminChangeRequest,
    ) -> Result<ApiResponse<CommitOutput>, TransportError>;

    /// File a moderation report
    async fn report_member(
        &self,
        request: ReportMemberRequest,
    ) -> Result<ApiResponse<ReportMemberOutput>, TransportError>;

    /// List reports of a conversation in the given state
    async fn get_reports(
        &self,
        convo_id: &str,
        status: ReportStatus,
    ) -> Result<ApiResponse<Vec<Report>>, TransportError>;

    /// Resolve a report
    async fn resolve_report(
        &self,
        request: ResolveReportRequest,
    ) -> Result<ApiResponse<Report>, TransportError>;

    /// Block relationships among the given identities
    async fn check_blocks(
        &self,
        dids: &[String],
    ) -> Result<ApiResponse<Vec<BlockRelationship>>, TransportError>;

    /// Key package supply of `owner_did`
    async fn get_key_package_stats(
        &self,
        owner_did: &str,
    ) -> Result<ApiResponse<KeyPackageStats>, TransportError>;

    /// Publish fresh key packages
    async fn publish_key_packages(
        &self,
        request: PublishKeyPackagesRequest,
    ) -> Result<ApiResponse<PublishKeyPackagesOutput>, TransportError>;

    /// Moderation counters of a conversation
    async fn get_admin_stats(
        &self,
        convo_id: &str,
    ) -> Result<ApiResponse<AdminStats>, TransportError>;

    /// Deliver an encrypted application message
    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<ApiResponse<SendMessageOutput>, TransportError>;

    /// The server view of a conversation
    async fn get_conversation(
        &self,
        convo_id: &str,
    ) -> Result<ApiResponse<RemoteConversation>, TransportError>;
}
