//! Test utilities for the convo-core crate
//!
//! A scripted coordination service, a deterministic crypto engine and a fixture
//! that builds a manager over in-memory storage with one seeded conversation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use convo_memory_storage::ConvoMemoryStorage;
use convo_storage_traits::conversations::ConversationStorage;
use convo_storage_traits::epoch_keys::EpochKeyStorage;
use convo_storage_traits::members::MemberStorage;
use convo_storage_traits::members::types::MemberRole;
use convo_storage_traits::{EpochSecret, GroupId, Timestamp, test_utils};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::*;
use crate::crypto::{CryptoError, DecryptionWindow, GeneratedKeyPackage, GroupCrypto};
use crate::{ConversationManager, ConvoConfig};

/// The conversation every fixture starts with
pub const CONVO_ID: &str = "convo-1";

/// Initialize tracing once for all tests
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A test did for a short name
pub fn did(name: &str) -> String {
    test_utils::did(name)
}

/// The did the fixture manager acts as
pub fn own_did() -> String {
    did("me")
}

/// A server-side member for `did:plc:{name}`
pub fn remote_member(name: &str, leaf_index: u32, role: MemberRole) -> RemoteMember {
    RemoteMember {
        did: did(name),
        leaf_index,
        role,
        handle: Some(format!("{name}.test")),
    }
}

/// A scripted response: a status with an untyped payload, or a transport failure
pub type Scripted = Result<ApiResponse<Value>, TransportError>;

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<&'static str, VecDeque<Scripted>>,
    /// `(operation, idempotency key)` per call, in order
    calls: Vec<(&'static str, Option<String>)>,
    delay: Option<Duration>,
    epochs: HashMap<String, u64>,
    added: u32,
    reports: u32,
    remote_conversation: Option<RemoteConversation>,
    sent_messages: Vec<SendMessageRequest>,
    published_key_packages: usize,
}

/// Coordination service double.
///
/// Unscripted calls succeed with a plausible payload: commits advance a
/// per-conversation epoch counter, adds land at leaf `10 + n`.
#[derive(Debug, Default)]
pub struct MockCoordinationApi {
    state: Mutex<MockState>,
}

impl MockCoordinationApi {
    /// Queue a raw response for the next call of `operation`
    pub fn push_response(&self, operation: &'static str, response: Scripted) {
        self.state
            .lock()
            .responses
            .entry(operation)
            .or_default()
            .push_back(response);
    }

    /// Queue a `200` response carrying `body`
    pub fn push_ok<T>(&self, operation: &'static str, body: T)
    where
        T: Serialize,
    {
        let body = serde_json::to_value(body).expect("serializable payload");
        self.push_response(operation, Ok(ApiResponse::ok(body)));
    }

    /// Delay every response
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Set the server epoch of a conversation
    pub fn set_epoch(&self, convo_id: &str, epoch: u64) {
        self.state.lock().epochs.insert(convo_id.to_string(), epoch);
    }

    /// Set what `get_conversation` returns
    pub fn set_remote_conversation(&self, conversation: RemoteConversation) {
        self.state.lock().remote_conversation = Some(conversation);
    }

    /// Number of calls of `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    /// Idempotency keys sent with each call of `operation`
    pub fn idempotency_keys(&self, operation: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| *op == operation)
            .filter_map(|(_, key)| key.clone())
            .collect()
    }

    /// Messages accepted by `send_message`
    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.state.lock().sent_messages.clone()
    }

    /// Key packages accepted by `publish_key_packages`
    pub fn published_key_packages(&self) -> usize {
        self.state.lock().published_key_packages
    }

    fn record(&self, operation: &'static str, idempotency_key: Option<&str>) {
        self.state
            .lock()
            .calls
            .push((operation, idempotency_key.map(str::to_string)));
    }

    fn bump_epoch(&self, convo_id: &str) -> u64 {
        let mut state = self.state.lock();
        let epoch = state.epochs.entry(convo_id.to_string()).or_insert(0);
        *epoch += 1;
        *epoch
    }

    /// Next scripted response for `operation`, or `default` when none is queued
    async fn respond<T, F>(
        &self,
        operation: &'static str,
        default: F,
    ) -> Result<ApiResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> ApiResponse<T>,
    {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .state
            .lock()
            .responses
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match scripted {
            None => Ok(default()),
            Some(Err(e)) => Err(e),
            Some(Ok(response)) => Ok(ApiResponse {
                status: response.status,
                body: response
                    .body
                    .map(|body| serde_json::from_value(body).expect("scripted payload type")),
                message: response.message,
            }),
        }
    }
}

#[async_trait]
impl CoordinationApi for MockCoordinationApi {
    async fn add_member(
        &self,
        request: AddMemberRequest,
    ) -> Result<ApiResponse<AddMemberOutput>, TransportError> {
        self.record("add_member", Some(&request.idempotency_key));
        self.respond("add_member", || {
            let leaf_index = {
                let mut state = self.state.lock();
                state.added += 1;
                10 + state.added
            };
            ApiResponse::ok(AddMemberOutput {
                epoch: self.bump_epoch(&request.convo_id),
                leaf_index,
            })
        })
        .await
    }

    async fn remove_member(
        &self,
        request: RemoveMemberRequest,
    ) -> Result<ApiResponse<CommitOutput>, TransportError> {
        self.record("remove_member", Some(&request.idempotency_key));
        self.respond("remove_member", || {
            ApiResponse::ok(CommitOutput {
                epoch: self.bump_epoch(&request.convo_id),
            })
        })
        .await
    }

    async fn promote_admin(
        &self,
        request: AdminChangeRequest,
    ) -> Result<ApiResponse<CommitOutput>, TransportError> {
        self.record("promote_admin", Some(&request.idempotency_key));
        self.respond("promote_admin", || {
            ApiResponse::ok(CommitOutput {
                epoch: self.bump_epoch(&request.convo_id),
            })
        })
        .await
    }

    async fn demote_admin(
        &self,
        request: AdminChangeRequest,
    ) -> Result<ApiResponse<CommitOutput>, TransportError> {
        self.record("demote_admin", Some(&request.idempotency_key));
        self.respond("demote_admin", || {
            ApiResponse::ok(CommitOutput {
                epoch: self.bump_epoch(&request.convo_id),
            })
        })
        .await
    }

    async fn report_member(
        &self,
        request: ReportMemberRequest,
    ) -> Result<ApiResponse<ReportMemberOutput>, TransportError> {
        self.record("report_member", Some(&request.idempotency_key));
        self.respond("report_member", || {
            let mut state = self.state.lock();
            state.reports += 1;
            ApiResponse::ok(ReportMemberOutput {
                report_id: format!("report-{}", state.reports),
            })
        })
        .await
    }

    async fn get_reports(
        &self,
        _convo_id: &str,
        _status: ReportStatus,
    ) -> Result<ApiResponse<Vec<Report>>, TransportError> {
        self.record("get_reports", None);
        self.respond("get_reports", || ApiResponse::ok(Vec::new()))
            .await
    }

    async fn resolve_report(
        &self,
        request: ResolveReportRequest,
    ) -> Result<ApiResponse<Report>, TransportError> {
        self.record("resolve_report", Some(&request.idempotency_key));
        self.respond("resolve_report", || {
            let now = Timestamp::now();
            ApiResponse::ok(Report {
                report_id: request.report_id.clone(),
                convo_id: request.convo_id.clone(),
                reporter_did: did("bob"),
                target_did: did("carol"),
                reason: "spam".to_string(),
                details: None,
                status: ReportStatus::Resolved,
                action: Some(request.action),
                notes: request.notes.clone(),
                created_at: now.sub_secs(60),
                resolved_at: Some(now),
            })
        })
        .await
    }

    async fn check_blocks(
        &self,
        _dids: &[String],
    ) -> Result<ApiResponse<Vec<BlockRelationship>>, TransportError> {
        self.record("check_blocks", None);
        self.respond("check_blocks", || ApiResponse::ok(Vec::new()))
            .await
    }

    async fn get_key_package_stats(
        &self,
        _owner_did: &str,
    ) -> Result<ApiResponse<KeyPackageStats>, TransportError> {
        self.record("get_key_package_stats", None);
        self.respond("get_key_package_stats", || {
            ApiResponse::ok(KeyPackageStats {
                available: 0,
                threshold: 1,
            })
        })
        .await
    }

    async fn publish_key_packages(
        &self,
        request: PublishKeyPackagesRequest,
    ) -> Result<ApiResponse<PublishKeyPackagesOutput>, TransportError> {
        self.record("publish_key_packages", Some(&request.idempotency_key));
        let response = self
            .respond("publish_key_packages", || {
                ApiResponse::ok(PublishKeyPackagesOutput {
                    published: u32::try_from(request.key_packages.len()).unwrap_or(u32::MAX),
                })
            })
            .await;
        if matches!(&response, Ok(r) if r.is_success()) {
            self.state.lock().published_key_packages += request.key_packages.len();
        }
        response
    }

    async fn get_admin_stats(
        &self,
        _convo_id: &str,
    ) -> Result<ApiResponse<AdminStats>, TransportError> {
        self.record("get_admin_stats", None);
        self.respond("get_admin_stats", || ApiResponse::ok(AdminStats::default()))
            .await
    }

    async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<ApiResponse<SendMessageOutput>, TransportError> {
        self.record("send_message", Some(&request.idempotency_key));
        let response = self
            .respond("send_message", || {
                let n = self.state.lock().sent_messages.len() + 1;
                ApiResponse::ok(SendMessageOutput {
                    message_id: format!("msg-{n}"),
                })
            })
            .await;
        if matches!(&response, Ok(r) if r.is_success()) {
            self.state.lock().sent_messages.push(request);
        }
        response
    }

    async fn get_conversation(
        &self,
        _convo_id: &str,
    ) -> Result<ApiResponse<RemoteConversation>, TransportError> {
        self.record("get_conversation", None);
        let remote = self.state.lock().remote_conversation.clone();
        self.respond("get_conversation", || match remote {
            Some(conversation) => ApiResponse::ok(conversation),
            None => ApiResponse::status(404, "unknown conversation"),
        })
        .await
    }
}

#[derive(Debug, Default)]
struct CryptoState {
    configured: HashSet<GroupId>,
    generated: u32,
    fail_after: Option<u32>,
}

/// Deterministic stand-in for the MLS engine.
///
/// "Encryption" prefixes the plaintext; secrets derive from group and epoch.
#[derive(Debug, Default)]
pub struct FakeGroupCrypto {
    state: Mutex<CryptoState>,
}

impl FakeGroupCrypto {
    const PREFIX: &'static [u8] = b"enc:";

    /// Invert [`GroupCrypto::encrypt_application_message`]
    pub fn decrypt(ciphertext: &[u8]) -> Vec<u8> {
        ciphertext
            .strip_prefix(Self::PREFIX)
            .expect("fake ciphertext")
            .to_vec()
    }

    /// Whether `configure_group` was called for `group_id`
    pub fn is_configured(&self, group_id: &GroupId) -> bool {
        self.state.lock().configured.contains(group_id)
    }

    /// Fail key package generation once `count` packages were generated
    pub fn fail_key_packages_after(&self, count: u32) {
        self.state.lock().fail_after = Some(count);
    }
}

impl GroupCrypto for FakeGroupCrypto {
    fn configure_group(
        &self,
        group_id: &GroupId,
        _window: DecryptionWindow,
    ) -> Result<(), CryptoError> {
        self.state.lock().configured.insert(group_id.clone());
        Ok(())
    }

    fn export_epoch_secret(
        &self,
        group_id: &GroupId,
        epoch: u64,
    ) -> Result<EpochSecret, CryptoError> {
        Ok(EpochSecret::new(
            format!("secret:{group_id}:{epoch}").into_bytes(),
        ))
    }

    fn encrypt_application_message(
        &self,
        _group_id: &GroupId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        Ok([Self::PREFIX, plaintext].concat())
    }

    fn generate_key_package(&self, owner_did: &str) -> Result<GeneratedKeyPackage, CryptoError> {
        let mut state = self.state.lock();
        if state.fail_after.is_some_and(|limit| state.generated >= limit) {
            return Err(CryptoError("key package generation failed".to_string()));
        }
        state.generated += 1;
        Ok(GeneratedKeyPackage {
            key_package_data: format!("kp:{owner_did}:{}", state.generated).into_bytes(),
            cipher_suite: 1,
        })
    }
}

/// A manager with its test doubles
pub struct Fixture {
    /// Manager acting as [`own_did`]
    pub manager: Arc<ConversationManager<ConvoMemoryStorage>>,
    /// Coordination service double
    pub api: Arc<MockCoordinationApi>,
    /// Crypto engine double
    pub crypto: Arc<FakeGroupCrypto>,
}

/// Build a manager whose storage holds [`CONVO_ID`] at epoch 0 with us as admin
/// at leaf 0, bob at leaf 1 and carol at leaf 2.
pub fn create_test_fixture(config: ConvoConfig) -> Fixture {
    let storage = ConvoMemoryStorage::default();
    let mut conversation = storage
        .create_conversation(test_utils::new_conversation(CONVO_ID))
        .unwrap();
    storage
        .create_member(test_utils::new_admin(CONVO_ID, "me", 0))
        .unwrap();
    storage
        .create_member(test_utils::new_member(CONVO_ID, "bob", 1))
        .unwrap();
    storage
        .create_member(test_utils::new_member(CONVO_ID, "carol", 2))
        .unwrap();
    let crypto = Arc::new(FakeGroupCrypto::default());
    let secret = crypto
        .export_epoch_secret(&conversation.group_id, 0)
        .unwrap();
    storage
        .record_epoch_key(CONVO_ID, 0, Some(secret))
        .unwrap();
    conversation.member_count = 3;
    storage.save_conversation(&conversation).unwrap();

    let api = Arc::new(MockCoordinationApi::default());
    let manager = ConversationManager::builder(storage, api.clone(), crypto.clone(), own_did())
        .with_config(config)
        .build()
        .unwrap();

    Fixture {
        manager: Arc::new(manager),
        api,
        crypto,
    }
}
