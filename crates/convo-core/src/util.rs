use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::api::{ApiResponse, TransportError};
use crate::config::RemoteConfig;
use crate::error::ConversationError;

/// Check that `did` is a `did:<method>:<id>` identifier
pub(crate) fn validate_did(did: &str) -> Result<(), ConversationError> {
    let valid = did
        .strip_prefix("did:")
        .and_then(|rest| rest.split_once(':'))
        .is_some_and(|(method, id)| !method.is_empty() && !id.is_empty());
    if valid {
        Ok(())
    } else {
        Err(ConversationError::InvalidTarget(format!(
            "not a did: {did:?}"
        )))
    }
}

/// A fresh idempotency key for one logical operation
pub(crate) fn idempotency_key() -> String {
    Uuid::new_v4().to_string()
}

/// Call the coordination service, retrying timeouts and server errors.
///
/// `request` is invoked once per attempt and must resend the same request,
/// idempotency key included. Each attempt is bounded by the request timeout.
pub(crate) async fn call_with_retries<T, F, Fut>(
    config: &RemoteConfig,
    operation: &'static str,
    mut request: F,
) -> Result<T, ConversationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ApiResponse<T>, TransportError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        tracing::debug!(operation, attempt, "Calling coordination service");

        let outcome = match tokio::time::timeout(config.request_timeout(), request()).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(e)) => Err(ConversationError::from(e)),
            Err(_) => Err(ConversationError::Timeout),
        };

        match outcome {
            Ok(output) => return Ok(output),
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                tracing::warn!(operation, attempt, error = %e, "Remote call failed, retrying");
                tokio::time::sleep(config.backoff(attempt)).await;
            }
            Err(e) => {
                tracing::debug!(operation, attempt, error = %e, "Remote call failed");
                return Err(e);
            }
        }
    }
}

/// One operation lock per conversation
#[derive(Debug, Default)]
pub(crate) struct ConversationLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    /// Take the lock of `convo_id`, waiting for it when `queue` is set and
    /// failing with `Conflict` otherwise
    pub(crate) async fn acquire(
        &self,
        convo_id: &str,
        queue: bool,
    ) -> Result<OwnedMutexGuard<()>, ConversationError> {
        let lock = self
            .locks
            .lock()
            .entry(convo_id.to_string())
            .or_default()
            .clone();

        if queue {
            return Ok(lock.lock_owned().await);
        }
        lock.try_lock_owned().map_err(|_| {
            ConversationError::Conflict(format!(
                "an operation is already in flight for conversation {convo_id}"
            ))
        })
    }

    /// Drop the lock entry of a deleted conversation
    pub(crate) fn forget(&self, convo_id: &str) {
        self.locks.lock().remove(convo_id);
    }
}
