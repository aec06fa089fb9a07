//! Memory-based storage implementation of EpochKeyStorage

use convo_storage_traits::epoch_keys::EpochKeyStorage;
use convo_storage_traits::epoch_keys::types::{EpochKey, EpochKeyState};
use convo_storage_traits::{EpochSecret, StorageError, Timestamp, validate_stored_integer};

use crate::ConvoMemoryStorage;

impl EpochKeyStorage for ConvoMemoryStorage {
    fn record_epoch_key(
        &self,
        conversation_id: &str,
        epoch: u64,
        secret: Option<EpochSecret>,
    ) -> Result<EpochKey, StorageError> {
        validate_stored_integer("epoch", epoch)?;
        let mut inner = self.inner.write();
        inner.ensure_conversation(conversation_id)?;

        let key = (conversation_id.to_string(), epoch);
        if inner.epoch_keys.contains_key(&key) {
            return Err(StorageError::duplicate(
                "epoch key",
                format!("{conversation_id}@{epoch}"),
            ));
        }

        let epoch_key = EpochKey {
            conversation_id: conversation_id.to_string(),
            epoch,
            secret,
            state: EpochKeyState::Active,
            created_at: Timestamp::now(),
            deleted_at: None,
        };
        inner.epoch_keys.insert(key, epoch_key.clone());
        Ok(epoch_key)
    }

    fn epoch_keys(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> Result<Vec<EpochKey>, StorageError> {
        let inner = self.inner.read();
        // BTreeMap order is (conversation, epoch) ascending
        Ok(inner
            .epoch_keys
            .values()
            .filter(|k| k.conversation_id == conversation_id && (!active_only || k.is_active()))
            .cloned()
            .collect())
    }

    fn epoch_secret(
        &self,
        conversation_id: &str,
        epoch: u64,
    ) -> Result<Option<EpochSecret>, StorageError> {
        validate_stored_integer("epoch", epoch)?;
        let inner = self.inner.read();
        Ok(inner
            .epoch_keys
            .get(&(conversation_id.to_string(), epoch))
            .filter(|k| k.is_active())
            .and_then(|k| k.secret.clone()))
    }

    fn delete_old_epoch_keys(
        &self,
        conversation_id: &str,
        keep_last: usize,
    ) -> Result<usize, StorageError> {
        let now = Timestamp::now();
        let mut inner = self.inner.write();
        inner.ensure_conversation(conversation_id)?;

        let mut marked = 0;
        // Highest epoch first; the first `keep_last` active keys survive
        let active = inner
            .epoch_keys
            .values_mut()
            .rev()
            .filter(|k| k.conversation_id == conversation_id && k.is_active());
        for key in active.skip(keep_last) {
            key.state = EpochKeyState::Marked;
            key.deleted_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }

    fn delete_marked_epoch_keys(&self) -> Result<Vec<EpochKey>, StorageError> {
        let mut inner = self.inner.write();

        let mut purged: Vec<EpochKey> = Vec::new();
        inner.epoch_keys.retain(|_, key| {
            if key.state != EpochKeyState::Marked {
                return true;
            }
            // Dropping the secret zeroizes it
            purged.push(EpochKey {
                conversation_id: key.conversation_id.clone(),
                epoch: key.epoch,
                secret: None,
                state: EpochKeyState::Purged,
                created_at: key.created_at,
                deleted_at: key.deleted_at,
            });
            false
        });
        Ok(purged)
    }
}
