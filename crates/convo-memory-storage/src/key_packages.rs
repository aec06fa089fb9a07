//! Memory-based storage implementation of KeyPackageStorage

use convo_storage_traits::key_packages::types::{KeyPackage, NewKeyPackage};
use convo_storage_traits::key_packages::{KeyPackageStorage, validate_new_key_package};
use convo_storage_traits::{StorageError, Timestamp, validate_stored_integer};

use crate::ConvoMemoryStorage;

impl KeyPackageStorage for ConvoMemoryStorage {
    fn create_key_package(&self, key_package: NewKeyPackage) -> Result<KeyPackage, StorageError> {
        validate_new_key_package(&key_package)?;

        let mut inner = self.inner.write();
        if inner.key_packages.contains_key(&key_package.key_package_id) {
            return Err(StorageError::duplicate(
                "key package",
                &key_package.key_package_id,
            ));
        }

        let key_package = key_package.into_key_package();
        inner
            .key_packages
            .insert(key_package.key_package_id.clone(), key_package.clone());
        Ok(key_package)
    }

    fn find_key_package(&self, key_package_id: &str) -> Result<Option<KeyPackage>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.key_packages.get(key_package_id).cloned())
    }

    fn available_key_packages(
        &self,
        owner_did: &str,
        now: Timestamp,
    ) -> Result<Vec<KeyPackage>, StorageError> {
        validate_stored_integer("now", now.as_secs())?;
        let inner = self.inner.read();
        let mut available: Vec<KeyPackage> = inner
            .key_packages
            .values()
            .filter(|kp| kp.owner_did == owner_did && kp.is_available(now))
            .cloned()
            .collect();
        available.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then_with(|| a.key_package_id.cmp(&b.key_package_id))
        });
        Ok(available)
    }

    fn count_available_key_packages(
        &self,
        owner_did: &str,
        now: Timestamp,
    ) -> Result<usize, StorageError> {
        validate_stored_integer("now", now.as_secs())?;
        let inner = self.inner.read();
        Ok(inner
            .key_packages
            .values()
            .filter(|kp| kp.owner_did == owner_did && kp.is_available(now))
            .count())
    }

    fn mark_key_package_as_used(
        &self,
        key_package_id: &str,
        conversation_id: &str,
    ) -> Result<KeyPackage, StorageError> {
        let now = Timestamp::now();
        let mut inner = self.inner.write();

        if !inner.key_packages.contains_key(key_package_id) {
            return Err(StorageError::not_found("key package", key_package_id));
        }
        inner.ensure_conversation(conversation_id)?;

        let key_package = inner
            .key_packages
            .get_mut(key_package_id)
            .ok_or_else(|| StorageError::not_found("key package", key_package_id))?;
        if !key_package.is_available(now) {
            return Err(StorageError::KeyPackageUnavailable(
                key_package_id.to_string(),
            ));
        }

        key_package.is_used = true;
        key_package.used_at = Some(now);
        key_package.conversation_id = Some(conversation_id.to_string());
        Ok(key_package.clone())
    }

    fn delete_key_package(&self, key_package_id: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.write();
        Ok(inner.key_packages.remove(key_package_id).is_some())
    }

    fn delete_expired_key_packages(&self, now: Timestamp) -> Result<usize, StorageError> {
        validate_stored_integer("now", now.as_secs())?;
        let mut inner = self.inner.write();
        let before = inner.key_packages.len();
        inner.key_packages.retain(|_, kp| kp.expires_at > now);
        Ok(before - inner.key_packages.len())
    }
}
