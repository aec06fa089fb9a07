//! Key package supply
//!
//! Each join consumes one of our published key packages. The server reports how
//! many remain; below its threshold the manager generates, stores and publishes
//! a fresh batch.

use convo_storage_traits::key_packages::types::NewKeyPackage;
use convo_storage_traits::{ConvoStorageProvider, Timestamp};

use crate::api::{
    KeyPackageStats, PublishKeyPackagesOutput, PublishKeyPackagesRequest, PublishedKeyPackage,
};
use crate::util::{call_with_retries, idempotency_key};
use crate::{ConversationManager, Error};

impl<Storage> ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// Our key package supply as the server sees it
    pub async fn key_package_stats(&self) -> Result<KeyPackageStats, Error> {
        Ok(
            call_with_retries(&self.config.remote, "get_key_package_stats", || {
                self.api.get_key_package_stats(&self.own_did)
            })
            .await?,
        )
    }

    /// Unused, unexpired key packages in local storage
    pub fn local_key_package_count(&self) -> Result<usize, Error> {
        Ok(self
            .storage
            .count_available_key_packages(&self.own_did, Timestamp::now())?)
    }

    /// Whether the local supply of unused key packages is below
    /// `key_package_target`.
    ///
    /// A cheap local signal to run [`Self::replenish_key_packages`], which asks
    /// the server for the authoritative count.
    pub fn local_key_packages_low(&self) -> Result<bool, Error> {
        let available = self.local_key_package_count()?;
        Ok(available < self.config.key_package_target as usize)
    }

    /// Publish fresh key packages when the server supply is low.
    ///
    /// Tops the supply up to `max(key_package_target, threshold)`. Returns the
    /// number of packages published. If publication fails the packages stored
    /// for it are deleted again.
    pub async fn replenish_key_packages(&self) -> Result<usize, Error> {
        let stats = self.key_package_stats().await?;
        if !stats.needs_replenish() {
            tracing::debug!(
                available = stats.available,
                threshold = stats.threshold,
                "Key package supply sufficient"
            );
            return Ok(0);
        }

        let target = self.config.key_package_target.max(stats.threshold);
        let count = target.saturating_sub(stats.available);
        let expires_at = Timestamp::now().add_days(u64::from(self.config.key_package_lifetime_days));

        let mut stored: Vec<String> = Vec::new();
        let batch = self.generate_key_packages(count, expires_at, &mut stored);
        let published = match batch {
            Ok(key_packages) => {
                let request = PublishKeyPackagesRequest {
                    owner_did: self.own_did.clone(),
                    key_packages,
                    idempotency_key: idempotency_key(),
                };
                call_with_retries(&self.config.remote, "publish_key_packages", || {
                    self.api.publish_key_packages(request.clone())
                })
                .await
                .map_err(Error::from)
            }
            Err(e) => Err(e),
        };

        match published {
            Ok(PublishKeyPackagesOutput { published }) => {
                tracing::info!(
                    generated = stored.len(),
                    published,
                    "Replenished key packages"
                );
                Ok(stored.len())
            }
            Err(e) => {
                self.discard_key_packages(&stored);
                Err(e)
            }
        }
    }

    fn generate_key_packages(
        &self,
        count: u32,
        expires_at: Timestamp,
        stored: &mut Vec<String>,
    ) -> Result<Vec<PublishedKeyPackage>, Error> {
        let mut batch = Vec::new();
        for _ in 0..count {
            let generated = self.crypto.generate_key_package(&self.own_did)?;
            let key_package = self.storage.create_key_package(NewKeyPackage::new(
                generated.key_package_data,
                generated.cipher_suite,
                self.own_did.clone(),
                expires_at,
            ))?;
            stored.push(key_package.key_package_id.clone());
            batch.push(PublishedKeyPackage {
                key_package_id: key_package.key_package_id,
                key_package_data: key_package.key_package_data,
                cipher_suite: key_package.cipher_suite,
                expires_at: key_package.expires_at,
            });
        }
        Ok(batch)
    }

    fn discard_key_packages(&self, key_package_ids: &[String]) {
        for key_package_id in key_package_ids {
            if let Err(e) = self.storage.delete_key_package(key_package_id) {
                tracing::warn!(key_package_id, error = %e, "Failed to discard key package");
            }
        }
        if !key_package_ids.is_empty() {
            tracing::warn!(
                discarded = key_package_ids.len(),
                "Discarded unpublished key packages"
            );
        }
    }
}
