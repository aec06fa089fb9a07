//! Periodic cleanup of expired key material
//!
//! Every step only touches rows that are already marked or past their validity
//! window, so maintenance can run next to normal operations.

use convo_storage_traits::{ConvoStorageProvider, Timestamp};

use crate::{ConversationManager, Error};

/// What one maintenance run erased
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Marked epoch keys erased
    pub purged_epoch_keys: usize,
    /// Messages older than the retention window
    pub expired_messages: usize,
    /// Messages whose epoch key is gone
    pub undecryptable_messages: usize,
    /// Expired key packages
    pub expired_key_packages: usize,
}

impl<Storage> ConversationManager<Storage>
where
    Storage: ConvoStorageProvider,
{
    /// Run all cleanup sweeps once
    pub fn run_maintenance(&self) -> Result<MaintenanceReport, Error> {
        self.run_maintenance_at(Timestamp::now())
    }

    pub(crate) fn run_maintenance_at(&self, now: Timestamp) -> Result<MaintenanceReport, Error> {
        let mut report = MaintenanceReport {
            purged_epoch_keys: self.storage.delete_marked_epoch_keys()?.len(),
            ..Default::default()
        };

        let threshold = self.config.message_key_cleanup_threshold(now);
        report.expired_messages = self.storage.cleanup_message_keys(threshold)?;

        for conversation in self.storage.all_conversations()? {
            let convo_id = &conversation.conversation_id;
            let oldest_retained = self
                .storage
                .epoch_keys(convo_id, true)?
                .first()
                .map(|key| key.epoch);
            if let Some(min_epoch) = oldest_retained {
                report.undecryptable_messages +=
                    self.storage.delete_messages_before_epoch(convo_id, min_epoch)?;
            }
        }

        report.expired_key_packages = self.storage.delete_expired_key_packages(now)?;

        tracing::info!(
            purged_epoch_keys = report.purged_epoch_keys,
            expired_messages = report.expired_messages,
            undecryptable_messages = report.undecryptable_messages,
            expired_key_packages = report.expired_key_packages,
            "Maintenance finished"
        );
        Ok(report)
    }
}
