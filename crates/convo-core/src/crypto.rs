//! MLS engine boundary
//!
//! The manager never touches ratchet trees or HPKE itself. It asks a
//! [`GroupCrypto`] implementation for the exported secret of each new epoch, for
//! application message ciphertexts and for fresh key packages.

use std::fmt;

use convo_storage_traits::{EpochSecret, GroupId};

/// Failure reported by the crypto engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CryptoError(pub String);

/// Per-group decryption window settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionWindow {
    /// Past message secrets kept per sender
    pub out_of_order_tolerance: u32,
    /// Messages a sender ratchet may skip
    pub maximum_forward_distance: u32,
}

/// A freshly generated key package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeyPackage {
    /// Serialized key package
    pub key_package_data: Vec<u8>,
    /// MLS cipher suite identifier
    pub cipher_suite: u16,
}

/// MLS engine operations the manager depends on
pub trait GroupCrypto: Send + Sync + fmt::Debug {
    /// Apply decryption window settings to a group the client now takes part in
    fn configure_group(&self, group_id: &GroupId, window: DecryptionWindow)
    -> Result<(), CryptoError>;

    /// Exported secret of `epoch`, retained to decrypt late messages
    fn export_epoch_secret(&self, group_id: &GroupId, epoch: u64)
    -> Result<EpochSecret, CryptoError>;

    /// Encrypt an application message for the group's current epoch
    fn encrypt_application_message(
        &self,
        group_id: &GroupId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Generate a key package for `owner_did`
    fn generate_key_package(&self, owner_did: &str) -> Result<GeneratedKeyPackage, CryptoError>;
}
