//! Types for the epoch keys module

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{EpochSecret, StorageError, Timestamp};

/// Lifecycle of an epoch key
///
/// `Active -> Marked -> Purged`. The transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EpochKeyState {
    /// Retained; the secret can still decrypt late messages
    Active,
    /// Outside the retention window, waiting for the sweep
    Marked,
    /// Irrecoverably erased. Only ever seen in sweep results.
    Purged,
}

impl EpochKeyState {
    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Marked => "marked",
            Self::Purged => "purged",
        }
    }
}

impl fmt::Display for EpochKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EpochKeyState {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "marked" => Ok(Self::Marked),
            "purged" => Ok(Self::Purged),
            _ => Err(StorageError::InvalidParameters(format!(
                "Invalid epoch key state: {}",
                s
            ))),
        }
    }
}

impl Serialize for EpochKeyState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EpochKeyState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Key material of one epoch of one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochKey {
    /// Owning conversation
    pub conversation_id: String,
    /// The epoch; one key per epoch per conversation
    pub epoch: u64,
    /// Exported epoch secret. `None` once purged.
    pub secret: Option<EpochSecret>,
    /// Lifecycle state
    pub state: EpochKeyState,
    /// When the key was recorded
    pub created_at: Timestamp,
    /// When the key was marked for deletion
    pub deleted_at: Option<Timestamp>,
}

impl EpochKey {
    /// Whether the key is still retained
    pub fn is_active(&self) -> bool {
        self.state == EpochKeyState::Active
    }
}
