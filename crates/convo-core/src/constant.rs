//! Constants

/// Name of the default preset
pub const PRESET_DEFAULT: &str = "default";

/// Name of the maximum forward secrecy preset
pub const PRESET_MAX_FORWARD_SECRECY: &str = "maxForwardSecrecy";

/// Upper bound accepted for `max_past_epochs`
pub const MAX_PAST_EPOCHS_LIMIT: u32 = 1000;

/// Upper bound accepted for `message_key_retention_days`
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Content type of the encrypted admin roster notification
pub const ROSTER_UPDATE_CONTENT_TYPE: &str = "application/x-convo-roster-update";

/// Leaf index the creator of a conversation occupies
pub(crate) const CREATOR_LEAF_INDEX: u32 = 0;
