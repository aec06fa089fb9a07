//! Database utilities for SQLite storage.

use std::io::{Error as IoError, ErrorKind};
use std::str::FromStr;

use convo_storage_traits::conversations::types::Conversation;
use convo_storage_traits::epoch_keys::types::{EpochKey, EpochKeyState};
use convo_storage_traits::key_packages::types::KeyPackage;
use convo_storage_traits::members::types::{Member, MemberRole};
use convo_storage_traits::messages::types::Message;
use convo_storage_traits::{EpochSecret, GroupId, MAX_STORED_INTEGER, StorageError, Timestamp};
use rusqlite::types::Type;
use rusqlite::{Error, Result as SqliteResult, Row};

#[inline]
fn map_invalid_text_data(msg: &str) -> Error {
    Error::FromSqlConversionFailure(
        0,
        Type::Text,
        Box::new(IoError::new(ErrorKind::InvalidData, msg)),
    )
}

#[inline]
fn map_invalid_integer(column: &str) -> Error {
    Error::FromSqlConversionFailure(
        0,
        Type::Integer,
        Box::new(IoError::new(
            ErrorKind::InvalidData,
            format!("negative value in column {column}"),
        )),
    )
}

/// Read a non-negative INTEGER column as `u64`
fn get_u64(row: &Row, column: &str) -> SqliteResult<u64> {
    let value: i64 = row.get(column)?;
    u64::try_from(value).map_err(|_| map_invalid_integer(column))
}

fn get_u32(row: &Row, column: &str) -> SqliteResult<u32> {
    let value: i64 = row.get(column)?;
    u32::try_from(value).map_err(|_| map_invalid_integer(column))
}

fn get_timestamp(row: &Row, column: &str) -> SqliteResult<Timestamp> {
    get_u64(row, column).map(Timestamp::from_secs)
}

fn get_optional_timestamp(row: &Row, column: &str) -> SqliteResult<Option<Timestamp>> {
    let value: Option<i64> = row.get(column)?;
    value
        .map(|v| {
            u64::try_from(v)
                .map(Timestamp::from_secs)
                .map_err(|_| map_invalid_integer(column))
        })
        .transpose()
}

/// Store a `u64` in an INTEGER column. Values above `i64::MAX` are rejected.
#[inline]
pub fn to_sql_u64(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| {
        StorageError::InvalidParameters(format!(
            "{value} exceeds the storable maximum of {MAX_STORED_INTEGER}"
        ))
    })
}

/// Convert a row to a Conversation struct
pub fn row_to_conversation(row: &Row) -> SqliteResult<Conversation> {
    Ok(Conversation {
        conversation_id: row.get("conversation_id")?,
        group_id: GroupId::from_slice(row.get_ref("group_id")?.as_blob()?),
        epoch: get_u64(row, "epoch")?,
        title: row.get("title")?,
        member_count: get_u32(row, "member_count")?,
        is_active: row.get("is_active")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

/// Convert a row to a Member struct
pub fn row_to_member(row: &Row) -> SqliteResult<Member> {
    let role: String = row.get("role")?;
    let role = MemberRole::from_str(&role).map_err(|_| map_invalid_text_data("Invalid role"))?;

    Ok(Member {
        member_id: row.get("member_id")?,
        conversation_id: row.get("conversation_id")?,
        did: row.get("did")?,
        handle: row.get("handle")?,
        display_name: row.get("display_name")?,
        leaf_index: get_u32(row, "leaf_index")?,
        role,
        is_active: row.get("is_active")?,
        removed_at: get_optional_timestamp(row, "removed_at")?,
    })
}

/// Convert a row to a Message struct
pub fn row_to_message(row: &Row) -> SqliteResult<Message> {
    Ok(Message {
        message_id: row.get("message_id")?,
        conversation_id: row.get("conversation_id")?,
        sender_id: row.get("sender_id")?,
        content: row.get("content")?,
        content_type: row.get("content_type")?,
        epoch: get_u64(row, "epoch")?,
        sequence_number: get_u64(row, "sequence_number")?,
        timestamp: get_timestamp(row, "timestamp")?,
        is_delivered: row.get("is_delivered")?,
        is_read: row.get("is_read")?,
    })
}

/// Convert a row to an EpochKey struct
pub fn row_to_epoch_key(row: &Row) -> SqliteResult<EpochKey> {
    let state: String = row.get("state")?;
    let state = EpochKeyState::from_str(&state)
        .map_err(|_| map_invalid_text_data("Invalid epoch key state"))?;
    let secret: Option<Vec<u8>> = row.get("secret")?;

    Ok(EpochKey {
        conversation_id: row.get("conversation_id")?,
        epoch: get_u64(row, "epoch")?,
        secret: secret.map(EpochSecret::new),
        state,
        created_at: get_timestamp(row, "created_at")?,
        deleted_at: get_optional_timestamp(row, "deleted_at")?,
    })
}

/// Convert a row to a KeyPackage struct
pub fn row_to_key_package(row: &Row) -> SqliteResult<KeyPackage> {
    let cipher_suite: i64 = row.get("cipher_suite")?;
    let cipher_suite = u16::try_from(cipher_suite).map_err(|_| map_invalid_integer("cipher_suite"))?;

    Ok(KeyPackage {
        key_package_id: row.get("key_package_id")?,
        key_package_data: row.get("key_package_data")?,
        cipher_suite,
        owner_did: row.get("owner_did")?,
        is_used: row.get("is_used")?,
        used_at: get_optional_timestamp(row, "used_at")?,
        conversation_id: row.get("conversation_id")?,
        expires_at: get_timestamp(row, "expires_at")?,
    })
}
