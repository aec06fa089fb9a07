//! Implementation of MemberStorage trait for SQLite storage.

use convo_storage_traits::members::types::{Member, MemberRole, NewMember};
use convo_storage_traits::members::{MemberStorage, validate_new_member};
use convo_storage_traits::{StorageError, Timestamp};
use rusqlite::{Connection, OptionalExtension, params};

use crate::conversations::ensure_conversation;
use crate::db::{self, to_sql_u64};
use crate::{ConvoSqliteStorage, into_storage_err};

fn find_active_member(
    conn: &Connection,
    conversation_id: &str,
    did: &str,
) -> Result<Option<Member>, StorageError> {
    conn.prepare("SELECT * FROM members WHERE conversation_id = ? AND did = ? AND is_active = 1")
        .map_err(into_storage_err)?
        .query_row(params![conversation_id, did], db::row_to_member)
        .optional()
        .map_err(into_storage_err)
}

impl MemberStorage for ConvoSqliteStorage {
    fn create_member(&self, member: NewMember) -> Result<Member, StorageError> {
        validate_new_member(&member)?;

        self.with_savepoint("convo_create_member", |conn| {
            ensure_conversation(conn, &member.conversation_id)?;

            let leaf_taken = conn
                .query_row(
                    "SELECT 1 FROM members
                     WHERE conversation_id = ? AND leaf_index = ? AND is_active = 1",
                    params![&member.conversation_id, member.leaf_index],
                    |_| Ok(()),
                )
                .optional()
                .map_err(into_storage_err)?
                .is_some();
            if leaf_taken {
                return Err(StorageError::LeafIndexInUse {
                    conversation_id: member.conversation_id.clone(),
                    leaf_index: member.leaf_index,
                });
            }

            if find_active_member(conn, &member.conversation_id, &member.did)?.is_some() {
                return Err(StorageError::duplicate("member", &member.did));
            }

            let member = member.into_member();

            // A did rejoining at its old leaf reuses the soft-removed row
            conn.execute(
                "INSERT INTO members
                 (member_id, conversation_id, did, handle, display_name, leaf_index, role,
                  is_active, removed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 1, NULL)
                 ON CONFLICT(member_id) DO UPDATE SET
                    handle = excluded.handle,
                    display_name = excluded.display_name,
                    role = excluded.role,
                    is_active = 1,
                    removed_at = NULL",
                params![
                    &member.member_id,
                    &member.conversation_id,
                    &member.did,
                    &member.handle,
                    &member.display_name,
                    member.leaf_index,
                    member.role.as_str(),
                ],
            )
            .map_err(into_storage_err)?;

            Ok(member)
        })
    }

    fn find_member(
        &self,
        conversation_id: &str,
        did: &str,
    ) -> Result<Option<Member>, StorageError> {
        self.with_connection(|conn| find_active_member(conn, conversation_id, did))
    }

    fn members(
        &self,
        conversation_id: &str,
        active_only: bool,
    ) -> Result<Vec<Member>, StorageError> {
        self.with_connection(|conn| {
            let query = if active_only {
                "SELECT * FROM members WHERE conversation_id = ? AND is_active = 1 \
                 ORDER BY leaf_index ASC, member_id ASC"
            } else {
                "SELECT * FROM members WHERE conversation_id = ? \
                 ORDER BY leaf_index ASC, member_id ASC"
            };

            let mut stmt = conn.prepare(query).map_err(into_storage_err)?;
            let rows = stmt
                .query_map(params![conversation_id], db::row_to_member)
                .map_err(into_storage_err)?;

            let mut members: Vec<Member> = Vec::new();
            for row in rows {
                members.push(row.map_err(into_storage_err)?);
            }
            Ok(members)
        })
    }

    fn update_member_role(
        &self,
        conversation_id: &str,
        did: &str,
        role: MemberRole,
    ) -> Result<Member, StorageError> {
        self.with_savepoint("convo_update_member_role", |conn| {
            let mut member = find_active_member(conn, conversation_id, did)?
                .ok_or_else(|| StorageError::not_found("member", did))?;

            conn.execute(
                "UPDATE members SET role = ? WHERE member_id = ?",
                params![role.as_str(), &member.member_id],
            )
            .map_err(into_storage_err)?;

            member.role = role;
            Ok(member)
        })
    }

    fn mark_member_removed(
        &self,
        conversation_id: &str,
        did: &str,
    ) -> Result<Member, StorageError> {
        let now = Timestamp::now();

        self.with_savepoint("convo_mark_member_removed", |conn| {
            let mut member = find_active_member(conn, conversation_id, did)?
                .ok_or_else(|| StorageError::not_found("member", did))?;

            conn.execute(
                "UPDATE members SET is_active = 0, removed_at = ? WHERE member_id = ?",
                params![to_sql_u64(now.as_secs())?, &member.member_id],
            )
            .map_err(into_storage_err)?;

            member.is_active = false;
            member.removed_at = Some(now);
            Ok(member)
        })
    }
}
