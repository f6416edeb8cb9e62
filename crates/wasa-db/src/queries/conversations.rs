use anyhow::Result;
use rusqlite::{Connection, Row};

use wasa_types::models::ConversationKind;

use super::users::user_from_row;
use super::{OptionalExt, enum_column, next_seq, optional_enum_column};
use crate::Database;
use crate::models::{ConversationRow, ConversationSummaryRow, UserRow};

const CONVERSATION_COLUMNS: &str = "id, kind, name, photo_url, created_by, created_at";

/// Key identifying the direct conversation between two users regardless of
/// argument order. A user paired with themself yields the self-conversation key.
pub fn direct_key(a: &str, b: &str) -> String {
    if a <= b { format!("{}:{}", a, b) } else { format!("{}:{}", b, a) }
}

impl Database {
    // -- Conversations --

    /// Return the direct conversation between `user_a` and `user_b`, creating
    /// it (with id `id`) if it does not exist yet. The bool is `true` when the
    /// conversation was created by this call.
    pub fn find_or_create_direct(
        &self,
        id: &str,
        user_a: &str,
        user_b: &str,
        now: &str,
    ) -> Result<(ConversationRow, bool)> {
        let key = direct_key(user_a, user_b);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_conversation_by_key(&tx, &key)? {
                return Ok((existing, false));
            }

            tx.execute(
                "INSERT INTO conversations (id, kind, direct_key, created_at) VALUES (?1, 'direct', ?2, ?3)",
                (id, &key, now),
            )?;
            let seq = next_seq(&tx)?;
            for user in [user_a, user_b] {
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at, joined_seq)
                     VALUES (?1, ?2, ?3, ?4)",
                    (id, user, now, seq),
                )?;
            }

            let created = query_conversation(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("conversation {} vanished after insert", id))?;
            tx.commit()?;
            Ok((created, true))
        })
    }

    /// Create a group with the creator and `members` as participants.
    /// Duplicate member ids are ignored.
    pub fn create_group(
        &self,
        id: &str,
        name: &str,
        creator_id: &str,
        members: &[String],
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, kind, name, created_by, created_at) VALUES (?1, 'group', ?2, ?3, ?4)",
                (id, name, creator_id, now),
            )?;
            let seq = next_seq(&tx)?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at, joined_seq)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                stmt.execute((id, creator_id, now, seq))?;
                for member in members {
                    stmt.execute((id, member, now, seq))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    pub fn update_conversation_name(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE conversations SET name = ?2 WHERE id = ?1", (id, name))?;
            Ok(())
        })
    }

    pub fn update_conversation_photo(&self, id: &str, photo_url: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE conversations SET photo_url = ?2 WHERE id = ?1", (id, photo_url))?;
            Ok(())
        })
    }

    // -- Participants --

    /// Returns `false` if the user was already a participant.
    pub fn add_participant(&self, conversation_id: &str, user_id: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let seq = next_seq(&tx)?;
            let changed = tx.execute(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at, joined_seq)
                 VALUES (?1, ?2, ?3, ?4)",
                (conversation_id, user_id, now, seq),
            )?;
            tx.commit()?;
            Ok(changed > 0)
        })
    }

    /// Returns `false` if the user was not a participant.
    pub fn remove_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                (conversation_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                (conversation_id, user_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Participants in join order.
    pub fn get_participants(&self, conversation_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.photo_url, u.created_at
                 FROM users u
                 JOIN conversation_participants cp ON cp.user_id = u.id
                 WHERE cp.conversation_id = ?1
                 ORDER BY cp.joined_at, u.name",
            )?;
            let rows = stmt
                .query_map([conversation_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_participant_ids(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1 ORDER BY joined_at",
            )?;
            let ids = stmt
                .query_map([conversation_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// The user's conversations, most recently active first. Conversations
    /// without messages sort last, newest first among themselves.
    pub fn get_conversation_summaries(&self, user_id: &str) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            // Latest message and direct-chat peer are folded in with
            // correlated subqueries (no N+1 per conversation).
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.name, c.photo_url,
                        peer.name, peer.photo_url,
                        m.created_at, m.text, m.content_type, m.status
                 FROM conversations c
                 JOIN conversation_participants cp
                   ON cp.conversation_id = c.id AND cp.user_id = ?1
                 LEFT JOIN users peer ON peer.id = (
                     SELECT p.user_id FROM conversation_participants p
                     WHERE p.conversation_id = c.id AND p.user_id != ?1
                     ORDER BY p.joined_at LIMIT 1
                 )
                 LEFT JOIN messages m ON m.id = (
                     SELECT id FROM messages
                     WHERE conversation_id = c.id
                     ORDER BY created_at DESC, rowid DESC LIMIT 1
                 )
                 ORDER BY m.created_at DESC NULLS LAST, c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], summary_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        kind: enum_column::<ConversationKind>(row, 1)?,
        name: row.get(2)?,
        photo_url: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationSummaryRow> {
    Ok(ConversationSummaryRow {
        id: row.get(0)?,
        kind: enum_column(row, 1)?,
        name: row.get(2)?,
        photo_url: row.get(3)?,
        peer_name: row.get(4)?,
        peer_photo_url: row.get(5)?,
        last_message_at: row.get(6)?,
        last_message_text: row.get(7)?,
        last_message_kind: optional_enum_column(row, 8)?,
        last_message_status: optional_enum_column(row, 9)?,
    })
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
    ))?;
    stmt.query_row([id], conversation_from_row).optional()
}

fn query_conversation_by_key(conn: &Connection, key: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE direct_key = ?1"
    ))?;
    stmt.query_row([key], conversation_from_row).optional()
}
