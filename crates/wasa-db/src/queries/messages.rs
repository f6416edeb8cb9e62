use anyhow::Result;
use rusqlite::{Connection, Row};

use wasa_types::models::MessageStatus;

use super::{OptionalExt, enum_column, next_seq};
use crate::Database;
use crate::models::MessageRow;

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, created_at, content_type, text, photo_url, \
     file_url, file_name, replied_to_message_id, status, is_forwarded, client_message_id";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let seq = next_seq(&tx)?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, created_at, content_type, text, photo_url,
                                       file_url, file_name, replied_to_message_id, status, is_forwarded, client_message_id, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    msg.id,
                    msg.conversation_id,
                    msg.sender_id,
                    msg.created_at,
                    msg.content_type.as_str(),
                    msg.text,
                    msg.photo_url,
                    msg.file_url,
                    msg.file_name,
                    msg.replied_to_message_id,
                    msg.status.as_str(),
                    msg.is_forwarded,
                    msg.client_message_id,
                    seq,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))?;
            stmt.query_row([id], message_from_row).optional()
        })
    }

    /// Look up a message by the sender's idempotency key.
    pub fn find_message_by_client_id(
        &self,
        sender_id: &str,
        conversation_id: &str,
        client_message_id: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE sender_id = ?1 AND conversation_id = ?2 AND client_message_id = ?3"
            ))?;
            stmt.query_row((sender_id, conversation_id, client_message_id), message_from_row)
                .optional()
        })
    }

    /// All messages of a conversation, newest first.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Hard delete. Reactions and read/delivery markers go with it; replies
    /// that pointed at it keep the dangling id.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

/// Raise the stored status hint to `status`. Never lowers it.
/// Returns `true` if the row changed.
pub(super) fn upgrade_hint(conn: &Connection, id: &str, status: MessageStatus) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE messages SET status = ?2
         WHERE id = ?1
           AND (CASE status WHEN 'sent' THEN 0 WHEN 'received' THEN 1 ELSE 2 END) < ?3",
        rusqlite::params![id, status.as_str(), status_rank(status)],
    )?;
    Ok(changed > 0)
}

fn status_rank(status: MessageStatus) -> i64 {
    match status {
        MessageStatus::Sent => 0,
        MessageStatus::Received => 1,
        MessageStatus::Read => 2,
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        created_at: row.get(3)?,
        content_type: enum_column(row, 4)?,
        text: row.get(5)?,
        photo_url: row.get(6)?,
        file_url: row.get(7)?,
        file_name: row.get(8)?,
        replied_to_message_id: row.get(9)?,
        status: enum_column(row, 10)?,
        is_forwarded: row.get(11)?,
        client_message_id: row.get(12)?,
    })
}
