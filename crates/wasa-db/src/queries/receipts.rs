use anyhow::Result;
use rusqlite::{Connection, Row};
use std::collections::HashMap;
use tracing::debug;

use wasa_types::models::MessageStatus;
use wasa_types::status::ReceiptCounts;

use super::OptionalExt;
use super::messages::upgrade_hint;
use crate::Database;

/// Per-message marker counts, all correlated on the outer `m` alias.
/// Recipients are non-senders whose join precedes the message on the
/// store-wide sequence. `seen` counts every non-sender holding either marker once.
const COUNTS_SELECT: &str = "SELECT m.id,
        (SELECT COUNT(*) FROM conversation_participants cp
          WHERE cp.conversation_id = m.conversation_id
            AND cp.user_id != m.sender_id
            AND cp.joined_seq < m.seq),
        (SELECT COUNT(*) FROM message_reads r
           JOIN conversation_participants cp
             ON cp.conversation_id = m.conversation_id AND cp.user_id = r.user_id
          WHERE r.message_id = m.id
            AND r.user_id != m.sender_id
            AND cp.joined_seq < m.seq),
        (SELECT COUNT(*) FROM message_reads r
          WHERE r.message_id = m.id AND r.user_id != m.sender_id)
        + (SELECT COUNT(*) FROM message_deliveries d
            WHERE d.message_id = m.id
              AND d.user_id != m.sender_id
              AND NOT EXISTS (SELECT 1 FROM message_reads r
                               WHERE r.message_id = d.message_id AND r.user_id = d.user_id))
     FROM messages m";

/// A message whose markers changed, with its status before and after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub message_id: String,
    pub previous: MessageStatus,
    pub status: MessageStatus,
}

impl StatusChange {
    /// `true` if this write is what moved the message to `status`.
    pub fn reached(&self, status: MessageStatus) -> bool {
        self.status == status && self.previous != status
    }
}

impl Database {
    // -- Delivery / read markers --

    /// Receive-on-list: give `user_id` a delivery marker for every message
    /// from someone else in their conversations that they hold no marker for.
    pub fn mark_delivered_for_user(&self, user_id: &str, now: &str) -> Result<Vec<StatusChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let pending = {
                let mut stmt = tx.prepare(
                    "SELECT m.id FROM messages m
                     JOIN conversation_participants cp
                       ON cp.conversation_id = m.conversation_id AND cp.user_id = ?1
                     WHERE m.sender_id != ?1
                       AND NOT EXISTS (SELECT 1 FROM message_deliveries d
                                        WHERE d.message_id = m.id AND d.user_id = ?1)
                       AND NOT EXISTS (SELECT 1 FROM message_reads r
                                        WHERE r.message_id = m.id AND r.user_id = ?1)
                     ORDER BY m.created_at, m.rowid",
                )?;
                stmt.query_map([user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?
            };

            let before = resolve_all(&tx, &pending)?;
            {
                let mut insert = tx.prepare(
                    "INSERT OR IGNORE INTO message_deliveries (message_id, user_id, delivered_at) VALUES (?1, ?2, ?3)",
                )?;
                for id in &pending {
                    insert.execute((id, user_id, now))?;
                }
            }

            let changes = refresh_statuses(&tx, &before)?;
            tx.commit()?;

            if !changes.is_empty() {
                debug!("Marked {} message(s) delivered to {}", changes.len(), user_id);
            }
            Ok(changes)
        })
    }

    /// Read-on-open: give `user_id` a read marker for every message from
    /// someone else in the conversation they have not read yet.
    pub fn mark_conversation_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        now: &str,
    ) -> Result<Vec<StatusChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let pending = {
                let mut stmt = tx.prepare(
                    "SELECT m.id FROM messages m
                     WHERE m.conversation_id = ?1
                       AND m.sender_id != ?2
                       AND NOT EXISTS (SELECT 1 FROM message_reads r
                                        WHERE r.message_id = m.id AND r.user_id = ?2)
                     ORDER BY m.created_at, m.rowid",
                )?;
                stmt.query_map((conversation_id, user_id), |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?
            };

            let before = resolve_all(&tx, &pending)?;
            {
                let mut insert = tx.prepare(
                    "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
                )?;
                for id in &pending {
                    insert.execute((id, user_id, now))?;
                }
            }

            let changes = refresh_statuses(&tx, &before)?;
            tx.commit()?;

            if !changes.is_empty() {
                debug!(
                    "Marked {} message(s) in {} read by {}",
                    changes.len(),
                    conversation_id,
                    user_id
                );
            }
            Ok(changes)
        })
    }

    pub fn receipt_counts(&self, message_id: &str) -> Result<Option<ReceiptCounts>> {
        self.with_conn(|conn| query_counts(conn, message_id))
    }

    /// Marker counts for every message of a conversation, keyed by message id.
    pub fn receipt_counts_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<HashMap<String, ReceiptCounts>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{COUNTS_SELECT} WHERE m.conversation_id = ?1"))?;
            let rows = stmt
                .query_map([conversation_id], counts_from_row)?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    /// Fresh status of one message, or `None` if it does not exist.
    pub fn resolve_status(&self, message_id: &str) -> Result<Option<MessageStatus>> {
        Ok(self.receipt_counts(message_id)?.map(ReceiptCounts::status))
    }
}

/// Fresh status of each message, in the order given. Missing ids are skipped.
fn resolve_all(conn: &Connection, ids: &[String]) -> Result<Vec<(String, MessageStatus)>> {
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(counts) = query_counts(conn, id)? {
            resolved.push((id.clone(), counts.status()));
        }
    }
    Ok(resolved)
}

/// Resolve each message again after a marker write and raise its stored
/// hint to match.
fn refresh_statuses(conn: &Connection, before: &[(String, MessageStatus)]) -> Result<Vec<StatusChange>> {
    let mut changes = Vec::with_capacity(before.len());
    for (id, previous) in before {
        let Some(counts) = query_counts(conn, id)? else {
            continue;
        };
        let status = counts.status();
        upgrade_hint(conn, id, status)?;
        changes.push(StatusChange {
            message_id: id.clone(),
            previous: *previous,
            status,
        });
    }
    Ok(changes)
}

fn query_counts(conn: &Connection, message_id: &str) -> Result<Option<ReceiptCounts>> {
    let mut stmt = conn.prepare_cached(&format!("{COUNTS_SELECT} WHERE m.id = ?1"))?;
    stmt.query_row([message_id], counts_from_row)
        .optional()
        .map(|found| found.map(|(_, counts)| counts))
}

fn counts_from_row(row: &Row<'_>) -> rusqlite::Result<(String, ReceiptCounts)> {
    let recipients: i64 = row.get(1)?;
    let read: i64 = row.get(2)?;
    let seen: i64 = row.get(3)?;
    Ok((
        row.get(0)?,
        ReceiptCounts {
            recipients: recipients.max(0) as usize,
            read: read.max(0) as usize,
            seen: seen.max(0) as usize,
        },
    ))
}
