use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;
use crate::Database;
use crate::models::ReactionRow;

const REACTION_COLUMNS: &str = "id, message_id, user_id, emoji, created_at";

impl Database {
    // -- Reactions --

    /// Store `user_id`'s reaction on a message, replacing any earlier one.
    /// Returns the replaced reaction, if there was one.
    pub fn replace_reaction(
        &self,
        id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        now: &str,
    ) -> Result<Option<ReactionRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let previous = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {REACTION_COLUMNS} FROM reactions WHERE message_id = ?1 AND user_id = ?2"
                ))?;
                stmt.query_row((message_id, user_id), reaction_from_row).optional()?
            };

            if let Some(prev) = &previous {
                tx.execute("DELETE FROM reactions WHERE id = ?1", [&prev.id])?;
            }
            tx.execute(
                "INSERT INTO reactions (id, message_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, message_id, user_id, emoji, now),
            )?;

            tx.commit()?;
            Ok(previous)
        })
    }

    pub fn get_reaction(&self, id: &str) -> Result<Option<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {REACTION_COLUMNS} FROM reactions WHERE id = ?1"))?;
            stmt.query_row([id], reaction_from_row).optional()
        })
    }

    pub fn delete_reaction(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM reactions WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn get_reactions_for_message(&self, message_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REACTION_COLUMNS} FROM reactions WHERE message_id = ?1 ORDER BY created_at, rowid"
            ))?;
            collect_reactions(&mut stmt, message_id)
        })
    }

    /// Every reaction on every message of a conversation, oldest first.
    pub fn get_reactions_for_conversation(&self, conversation_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.message_id, r.user_id, r.emoji, r.created_at
                 FROM reactions r
                 JOIN messages m ON m.id = r.message_id
                 WHERE m.conversation_id = ?1
                 ORDER BY r.created_at, r.rowid",
            )?;
            collect_reactions(&mut stmt, conversation_id)
        })
    }
}

fn collect_reactions(stmt: &mut rusqlite::Statement<'_>, key: &str) -> Result<Vec<ReactionRow>> {
    let rows = stmt
        .query_map([key], reaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        emoji: row.get(3)?,
        created_at: row.get(4)?,
    })
}
