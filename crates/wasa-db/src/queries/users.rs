use anyhow::Result;
use rusqlite::{Connection, Row};

use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str = "id, name, photo_url, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO users (id, name) VALUES (?1, ?2)", (id, name))?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "name", name))
    }

    pub fn update_username(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET name = ?2 WHERE id = ?1", (id, name))?;
            Ok(())
        })
    }

    pub fn update_user_photo(&self, id: &str, photo_url: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET photo_url = ?2 WHERE id = ?1", (id, photo_url))?;
            Ok(())
        })
    }

    /// Users whose name contains `query` (case-insensitive). `None` or an
    /// empty query lists everyone.
    pub fn search_users(&self, query: Option<&str>) -> Result<Vec<UserRow>> {
        let pattern = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => format!("%{}%", escape_like(q)),
            None => "%".to_string(),
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name"
            ))?;
            let rows = stmt
                .query_map([pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch users. Unknown ids are skipped.
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Everyone who shares at least one conversation with `user_id`, each
    /// listed once, excluding the user themself.
    pub fn get_contact_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT other.user_id
                 FROM conversation_participants mine
                 JOIN conversation_participants other
                   ON other.conversation_id = mine.conversation_id
                 WHERE mine.user_id = ?1 AND other.user_id != ?1
                 ORDER BY other.user_id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

pub(super) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        photo_url: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    stmt.query_row([value], user_from_row).optional()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
