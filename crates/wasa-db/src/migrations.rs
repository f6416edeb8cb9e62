use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            photo_url   TEXT,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        -- direct_key holds the sorted participant pair of a direct conversation
        -- ('a:b', or 'a:a' for a self-conversation) and is NULL for groups.
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL CHECK (kind IN ('direct', 'group')),
            name        TEXT,
            photo_url   TEXT,
            created_by  TEXT REFERENCES users(id) ON DELETE SET NULL,
            direct_key  TEXT UNIQUE,
            created_at  TEXT NOT NULL
        );

        -- Store-wide counter ordering joins against messages. A participant
        -- is a recipient of a message iff joined_seq < messages.seq.
        CREATE TABLE IF NOT EXISTS sequence_clock (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            value   INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO sequence_clock (id, value) VALUES (1, 0);

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            joined_at       TEXT NOT NULL,
            joined_seq      INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        -- replied_to_message_id is deliberately not a foreign key: deleting the
        -- original leaves the reply pointing at an id that no longer resolves.
        CREATE TABLE IF NOT EXISTS messages (
            id                      TEXT PRIMARY KEY,
            conversation_id         TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id               TEXT NOT NULL REFERENCES users(id),
            created_at              TEXT NOT NULL,
            content_type            TEXT NOT NULL
                CHECK (content_type IN ('text', 'photo', 'audio', 'document', 'file')),
            text                    TEXT,
            photo_url               TEXT,
            file_url                TEXT,
            file_name               TEXT,
            replied_to_message_id   TEXT,
            status                  TEXT NOT NULL DEFAULT 'sent'
                CHECK (status IN ('sent', 'received', 'read')),
            is_forwarded            INTEGER NOT NULL DEFAULT 0,
            client_message_id       TEXT,
            seq                     INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_id
            ON messages(sender_id, conversation_id, client_message_id)
            WHERE client_message_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS message_deliveries (
            message_id    TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            delivered_at  TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
