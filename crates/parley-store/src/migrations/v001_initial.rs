//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `conversations`, `messages`, and
//! `local_identity`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversations (direct or group), without their message lists
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id           TEXT PRIMARY KEY NOT NULL,  -- peer id or grp-… id
    kind         TEXT NOT NULL,              -- 'direct' | 'group'
    name         TEXT NOT NULL,
    members      TEXT NOT NULL,              -- JSON array of user ids
    group_key    TEXT,                       -- JWK JSON, groups only
    unread_count INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,
    ciphertext      BLOB NOT NULL,              -- opaque AEAD ciphertext
    nonce           BLOB NOT NULL,              -- 12-byte AEAD nonce
    timestamp       INTEGER NOT NULL,           -- sender wall-clock millis

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, timestamp ASC);

-- ----------------------------------------------------------------
-- Local identity (single row)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS local_identity (
    id           INTEGER PRIMARY KEY CHECK (id = 1),
    secret_key   TEXT NOT NULL,               -- hex-encoded 32 bytes
    display_name TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
