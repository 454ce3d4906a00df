//! CRUD operations for [`ConversationMeta`] records.

use rusqlite::params;

use parley_shared::types::{ConversationId, ConversationKind};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ConversationMeta;

impl Database {
    /// Insert or update a conversation's metadata.
    pub fn upsert_conversation(&self, meta: &ConversationMeta) -> Result<()> {
        let members = serde_json::to_string(&meta.members)?;
        let group_key = meta
            .group_key
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn().execute(
            "INSERT INTO conversations (id, kind, name, members, group_key, unread_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 kind = excluded.kind,
                 name = excluded.name,
                 members = excluded.members,
                 group_key = excluded.group_key,
                 unread_count = excluded.unread_count",
            params![
                meta.id.as_str(),
                kind_to_str(meta.kind),
                meta.name,
                members,
                group_key,
                meta.unread_count,
            ],
        )?;
        Ok(())
    }

    /// Fetch a single conversation by id.
    pub fn get_conversation(&self, id: &ConversationId) -> Result<ConversationMeta> {
        self.conn()
            .query_row(
                "SELECT id, kind, name, members, group_key, unread_count
                 FROM conversations
                 WHERE id = ?1",
                params![id.as_str()],
                row_to_meta,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all conversations, oldest first.
    pub fn list_conversations(&self) -> Result<Vec<ConversationMeta>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, kind, name, members, group_key, unread_count
             FROM conversations
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], row_to_meta)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }
}

fn kind_to_str(kind: ConversationKind) -> &'static str {
    match kind {
        ConversationKind::Direct => "direct",
        ConversationKind::Group => "group",
    }
}

/// Map a `rusqlite::Row` to a [`ConversationMeta`].
fn row_to_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMeta> {
    let id: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let name: String = row.get(2)?;
    let members_json: String = row.get(3)?;
    let group_key_json: Option<String> = row.get(4)?;
    let unread_count: u32 = row.get(5)?;

    let kind = match kind_str.as_str() {
        "group" => ConversationKind::Group,
        _ => ConversationKind::Direct,
    };

    let members = serde_json::from_str(&members_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let group_key = group_key_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ConversationMeta {
        id: ConversationId(id),
        kind,
        name,
        members,
        group_key,
        unread_count,
    })
}
