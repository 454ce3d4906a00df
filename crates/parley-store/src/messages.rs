//! CRUD operations for persisted [`EncryptedMessage`] records.

use rusqlite::params;
use uuid::Uuid;

use parley_shared::constants::NONCE_SIZE;
use parley_shared::types::{ConversationId, EncryptedMessage, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert a message. Inserting the same message id twice is a no-op:
    /// two messages with the same id are the same logical message.
    pub fn insert_message(
        &self,
        conversation_id: &ConversationId,
        message: &EncryptedMessage,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, ciphertext, nonce, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO NOTHING",
            params![
                message.id.to_string(),
                conversation_id.as_str(),
                message.sender_id.as_str(),
                message.ciphertext,
                message.nonce.as_slice(),
                message.timestamp,
            ],
        )?;
        Ok(())
    }

    /// Load all messages of a conversation, ascending by timestamp.
    pub fn get_messages_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<EncryptedMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, ciphertext, nonce, timestamp
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<EncryptedMessage> {
    let id_str: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let ciphertext: Vec<u8> = row.get(3)?;
    let nonce_bytes: Vec<u8> = row.get(4)?;
    let timestamp: i64 = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Blob,
            "bad nonce length".into(),
        ));
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&nonce_bytes);

    Ok(EncryptedMessage {
        id,
        sender_id: UserId(sender_id),
        conversation_id: ConversationId(conversation_id),
        ciphertext,
        nonce,
        timestamp,
    })
}
