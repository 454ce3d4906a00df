//! Persistence of the local identity (single row).

use rusqlite::params;

use parley_shared::constants::SECRET_KEY_SIZE;
use parley_shared::identity::IdentityExport;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Persist the local identity, replacing any previous one.
    pub fn save_local_identity(&self, export: &IdentityExport) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO local_identity (id, secret_key, display_name)
             VALUES (1, ?1, ?2)",
            params![hex::encode(export.secret_key), export.display_name],
        )?;
        Ok(())
    }

    /// Load the local identity, if one has been created.
    pub fn load_local_identity(&self) -> Result<Option<IdentityExport>> {
        let row = self
            .conn()
            .query_row(
                "SELECT secret_key, display_name FROM local_identity WHERE id = 1",
                [],
                |row| {
                    let secret_hex: String = row.get(0)?;
                    let display_name: String = row.get(1)?;
                    Ok((secret_hex, display_name))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        let Some((secret_hex, display_name)) = row else {
            return Ok(None);
        };

        let bytes = hex::decode(&secret_hex)?;
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(StoreError::Corrupt("identity secret length".to_string()));
        }
        let mut secret_key = [0u8; SECRET_KEY_SIZE];
        secret_key.copy_from_slice(&bytes);

        Ok(Some(IdentityExport {
            secret_key,
            display_name,
        }))
    }
}
