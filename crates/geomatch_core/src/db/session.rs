//! Session store on a `session_kv` table, one record per key

use crate::db::Db;
use crate::{CoreError, Result, SessionStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const TABLE: &str = "session_kv";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    value: String,
}

#[derive(Debug, Clone)]
pub struct SurrealSessionStore {
    db: Db,
}

impl SurrealSessionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SurrealSessionStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _: Option<SessionRecord> = self
            .db
            .upsert((TABLE, key))
            .content(SessionRecord {
                value: value.to_string(),
            })
            .await
            .map_err(|e| CoreError::session_store("set", key, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let record: Option<SessionRecord> = self
            .db
            .select((TABLE, key))
            .await
            .map_err(|e| CoreError::session_store("get", key, e))?;
        Ok(record.map(|r| r.value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _: Option<SessionRecord> = self
            .db
            .delete((TABLE, key))
            .await
            .map_err(|e| CoreError::session_store("delete", key, e))?;
        Ok(())
    }
}
