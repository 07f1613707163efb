//! Connection setup and schema

use crate::db::{DatabaseConfig, DatabaseError, Result};
use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};

pub type Db = Surreal<Any>;

pub const NAMESPACE: &str = "geomatch";
pub const DATABASE: &str = "geomatch";

const SCHEMA: &[&str] = &[
    "DEFINE TABLE IF NOT EXISTS session_kv SCHEMALESS",
    "DEFINE TABLE IF NOT EXISTS geo_entry SCHEMALESS",
    "DEFINE INDEX IF NOT EXISTS geo_entry_latitude ON geo_entry FIELDS latitude",
    "DEFINE TABLE IF NOT EXISTS user_profile SCHEMALESS",
    "DEFINE INDEX IF NOT EXISTS user_profile_id ON user_profile FIELDS profile_id UNIQUE",
    "DEFINE TABLE IF NOT EXISTS profile_photo SCHEMALESS",
    "DEFINE INDEX IF NOT EXISTS profile_photo_handle ON profile_photo FIELDS handle",
    "DEFINE TABLE IF NOT EXISTS bus_message SCHEMALESS",
];

/// Connects according to `config` and prepares the schema.
///
/// [`DatabaseConfig::Memory`] maps to SurrealDB's in-memory engine here;
/// callers that want plain in-process stores should not call this at all.
pub async fn connect(config: &DatabaseConfig) -> Result<Db> {
    let db = match config {
        DatabaseConfig::Memory => {
            let db = any::connect("memory")
                .await
                .map_err(DatabaseError::ConnectionFailed)?;
            db.use_ns(NAMESPACE)
                .use_db(DATABASE)
                .await
                .map_err(DatabaseError::ConnectionFailed)?;
            db
        }
        DatabaseConfig::Embedded { path } => {
            // Ensure parent directory exists for file-based storage
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::Other(format!(
                            "Failed to create database directory: {}",
                            e
                        ))
                    })?;
                }
            }

            tracing::info!("Connecting to embedded database at: {}", path);
            let connect_start = std::time::Instant::now();
            let db = any::connect(format!("surrealkv://{}", path))
                .await
                .map_err(DatabaseError::ConnectionFailed)?;
            tracing::info!(
                "Database connection established in {:?}",
                connect_start.elapsed()
            );

            db.use_ns(NAMESPACE)
                .use_db(DATABASE)
                .await
                .map_err(DatabaseError::ConnectionFailed)?;
            db
        }
        #[cfg(feature = "surreal-remote")]
        DatabaseConfig::Remote {
            url,
            username,
            password,
            namespace,
            database,
        } => {
            use surrealdb::opt::auth::Root;

            tracing::info!("Connecting to remote database at: {}", url);
            let db = any::connect(url.as_str())
                .await
                .map_err(DatabaseError::ConnectionFailed)?;

            if let (Some(username), Some(password)) = (username, password) {
                db.signin(Root {
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await
                .map_err(DatabaseError::ConnectionFailed)?;
            }

            db.use_ns(namespace.as_str())
                .use_db(database.as_str())
                .await
                .map_err(DatabaseError::ConnectionFailed)?;
            db
        }
    };

    init_schema(&db).await?;
    Ok(db)
}

/// Defines the tables and indexes. Safe to run repeatedly.
pub async fn init_schema(db: &Db) -> Result<()> {
    for statement in SCHEMA {
        db.query(*statement)
            .await
            .map_err(DatabaseError::QueryFailed)?
            .check()
            .map_err(DatabaseError::QueryFailed)?;
    }
    tracing::debug!("Schema ready ({} statements)", SCHEMA.len());
    Ok(())
}

/// Create a new in-memory database instance for testing
#[cfg(test)]
pub async fn create_test_db() -> Result<Db> {
    connect(&DatabaseConfig::Memory).await
}
