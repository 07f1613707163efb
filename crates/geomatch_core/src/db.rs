//! SurrealDB backends
//!
//! This module provides SurrealDB implementations of the session store,
//! geo index, profile repository and request bus, plus the connection and
//! schema setup they share.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bus;
pub mod client;
pub mod geo;
pub mod profile;
pub mod session;

pub use bus::SurrealBus;
pub use client::Db;
pub use geo::SurrealGeoIndex;
pub use profile::SurrealProfileRepository;
pub use session::SurrealSessionStore;

/// Core database error type
#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("Connection failed")]
    #[diagnostic(
        code(geomatch_core::db::connection_failed),
        help("Check your database configuration and ensure the database is running")
    )]
    ConnectionFailed(#[source] surrealdb::Error),

    #[error("Query failed")]
    #[diagnostic(
        code(geomatch_core::db::query_failed),
        help("Check the query syntax and table schema")
    )]
    QueryFailed(#[source] surrealdb::Error),

    #[error("Record not found: {entity}")]
    #[diagnostic(code(geomatch_core::db::not_found))]
    NotFound { entity: String },

    #[error("{0}")]
    #[diagnostic(code(geomatch_core::db::other))]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Where session, geo, profile and bus state is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatabaseConfig {
    /// Plain in-process stores, nothing survives a restart.
    Memory,
    Embedded {
        #[serde(default = "default_db_path")]
        path: String,
    },
    #[cfg(feature = "surreal-remote")]
    Remote {
        url: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_namespace")]
        namespace: String,
        #[serde(default = "default_namespace")]
        database: String,
    },
}

fn default_db_path() -> String {
    "./geomatch.db".to_string()
}

#[cfg(feature = "surreal-remote")]
fn default_namespace() -> String {
    client::NAMESPACE.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Embedded {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        matches!(self, DatabaseConfig::Memory)
    }
}
