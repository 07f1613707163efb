use crate::{UserHandle, db::DatabaseError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("Session store operation failed")]
    #[diagnostic(
        code(geomatch_core::session_store_failed),
        help("Check that the session store backend is reachable. Key: {key}")
    )]
    SessionStoreFailed {
        operation: String,
        key: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Geo index operation failed")]
    #[diagnostic(
        code(geomatch_core::geo_index_failed),
        help("The {operation} call for user {user} did not complete")
    )]
    GeoIndexFailed {
        operation: String,
        user: UserHandle,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("No location stored for user {user}")]
    #[diagnostic(
        code(geomatch_core::location_not_found),
        help("Ask the user to share a location first")
    )]
    LocationNotFound { user: UserHandle },

    #[error("Failed to publish {kind} to '{topic}'")]
    #[diagnostic(
        code(geomatch_core::bus_publish_failed),
        help("Check that the request bus is running")
    )]
    BusPublishFailed {
        topic: String,
        kind: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to subscribe to '{topic}'")]
    #[diagnostic(
        code(geomatch_core::bus_subscription_failed),
        help("The match dispatcher cannot run without a subscription")
    )]
    BusSubscriptionFailed {
        topic: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to read from '{topic}'")]
    #[diagnostic(code(geomatch_core::bus_receive_failed))]
    BusReceiveFailed {
        topic: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Malformed {kind} payload: {reason}")]
    #[diagnostic(
        code(geomatch_core::malformed_payload),
        help("Expected \"{{id}},{{lat}},{{lon}}\" or \"{{id}}\", got \"{payload}\"")
    )]
    MalformedPayload {
        kind: String,
        payload: String,
        reason: String,
    },

    #[error("Profile not found for user {user}")]
    #[diagnostic(
        code(geomatch_core::profile_not_found),
        help("The user has to run /start before this action")
    )]
    ProfileNotFound { user: String },

    #[error("Profile operation failed")]
    #[diagnostic(
        code(geomatch_core::profile_operation_failed),
        help("The {operation} call for user {user} did not complete")
    )]
    ProfileOperationFailed {
        operation: String,
        user: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to deliver {operation} to user {user}")]
    #[diagnostic(
        code(geomatch_core::transport_failed),
        help("Check the chat platform connection and that the user can receive messages")
    )]
    TransportFailed {
        operation: String,
        user: UserHandle,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error")]
    #[diagnostic(
        code(geomatch_core::configuration_error),
        help("Check the configuration file at {config_path}. Expected {expected} for '{field}'")
    )]
    ConfigurationError {
        config_path: String,
        field: String,
        expected: String,
        #[source]
        cause: ConfigError,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    #[diagnostic(code(geomatch_core::invalid_config))]
    InvalidConfig { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Underlying cause of a [`CoreError::ConfigurationError`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

#[derive(Debug, Error)]
#[error("{0}")]
pub(crate) struct StringError(pub(crate) String);

// Helper functions for creating common errors with context
impl CoreError {
    pub fn session_store(
        operation: impl Into<String>,
        key: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SessionStoreFailed {
            operation: operation.into(),
            key: key.into(),
            cause: Box::new(cause),
        }
    }

    pub fn geo_index(
        operation: impl Into<String>,
        user: UserHandle,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::GeoIndexFailed {
            operation: operation.into(),
            user,
            cause: Box::new(cause),
        }
    }

    pub fn bus_publish(
        topic: impl Into<String>,
        kind: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::BusPublishFailed {
            topic: topic.into(),
            kind: kind.into(),
            cause: Box::new(cause),
        }
    }

    pub fn malformed_payload(
        kind: impl Into<String>,
        payload: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedPayload {
            kind: kind.into(),
            payload: payload.into(),
            reason: reason.into(),
        }
    }

    pub fn profile_not_found(user: impl ToString) -> Self {
        Self::ProfileNotFound {
            user: user.to_string(),
        }
    }

    pub fn profile_operation(
        operation: impl Into<String>,
        user: impl ToString,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ProfileOperationFailed {
            operation: operation.into(),
            user: user.to_string(),
            cause: Box::new(cause),
        }
    }

    pub fn transport(
        operation: impl Into<String>,
        user: UserHandle,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TransportFailed {
            operation: operation.into(),
            user,
            cause: Box::new(cause),
        }
    }
}
