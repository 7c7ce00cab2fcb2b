use std::time::Duration;

use thiserror::Error;
use validator::ValidationErrors;

use super::DatasourceRole;

/// A candidate's configuration is incomplete. Raised before any connection is attempted and never
/// retried.
#[derive(Debug, Error)]
#[error("{role} datasource is misconfigured: {errors}")]
pub struct ConfigurationError {
    pub role: DatasourceRole,
    #[source]
    pub errors: ValidationErrors,
}

/// One failed attempt to validate a candidate datasource.
#[derive(Debug, Error)]
#[error("failed to connect to {role} datasource at {endpoint}: {cause}")]
pub struct ConnectionError {
    pub role: DatasourceRole,
    pub endpoint: String,
    #[source]
    pub cause: ConnectionCause,
}

impl ConnectionError {
    pub fn kind(&self) -> &'static str {
        self.cause.kind()
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionCause {
    #[error("no connection acquired within {0:?}")]
    Timeout(Duration),

    #[error("unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Unavailable(#[from] anyhow::Error),
}

impl ConnectionCause {
    /// Stable label of the failure class, recorded on every attempt event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::UnsupportedDriver(_) => "driver",
            Self::InvalidEndpoint(_) => "endpoint",
            Self::Database(sqlx::Error::PoolTimedOut) => "timeout",
            Self::Database(sqlx::Error::Io(_)) | Self::Database(sqlx::Error::Tls(_)) => "network",
            Self::Database(sqlx::Error::Database(_)) => "rejected",
            Self::Database(sqlx::Error::Configuration(_)) => "endpoint",
            Self::Database(_) => "database",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Terminal outcome of datasource selection; the service must not start.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SelectionError {
    #[error("both primary and secondary datasources are unavailable: [{primary}] [{secondary}]")]
    Unavailable {
        primary: ConnectionError,
        secondary: ConnectionError,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("primary datasource is unavailable and the secondary cannot be tried: [{primary}] [{secondary}]")]
    SecondaryMisconfigured {
        primary: ConnectionError,
        secondary: ConfigurationError,
    },
}
