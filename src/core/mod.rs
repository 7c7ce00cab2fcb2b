use sqlx::PgPool;
use thiserror::Error;

use datasource::{ConnectionSource, DatasourceSelector, PgConnector, SelectionError};
use settings::DatabaseSettings;

pub mod datasource;
pub mod domain;
pub mod settings;

/// Picks the Postgres pool the service runs against for the lifetime of the process.
#[tracing::instrument(level = "info")]
pub async fn select_connection_source(settings: &DatabaseSettings) -> Result<ConnectionSource<PgPool>, SelectionError> {
    DatasourceSelector::new(PgConnector::for_settings(settings))
        .select(&settings.primary, &settings.secondary, settings.connect_timeout)
        .await
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error("Failed validation: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    DatabaseExecutionError(#[from] sqlx::Error),

    #[error("{0}")]
    CoreError(#[from] anyhow::Error),
}
