use std::fmt::Debug;

use thiserror::Error;

use crate::core::datasource::SelectionError;
use crate::server::routes::error_chain_fmt;

#[derive(Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("{0}")]
    SettingsError(#[from] super::settings::SettingsError),

    #[error("{0}")]
    DatasourceError(#[from] SelectionError),

    #[error("failed to migrate database schema: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    IOError(#[from] std::io::Error),

    #[error("startup interrupted before a datasource was selected")]
    Interrupted,
}

impl Debug for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
