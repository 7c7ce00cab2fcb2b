use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgConnection, PgPool};

use super::{ConnectionCause, ConnectionPool, DatasourceConnector};
use crate::core::settings::{DatabaseSettings, DatasourceConfig};

const POSTGRES_DRIVERS: [&str; 4] = ["postgres", "postgresql", "pg", "org.postgresql.driver"];

/// Builds lazily-connecting `sqlx` Postgres pools.
#[derive(Debug, Clone)]
pub struct PgConnector {
    max_connections: u32,
}

impl PgConnector {
    pub fn new(max_connections: u32) -> Self {
        Self { max_connections: max_connections.max(1) }
    }

    pub fn for_settings(settings: &DatabaseSettings) -> Self {
        Self::new(settings.max_connections)
    }

    pub fn connect_options(config: &DatasourceConfig) -> Result<PgConnectOptions, ConnectionCause> {
        let driver = config.driver.trim().to_lowercase();
        if !POSTGRES_DRIVERS.contains(&driver.as_str()) {
            return Err(ConnectionCause::UnsupportedDriver(config.driver.clone()));
        }

        let options = PgConnectOptions::from_str(config.connection_url())
            .map_err(|err| ConnectionCause::InvalidEndpoint(format!("{}: {}", config.redacted_endpoint(), err)))?;

        Ok(options
            .username(config.username.as_str())
            .password(config.password.expose_secret().as_str()))
    }
}

impl DatasourceConnector for PgConnector {
    type Pool = PgPool;

    fn build_pool(&self, config: &DatasourceConfig, connect_timeout: Duration) -> Result<Self::Pool, ConnectionCause> {
        let options = Self::connect_options(config)?;
        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(0)
            .acquire_timeout(connect_timeout)
            .connect_lazy_with(options))
    }
}

/// Validation opens one connection with the pool's own options instead of going through
/// `Pool::acquire`, which retries until its acquire timeout and reports every failure as
/// `PoolTimedOut`. A single attempt keeps the real cause, e.g. a refused socket or rejected
/// credentials. The caller bounds the attempt with its connect timeout.
#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = PgConnection;

    async fn acquire(&self, _timeout: Duration) -> Result<Self::Connection, ConnectionCause> {
        let options = self.connect_options();
        Ok(options.connect().await?)
    }

    async fn close(&self) {
        sqlx::Pool::close(self).await
    }
}
