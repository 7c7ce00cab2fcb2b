//! Startup selection of the one datasource the service runs against.
//!
//! The primary candidate is validated first by drawing a single connection from a freshly built
//! pool within the connect timeout. Only when that fails is the secondary tried. The pool of the
//! winning candidate becomes the long-lived [`ConnectionSource`]; the validation connection is
//! released before the source is handed out.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use error::*;
pub use postgres::*;
pub use selector::*;

use crate::core::settings::DatasourceConfig;

mod error;
mod postgres;
mod selector;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceRole {
    Primary,
    Secondary,
}

impl DatasourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for DatasourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds an unconnected pool for a candidate datasource.
pub trait DatasourceConnector: Send + Sync {
    type Pool: ConnectionPool;

    /// Must not open connections; driver and endpoint problems surface here.
    fn build_pool(&self, config: &DatasourceConfig, connect_timeout: Duration) -> Result<Self::Pool, ConnectionCause>;
}

/// Pool-like handle from which live connections are drawn.
///
/// Dropping a `Connection` releases it; dropping the pool releases everything it holds.
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    type Connection: Send;

    async fn acquire(&self, timeout: Duration) -> Result<Self::Connection, ConnectionCause>;

    async fn close(&self);
}

/// The validated pool of the selected candidate, tagged with the role it was selected as.
#[derive(Debug, Clone)]
pub struct ConnectionSource<P> {
    pool: P,
    role: DatasourceRole,
    endpoint: String,
}

impl<P> ConnectionSource<P> {
    pub(crate) fn new(pool: P, role: DatasourceRole, endpoint: String) -> Self {
        Self { pool, role, endpoint }
    }

    pub fn role(&self) -> DatasourceRole {
        self.role
    }

    /// Redacted endpoint of the selected datasource.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn into_pool(self) -> P {
        self.pool
    }
}

#[derive(Debug)]
pub enum SelectionOutcome<P> {
    Selected {
        source: ConnectionSource<P>,
        role: DatasourceRole,
    },
    Failed {
        primary: ConnectionError,
        secondary: ConnectionError,
    },
    Misconfigured(ConfigurationError),
    SecondaryMisconfigured {
        primary: ConnectionError,
        secondary: ConfigurationError,
    },
}

impl<P> SelectionOutcome<P> {
    pub fn role(&self) -> Option<DatasourceRole> {
        match self {
            Self::Selected { role, .. } => Some(*role),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<ConnectionSource<P>, SelectionError> {
        match self {
            Self::Selected { source, .. } => Ok(source),
            Self::Failed { primary, secondary } => Err(SelectionError::Unavailable { primary, secondary }),
            Self::Misconfigured(error) => Err(error.into()),
            Self::SecondaryMisconfigured { primary, secondary } => {
                Err(SelectionError::SecondaryMisconfigured { primary, secondary })
            }
        }
    }
}
