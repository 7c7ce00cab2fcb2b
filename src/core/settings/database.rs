use std::fmt;
use std::time::Duration;

use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use validator::{Validate, ValidationError, ValidationErrors};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3_000);
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

const JDBC_PREFIX: &str = "jdbc:";

/// Candidate pair of datasources plus the knobs shared by both pools.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub primary: DatasourceConfig,
    pub secondary: DatasourceConfig,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "DatabaseSettings::default_connect_timeout", rename = "connect_timeout_millis")]
    pub connect_timeout: Duration,

    #[serde(default = "DatabaseSettings::default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub migrate_on_startup: bool,
}

impl DatabaseSettings {
    fn default_connect_timeout() -> Duration {
        DEFAULT_CONNECT_TIMEOUT
    }

    fn default_max_connections() -> u32 {
        DEFAULT_MAX_CONNECTIONS
    }
}

/// Credentials for one candidate datasource.
///
/// Every field is required and must be non-empty. Deserialization accepts empty values so that a
/// misconfigured candidate is only reported once it is actually attempted; call `validate()` before
/// connecting.
#[derive(Clone, Deserialize)]
pub struct DatasourceConfig {
    #[serde(alias = "jdbc_url", alias = "jdbc-url", alias = "url")]
    pub endpoint_url: String,

    pub username: String,

    pub password: Secret<String>,

    #[serde(alias = "driver_class_name", alias = "driver-class-name")]
    pub driver: String,
}

impl DatasourceConfig {
    pub fn new(
        endpoint_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>,
        driver: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            username: username.into(),
            password: Secret::new(password.into()),
            driver: driver.into(),
        }
    }

    /// Endpoint url with any `jdbc:` prefix removed.
    pub fn connection_url(&self) -> &str {
        let url = self.endpoint_url.trim();
        if url.len() >= JDBC_PREFIX.len() && url[..JDBC_PREFIX.len()].eq_ignore_ascii_case(JDBC_PREFIX) {
            &url[JDBC_PREFIX.len()..]
        } else {
            url
        }
    }

    /// Endpoint url suitable for logs: userinfo and query parameters are masked.
    pub fn redacted_endpoint(&self) -> String {
        lazy_static::lazy_static! {
            static ref RE_USERINFO: Regex = Regex::new(r##"://[^@/?#]*@"##).unwrap();
        }

        let url = self.endpoint_url.trim();
        let url = url.split('?').next().unwrap_or(url);
        RE_USERINFO.replace(url, "://***@").into_owned()
    }
}

// Hand-written because the derive requires `Serialize` on every validated field, which
// `Secret<String>` deliberately does not implement.
impl Validate for DatasourceConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let required = [
            ("endpoint_url", self.endpoint_url.as_str(), "endpoint url is required"),
            ("username", self.username.as_str(), "username is required"),
            ("password", self.password.expose_secret().as_str(), "password is required"),
            ("driver", self.driver.as_str(), "driver identifier is required"),
        ];

        let mut errors = ValidationErrors::new();
        for &(field, value, message) in required.iter() {
            if value.is_empty() {
                let mut error = ValidationError::new("length");
                error.message = Some(message.into());
                error.add_param("min".into(), &1);
                errors.add(field, error);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("endpoint_url", &self.redacted_endpoint())
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("driver", &self.driver)
            .finish()
    }
}
