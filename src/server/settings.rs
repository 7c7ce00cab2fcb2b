use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use http_server::ApplicationSettings;

pub use crate::core::settings::error::*;
use crate::core::settings::{DatabaseSettings, LoadingOptions, SettingsLoader};

pub mod http_server;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
}

impl SettingsLoader for Settings {
    type Options = HttpServerCliOptions;
}

#[derive(Parser, Debug, Default, PartialEq, Eq)]
#[command(version, about = "Product catalog service with primary/secondary Postgres failover")]
pub struct HttpServerCliOptions {
    /// Override environment-based configuration file to load.
    /// Default behavior is to load configuration based on `APP_ENVIRONMENT` envvar
    /// with "local" or "production" possible values.
    #[arg(short, long, value_hint = clap::ValueHint::AnyPath)]
    pub config: Option<PathBuf>,

    /// Specify path to optional secrets configuration file, such as datasource passwords.
    #[arg(short, long, value_hint = clap::ValueHint::AnyPath)]
    pub secrets: Option<PathBuf>,
}

impl LoadingOptions for HttpServerCliOptions {
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone()
    }

    fn secrets_path(&self) -> Option<PathBuf> {
        self.secrets.clone()
    }
}
