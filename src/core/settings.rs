use std::convert::{TryFrom, TryInto};
use std::fmt::{Debug, Display};
use std::env::VarError;
use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::ConfigBuilder;
pub use database::*;
pub use error::*;
use serde::de::DeserializeOwned;

pub mod database;
pub mod error;

const ENV_APP_ENVIRONMENT: &str = "APP_ENVIRONMENT";
const ENV_PREFIX: &str = "app";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";
const RESOURCES_DIR: &str = "resources";
const APP_CONFIG: &str = "application";

pub trait LoadingOptions: Debug {
    fn config_path(&self) -> Option<PathBuf>;
    fn secrets_path(&self) -> Option<PathBuf>;
}

#[derive(Debug, Display, PartialEq)]
enum Environment {
    Local,
    Production,
}

impl AsRef<str> for Environment {
    fn as_ref(&self) -> &str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(SettingsError::Bootstrap {
                message: format!("{} environment unrecognized", other),
                setting: "environment identification".to_string(),
            }),
        }
    }
}

/// Assembles service settings, most specific source last:
///
/// 1. `resources/application.yaml`, or the file named on the command line instead;
/// 2. `resources/<environment>.yaml` when `APP_ENVIRONMENT` names a known environment;
/// 3. the secrets file, typically holding the datasource passwords;
/// 4. `APP_`-prefixed variables, e.g. `APP_DATABASE__SECONDARY__ENDPOINT_URL`.
pub trait SettingsLoader: Debug + Sized {
    type Options: LoadingOptions;

    #[tracing::instrument(level = "info")]
    fn load(options: Self::Options) -> Result<Self, SettingsError>
    where
        Self: DeserializeOwned,
    {
        let builder = Self::load_configuration(config::Config::builder(), options.config_path())?;
        let builder = Self::load_secrets(builder, options.secrets_path());
        let builder = Self::load_environment(builder);
        let settings = builder.build()?.try_deserialize()?;
        tracing::info!(?settings, "service settings resolved.");
        Ok(settings)
    }

    #[tracing::instrument(level = "info", skip(config))]
    fn load_configuration(
        config: ConfigBuilder<DefaultState>, specific_config_path: Option<PathBuf>,
    ) -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        if let Some(explicit_path) = specific_config_path {
            tracing::info!(path=?explicit_path, "using explicit settings file in place of resources.");
            return Ok(config.add_source(config::File::from(explicit_path).required(true)));
        }

        let resources_path = std::env::current_dir()?.join(RESOURCES_DIR);
        if !resources_path.is_dir() {
            return Err(SettingsError::MissingResources { path: resources_path });
        }

        let base_path = resources_path.join(APP_CONFIG);
        tracing::debug!(path=?base_path, "adding base settings.");
        let config = config.add_source(required_file(&base_path));

        match environment_overlay(&resources_path, std::env::var(ENV_APP_ENVIRONMENT))? {
            Some(overlay_path) => {
                tracing::debug!(path=?overlay_path, "adding environment settings overlay.");
                Ok(config.add_source(required_file(&overlay_path)))
            }
            None => {
                tracing::warn!("{} not set; running on base settings only.", ENV_APP_ENVIRONMENT);
                Ok(config)
            }
        }
    }

    #[tracing::instrument(level = "info", skip(config))]
    fn load_secrets(config: ConfigBuilder<DefaultState>, secrets_path: Option<PathBuf>) -> ConfigBuilder<DefaultState> {
        match secrets_path {
            Some(path) => {
                if !path.exists() {
                    tracing::error!(?path, "datasource secrets file not found.");
                }
                config.add_source(config::File::from(path).required(true))
            }
            None => config,
        }
    }

    #[tracing::instrument(level = "info", skip(config))]
    fn load_environment(config: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        config.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_PREFIX_SEPARATOR)
                .separator(ENV_SEPARATOR),
        )
    }
}

fn required_file(path: &Path) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::with_name(path.to_string_lossy().as_ref()).required(true)
}

/// Path of the environment overlay file, if the environment variable selects one.
fn environment_overlay(
    resources_path: &Path, environment: Result<String, VarError>,
) -> Result<Option<PathBuf>, SettingsError> {
    match environment {
        Ok(rep) => {
            let environment: Environment = rep.try_into()?;
            Ok(Some(resources_path.join(environment.as_ref())))
        }
        Err(VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
