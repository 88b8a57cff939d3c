use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Where relay facts come from.
#[derive(Clone, Debug, Deserialize)]
pub struct DirectoryConfig {
    /// Onionoo `details` endpoint.
    #[serde(default = "default_onionoo_url")]
    pub onionoo_url: String,
    #[serde(default = "default_directory_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            onionoo_url: default_onionoo_url(),
            timeout_secs: default_directory_timeout_secs(),
        }
    }
}

/// Tuning for the reconciliation run.
#[derive(Clone, Debug, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Relays first seen within this many hours of the initial deployment are not welcomed.
    #[serde(default = "default_deploy_grace_hours")]
    pub deploy_grace_hours: i64,
    /// Relays unseen for longer than this are forgotten.
    #[serde(default = "default_relay_retention_days")]
    pub relay_retention_days: i64,
    /// Log notifications instead of mailing them.
    #[serde(default)]
    pub dry_run: bool,
    /// Perform a single run and exit instead of looping.
    #[serde(default)]
    pub run_once: bool,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            deploy_grace_hours: default_deploy_grace_hours(),
            relay_retention_days: default_relay_retention_days(),
            dry_run: false,
            run_once: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub smtp: SmtpConfig,
    /// Public site URL; unsubscribe and preference links are built from it.
    pub base_url: String,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

fn default_onionoo_url() -> String {
    "https://onionoo.torproject.org/details".to_string()
}

fn default_directory_timeout_secs() -> u64 {
    30
}

fn default_check_interval_secs() -> u64 {
    3600
}

fn default_deploy_grace_hours() -> i64 {
    48
}

fn default_relay_retention_days() -> i64 {
    365
}

impl AppConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.weather.dry_run && self.smtp.port == 0 {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Validation(format!("base_url is not a valid URL: {e}")))?;
        Url::parse(&self.directory.onionoo_url).map_err(|e| {
            ConfigError::Validation(format!("directory.onionoo_url is not a valid URL: {e}"))
        })?;
        if self.weather.check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "weather.check_interval_secs must be > 0".into(),
            ));
        }
        if self.directory.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "directory.timeout_secs must be > 0".into(),
            ));
        }
        if self.weather.deploy_grace_hours < 0 || self.weather.relay_retention_days < 0 {
            return Err(ConfigError::Validation(
                "weather durations must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `SMTP__PORT`, `WEATHER__DRY_RUN`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

/// Same as [`load_config`] with an explicit file path (extension selects the format).
pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
