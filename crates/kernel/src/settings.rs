use std::path::PathBuf;

use anyhow::{anyhow, Context};
use libris_db::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "LIBRIS_ENV";
const CONFIG_DIR_ENV: &str = "LIBRIS_CONFIG_DIR";
const ENV_PREFIX: &str = "LIBRIS";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub lending: LendingSettings,
    #[serde(default)]
    pub catalogue: CatalogueSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .map(|cwd| cwd.join("config"))
                .with_context(|| "unable to resolve current directory")?,
        };

        Self::load_from(&config_dir, &environment)
    }

    /// Load configuration from an explicit directory and environment name.
    pub fn load_from(config_dir: &std::path::Path, environment: &str) -> anyhow::Result<Self> {
        let parsed: Environment = environment.parse()?;

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // The selected environment always wins over any file value.
        settings.environment = parsed;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let lending = &self.lending;
        if lending.default_loan_weeks == 0 || lending.default_loan_weeks > lending.max_loan_weeks {
            return Err(anyhow!(
                "lending.default_loan_weeks must be between 1 and {}",
                lending.max_loan_weeks
            ));
        }
        if lending.default_renewal_weeks == 0
            || lending.default_renewal_weeks > lending.max_loan_weeks
        {
            return Err(anyhow!(
                "lending.default_renewal_weeks must be between 1 and {}",
                lending.max_loan_weeks
            ));
        }
        if self.database.engine == DatabaseEngine::File
            && self.database.path.as_os_str().is_empty()
        {
            return Err(anyhow!("database.path must be set for the file engine"));
        }
        if lending.max_renewals > 10 {
            return Err(anyhow!("lending.max_renewals must be at most 10"));
        }
        if self.catalogue.page_size == 0 || self.catalogue.page_size > self.catalogue.max_page_size {
            return Err(anyhow!(
                "catalogue.page_size must be between 1 and {}",
                self.catalogue.max_page_size
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Which storage engine backs the document store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    /// Private in-memory database; nothing survives a restart.
    Memory,
    /// SQLite file at `database.path`.
    #[default]
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
    #[serde(default)]
    pub engine: DatabaseEngine,
    /// Database file, relative to the working directory unless absolute.
    #[serde(default = "DatabaseSettings::default_path")]
    pub path: PathBuf,
}

impl DatabaseSettings {
    fn default_name() -> String {
        "libris".to_string()
    }

    fn default_path() -> PathBuf {
        PathBuf::from("data/libris.db")
    }

    /// The store engine these settings select.
    pub fn store_engine(&self) -> Engine {
        match self.engine {
            DatabaseEngine::Memory => Engine::Memory,
            DatabaseEngine::File => Engine::File(self.path.clone()),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            engine: DatabaseEngine::default(),
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    /// Default `EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Loan terms applied when a request does not specify its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingSettings {
    #[serde(default = "LendingSettings::default_loan_weeks")]
    pub default_loan_weeks: u32,
    #[serde(default = "LendingSettings::default_renewal_weeks")]
    pub default_renewal_weeks: u32,
    /// Renewal cap given to newly created books.
    #[serde(default = "LendingSettings::default_max_renewals")]
    pub max_renewals: u32,
    /// Upper bound accepted for any requested loan or renewal length.
    #[serde(default = "LendingSettings::default_max_loan_weeks")]
    pub max_loan_weeks: u32,
}

impl LendingSettings {
    fn default_loan_weeks() -> u32 {
        3
    }

    fn default_renewal_weeks() -> u32 {
        2
    }

    fn default_max_renewals() -> u32 {
        2
    }

    fn default_max_loan_weeks() -> u32 {
        52
    }
}

impl Default for LendingSettings {
    fn default() -> Self {
        Self {
            default_loan_weeks: Self::default_loan_weeks(),
            default_renewal_weeks: Self::default_renewal_weeks(),
            max_renewals: Self::default_max_renewals(),
            max_loan_weeks: Self::default_max_loan_weeks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueSettings {
    /// Default page size of the admin listing.
    #[serde(default = "CatalogueSettings::default_page_size")]
    pub page_size: u32,
    #[serde(default = "CatalogueSettings::default_max_page_size")]
    pub max_page_size: u32,
}

impl CatalogueSettings {
    fn default_page_size() -> u32 {
        20
    }

    fn default_max_page_size() -> u32 {
        100
    }
}

impl Default for CatalogueSettings {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            max_page_size: Self::default_max_page_size(),
        }
    }
}
