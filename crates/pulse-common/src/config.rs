//! ---
//! pulse_section: "01-core-functionality"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Layered service configuration: defaults, TOML, environment."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pulse_logging::rotation::{DEFAULT_MAX_BACKUPS, DEFAULT_MAX_BYTES};
use pulse_logging::RotationPolicy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

fn default_environment() -> String {
    "development".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_console() -> bool {
    true
}

fn default_human_file() -> String {
    "application.log".to_owned()
}

fn default_json_file() -> String {
    "application.json".to_owned()
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn default_api_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_api_port() -> u16 {
    8080
}

/// Primary configuration object for the Pulse service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment label reported in logs and the service index.
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "PULSE_CONFIG";
    pub const ENV_ENVIRONMENT: &'static str = "APP_ENV";
    pub const ENV_LOG_LEVEL: &'static str = "LOG_LEVEL";
    pub const ENV_PORT: &'static str = "PORT";
    pub const ENV_HOST: &'static str = "HOST";

    /// Load configuration from `path`, or from `PULSE_CONFIG` when no path is
    /// given. Without either the defaults apply. Environment overrides are
    /// layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(Self::ENV_CONFIG_PATH)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Apply `APP_ENV`, `LOG_LEVEL`, `PORT` and `HOST` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(environment) = lookup(Self::ENV_ENVIRONMENT) {
            self.environment = environment;
        }
        if let Some(level) = lookup(Self::ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(port) = lookup(Self::ENV_PORT) {
            self.api.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got {port:?}", Self::ENV_PORT))?;
        }
        if let Some(host) = lookup(Self::ENV_HOST) {
            self.api.host = host
                .trim()
                .parse()
                .with_context(|| format!("{} must be an IP address, got {host:?}", Self::ENV_HOST))?;
        }
        self.validate()
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            return Err(anyhow!("environment label must not be empty"));
        }
        self.logging.validate()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Minimum severity shared by every sink.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Mirror human-readable records to stdout.
    #[serde(default = "default_console")]
    pub console: bool,
    #[serde(default = "default_human_file")]
    pub human_file: String,
    #[serde(default = "default_json_file")]
    pub json_file: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            level: default_log_level(),
            console: default_console(),
            human_file: default_human_file(),
            json_file: default_json_file(),
            max_file_bytes: default_max_file_bytes(),
            max_backups: default_max_backups(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        self.level_filter()?;
        if self.max_file_bytes == 0 {
            return Err(anyhow!("logging.max_file_bytes must be greater than zero"));
        }
        if self.human_file.trim().is_empty() || self.json_file.trim().is_empty() {
            return Err(anyhow!("logging file names must not be empty"));
        }
        Ok(())
    }

    /// Parse the configured level name.
    pub fn level_filter(&self) -> Result<LevelFilter> {
        parse_level(&self.level)
    }

    pub fn rotation(&self) -> RotationPolicy {
        RotationPolicy {
            max_bytes: self.max_file_bytes,
            max_backups: self.max_backups,
        }
    }

    pub fn human_path(&self) -> PathBuf {
        self.directory.join(&self.human_file)
    }

    pub fn json_path(&self) -> PathBuf {
        self.directory.join(&self.json_file)
    }
}

/// Parse a severity name, accepting the `warning` and `critical` aliases.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" => Ok(LevelFilter::ERROR),
        other => Err(anyhow!("unknown log level: {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: IpAddr,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl ApiConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
