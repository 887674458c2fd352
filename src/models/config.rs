use crate::models::config_validator::validate_config;
use crate::models::error::{BackupError, Result};
use log::{info, LevelFilter};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Environment variable that supplies (or overrides) the database password.
pub const PASSWORD_ENV_VAR: &str = "DB_BACKUP_PASSWORD";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "bool_true")]
    pub log_to_console: bool,
    #[serde(default = "bool_true")]
    pub log_to_file: bool,
    #[serde(default = "default_details_logger")]
    pub details_logger: Option<String>,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default = "default_keep_days")]
    pub keep_days: u32,
    #[serde(default = "default_dump_command")]
    pub dump_command: String,
    #[serde(default = "default_restore_command")]
    pub restore_command: String,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

// Keeps the password out of debug logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

fn default_backup_dir() -> String {
    "backups".to_string()
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_details_logger() -> Option<String> {
    Some("backup_details".to_string())
}
fn default_dump_command() -> String {
    "pg_dump".to_string()
}
fn default_restore_command() -> String {
    "pg_restore".to_string()
}
const fn default_compression_level() -> u32 {
    9
}
const fn default_keep_days() -> u32 {
    30
}
const fn bool_true() -> bool {
    true
}

impl Config {
    pub fn level_filter(&self) -> LevelFilter {
        parse_level(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

pub fn setup_config(config_file: String) -> Result<Config> {
    let config_path = PathBuf::from(config_file);
    info!("Loading config from: {}", config_path.display());

    let config_str = fs::read_to_string(&config_path).map_err(|cause| {
        BackupError::ConfigRead {
            path: config_path.clone(),
            cause,
        }
    })?;

    let mut config: Config = serde_json::from_str(&config_str).map_err(|cause| {
        BackupError::ConfigParse {
            path: config_path,
            cause,
        }
    })?;

    if let Ok(password) = env::var(PASSWORD_ENV_VAR) {
        info!("Using database password from {}", PASSWORD_ENV_VAR);
        config.database.password = password;
    }

    validate_config(&config)?;

    Ok(config)
}
