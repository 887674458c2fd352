use crate::models::config::{parse_level, Config, DatabaseConfig};
use crate::models::error::{BackupError, Result};
use log::{info, warn};
use std::path::Path;

pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Validates the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    info!("Validating configuration...");

    validate_database(&config.database)?;
    validate_numeric_values(config)?;
    validate_commands(config)?;
    validate_backup_dir(&config.backup_dir)?;
    validate_logging(config)?;

    info!("Configuration validation passed");
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<()> {
    if database.name.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "database.name must not be empty".to_string(),
        ));
    }
    if database.user.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "database.user must not be empty".to_string(),
        ));
    }
    if database.host.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "database.host must not be empty".to_string(),
        ));
    }
    if database.password.is_empty() {
        warn!(
            "No database password configured; pg_dump will fall back to .pgpass or trust authentication"
        );
    }
    Ok(())
}

fn validate_numeric_values(config: &Config) -> Result<()> {
    if config.compression_level > MAX_COMPRESSION_LEVEL {
        return Err(BackupError::ConfigInvalid(format!(
            "compression_level must be between 0 and {}, got {}",
            MAX_COMPRESSION_LEVEL, config.compression_level
        )));
    }

    if config.keep_days == 0 {
        return Err(BackupError::ConfigInvalid(
            "keep_days must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_commands(config: &Config) -> Result<()> {
    if config.dump_command.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "dump_command must not be empty".to_string(),
        ));
    }
    if config.restore_command.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "restore_command must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// The backup root may not exist yet, but it must not be a regular file.
fn validate_backup_dir(backup_dir: &str) -> Result<()> {
    if backup_dir.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "backup_dir must not be empty".to_string(),
        ));
    }

    let path = Path::new(backup_dir);
    if path.exists() && !path.is_dir() {
        return Err(BackupError::ConfigInvalid(format!(
            "backup_dir exists but is not a directory: {}",
            backup_dir
        )));
    }
    if !path.exists() {
        warn!("Backup directory does not exist but will be created: {}", backup_dir);
    }
    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    if parse_level(&config.log_level).is_none() {
        return Err(BackupError::ConfigInvalid(format!(
            "Unknown log_level '{}'. Expected one of: trace, debug, info, warn, error, off",
            config.log_level
        )));
    }

    if config.log_to_file && config.log_dir.trim().is_empty() {
        return Err(BackupError::ConfigInvalid(
            "log_dir must not be empty when log_to_file is enabled".to_string(),
        ));
    }

    if let Some(details) = &config.details_logger {
        if details.trim().is_empty() {
            return Err(BackupError::ConfigInvalid(
                "details_logger must not be an empty string; omit it or set it to null".to_string(),
            ));
        }
    }

    if !config.log_to_console && !config.log_to_file {
        warn!("Both log_to_console and log_to_file are disabled - the main log will be silent");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_config(backup_dir: &str) -> Config {
        Config {
            database: DatabaseConfig {
                name: "inventory".to_string(),
                user: "backup".to_string(),
                password: "secret".to_string(),
                host: "localhost".to_string(),
                port: None,
            },
            backup_dir: backup_dir.to_string(),
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
            log_to_console: true,
            log_to_file: true,
            details_logger: Some("backup_details".to_string()),
            compression_level: 9,
            keep_days: 30,
            dump_command: "pg_dump".to_string(),
            restore_command: "pg_restore".to_string(),
        }
    }

    #[test]
    fn test_validate_config_passes_for_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(temp_dir.path().to_str().unwrap());

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_compression_level_above_nine() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(temp_dir.path().to_str().unwrap());
        config.compression_level = 10;

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("compression_level"));
    }

    #[test]
    fn test_rejects_zero_keep_days() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(temp_dir.path().to_str().unwrap());
        config.keep_days = 0;

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("keep_days"));
    }

    #[test]
    fn test_rejects_empty_database_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(temp_dir.path().to_str().unwrap());
        config.database.name = "  ".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("database.name"));
    }

    #[test]
    fn test_rejects_backup_dir_that_is_a_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = create_test_config(temp_file.path().to_str().unwrap());

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_accepts_missing_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("not-yet-created");
        let config = create_test_config(missing.to_str().unwrap());

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(temp_dir.path().to_str().unwrap());
        config.log_level = "chatty".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("Unknown log_level"));
    }

    #[test]
    fn test_rejects_empty_dump_command() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(temp_dir.path().to_str().unwrap());
        config.dump_command = String::new();

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("dump_command"));
    }
}
