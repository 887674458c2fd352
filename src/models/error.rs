use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to read config file '{path}': {cause}")]
    ConfigRead { path: PathBuf, cause: io::Error },

    #[error("Failed to parse config file '{path}': {cause}")]
    ConfigParse {
        path: PathBuf,
        cause: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to create log directory '{path}': {cause}")]
    LogDirectory { path: PathBuf, cause: io::Error },

    #[error("Failed to open log file '{path}': {cause}")]
    LogFile { path: PathBuf, cause: io::Error },

    #[error("Failed to create backup directory '{path}': {cause}")]
    BackupDirectory { path: PathBuf, cause: io::Error },

    #[error("Compression level must be between 0 and 9, got {0}")]
    InvalidCompressionLevel(u32),

    #[error("Failed to launch '{tool}': {cause}")]
    ToolLaunch { tool: String, cause: io::Error },

    #[error("Backup failed (exit status {status}): {stderr}")]
    DumpFailed { status: String, stderr: String },

    #[error("Failed to get metadata for '{path}': {cause}")]
    Metadata { path: PathBuf, cause: io::Error },

    #[error("Failed to write manifest '{path}': {cause}")]
    ManifestWrite { path: PathBuf, cause: io::Error },

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
