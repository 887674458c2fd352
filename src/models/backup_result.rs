use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a successful dump invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupResult {
    pub path: PathBuf,
    pub size: u64,
    pub duration: Duration,
    pub compression_level: u32,
    pub timestamp: String,
}
