use crate::models::backup_result::BackupResult;
use crate::models::backup_state::BackupState;
use crate::models::config::DatabaseConfig;
use crate::models::config_validator::MAX_COMPRESSION_LEVEL;
use crate::models::error::{BackupError, Result};
use crate::models::manifest::BackupManifest;
use crate::service::dump::DumpTools;
use crate::utils::logger::LoggingContext;
use crate::utils::progress::{create_spinner, format_bytes};
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name format of the per-run directory under the backup root
pub const BACKUP_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Runs one database's backup lifecycle: dump, manifest, verification and
/// retention cleanup.
pub struct DatabaseBackup {
    database: DatabaseConfig,
    backup_dir: PathBuf,
    tools: DumpTools,
    logging: LoggingContext,
    show_progress: bool,
    state: BackupState,
    last_result: Option<BackupResult>,
}

impl DatabaseBackup {
    pub fn new(
        database: DatabaseConfig,
        backup_dir: impl Into<PathBuf>,
        tools: DumpTools,
        logging: LoggingContext,
    ) -> Self {
        DatabaseBackup {
            database,
            backup_dir: backup_dir.into(),
            tools,
            logging,
            show_progress: false,
            state: BackupState::Idle,
            last_result: None,
        }
    }

    /// Show a spinner on the terminal while the dump tool runs
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn state(&self) -> BackupState {
        self.state
    }

    pub fn last_result(&self) -> Option<&BackupResult> {
        self.last_result.as_ref()
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn logging(&self) -> &LoggingContext {
        &self.logging
    }

    pub(crate) fn transition(&mut self, next: BackupState) {
        if self.state != next {
            self.logging
                .main
                .debug(format!("Backup state: {} -> {}", self.state, next));
            self.state = next;
        }
    }

    /// Marks the job as done unless a step already failed
    pub fn finish(&mut self) {
        if self.state != BackupState::Failed {
            self.transition(BackupState::Done);
        }
    }

    /// Dumps the database into a fresh timestamped directory and writes its
    /// manifest. Returns the artifact path.
    pub fn create_backup(&mut self, compression_level: u32) -> Result<PathBuf> {
        self.transition(BackupState::Dumping);
        match self.run_dump(compression_level) {
            Ok(result) => {
                self.transition(BackupState::Dumped);
                let path = result.path.clone();
                self.last_result = Some(result);
                Ok(path)
            }
            Err(e) => {
                self.logging.failure(format!("Error creating backup: {}", e));
                self.transition(BackupState::Failed);
                Err(e)
            }
        }
    }

    fn run_dump(&mut self, compression_level: u32) -> Result<BackupResult> {
        if compression_level > MAX_COMPRESSION_LEVEL {
            return Err(BackupError::InvalidCompressionLevel(compression_level));
        }

        let timestamp = Local::now().format(BACKUP_DIR_FORMAT).to_string();
        let run_dir = self.create_run_dir(&timestamp)?;

        let backup_path = run_dir.join(format!("{}_backup_{}.sql", self.database.name, timestamp));

        self.logging
            .main
            .info(format!("Starting database backup to {}", backup_path.display()));
        self.logging.detail(format!(
            "Backup configuration: compression_level={}",
            compression_level
        ));

        let mut cmd = self
            .tools
            .dump_command(&self.database, compression_level, &backup_path);

        let spinner = self
            .show_progress
            .then(|| create_spinner(&format!("Dumping database {}...", self.database.name)));
        let start = Instant::now();
        let output = cmd.output();
        if let Some(spinner) = &spinner {
            spinner.finish_and_clear();
        }
        let output = output.map_err(|cause| BackupError::ToolLaunch {
            tool: self.tools.dump_command.clone(),
            cause,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let status = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "terminated by signal".to_string());
            self.logging.failure(format!("Backup failed: {}", stderr));
            return Err(BackupError::DumpFailed { status, stderr });
        }

        let duration = start.elapsed();
        let size = fs::metadata(&backup_path)
            .map_err(|cause| BackupError::Metadata {
                path: backup_path.clone(),
                cause,
            })?
            .len();

        self.logging.main.info("Backup completed successfully");
        self.logging.detail(format!(
            "Backup details:\nDuration: {:.3}s\nSize: {}\nPath: {}",
            duration.as_secs_f64(),
            format_bytes(size),
            backup_path.display()
        ));

        let result = BackupResult {
            path: backup_path,
            size,
            duration,
            compression_level,
            timestamp,
        };
        self.write_manifest(&run_dir, &result);
        Ok(result)
    }

    /// A failed manifest write is logged but does not fail the backup.
    /// Creates `<backup_dir>/<timestamp>/`. The run directory itself must be
    /// new, so a second run within the same second fails instead of sharing
    /// (and overwriting) the first run's directory.
    fn create_run_dir(&self, timestamp: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir).map_err(|cause| BackupError::BackupDirectory {
            path: self.backup_dir.clone(),
            cause,
        })?;
        let run_dir = self.backup_dir.join(timestamp);
        fs::create_dir(&run_dir).map_err(|cause| BackupError::BackupDirectory {
            path: run_dir.clone(),
            cause,
        })?;
        Ok(run_dir)
    }

    fn write_manifest(&self, run_dir: &Path, result: &BackupResult) {
        let manifest = BackupManifest::from_result(&self.database.name, result);
        match manifest.write_to(run_dir) {
            Ok(path) => {
                self.logging
                    .main
                    .info(format!("Created backup manifest: {}", path.display()));
                self.logging
                    .detail(format!("Manifest metadata: {:?}", manifest));
            }
            Err(e) => self
                .logging
                .failure(format!("Error creating backup manifest: {}", e)),
        }
    }

    /// Structural check only: the artifact must exist, be non-empty, and be
    /// listable by the restore tool. Never returns an error.
    pub fn verify_backup(&mut self, backup_path: &Path) -> bool {
        self.transition(BackupState::Verifying);
        let verified = self.check_artifact(backup_path);
        if verified {
            self.transition(BackupState::Dumped);
        } else {
            self.transition(BackupState::Failed);
        }
        verified
    }

    fn check_artifact(&self, backup_path: &Path) -> bool {
        let size = match fs::metadata(backup_path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.logging.failure(format!(
                    "Backup file not found: {}",
                    backup_path.display()
                ));
                return false;
            }
            Err(e) => {
                self.logging.failure(format!("Error verifying backup: {}", e));
                return false;
            }
        };

        if size == 0 {
            self.logging
                .failure(format!("Backup file is empty: {}", backup_path.display()));
            return false;
        }

        let output = match self.tools.list_command(backup_path).output() {
            Ok(output) => output,
            Err(e) => {
                self.logging.failure(format!(
                    "Error verifying backup: failed to launch '{}': {}",
                    self.tools.restore_command, e
                ));
                return false;
            }
        };

        if output.status.success() {
            self.logging.main.info(format!(
                "Backup verified successfully: {}",
                backup_path.display()
            ));
            self.logging
                .detail(format!("Verified backup size: {}", format_bytes(size)));
            true
        } else {
            self.logging.failure(format!(
                "Backup verification failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
            false
        }
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::manifest::MANIFEST_FILE_NAME;
    use serial_test::serial;
    use tempfile::TempDir;

    fn read_log(logger: &crate::utils::logger::Logger) -> String {
        fs::read_to_string(logger.log_file().unwrap()).unwrap()
    }

    #[test]
    #[serial]
    fn test_successful_dump_writes_artifact_and_manifest() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);

        let path = backup.create_backup(9).unwrap();

        assert!(path.is_file());
        assert_eq!(fs::metadata(&path).unwrap().len(), 10);
        assert_eq!(backup.state(), BackupState::Dumped);

        let run_dir = path.parent().unwrap();
        assert_eq!(run_dir.parent().unwrap(), backup.backup_dir());
        let dir_name = run_dir.file_name().unwrap().to_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(dir_name, BACKUP_DIR_FORMAT).is_ok());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("inventory_backup_{}.sql", dir_name)
        );

        let manifest = fs::read_to_string(run_dir.join(MANIFEST_FILE_NAME)).unwrap();
        for key in ["timestamp", "database", "size", "duration", "compression_level"] {
            assert!(manifest.contains(&format!("{}: ", key)), "missing {}", key);
        }
        let parsed = BackupManifest::parse(&manifest).unwrap();
        assert_eq!(parsed.database, "inventory");
        assert_eq!(parsed.size, 10);
        assert_eq!(parsed.timestamp, dir_name);

        let result = backup.last_result().unwrap();
        assert_eq!(result.size, 10);
        assert_eq!(result.compression_level, 9);
    }

    #[test]
    #[serial]
    fn test_end_to_end_dump_and_verify() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);

        let path = backup.create_backup(9).unwrap();
        assert!(backup.verify_backup(&path));
        backup.finish();

        let manifest = fs::read_to_string(path.parent().unwrap().join(MANIFEST_FILE_NAME)).unwrap();
        assert!(manifest.lines().any(|l| l == "compression_level: 9"));
        assert_eq!(backup.state(), BackupState::Done);
    }

    #[test]
    #[serial]
    fn test_failed_dump_returns_stderr_and_writes_no_manifest() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(
            &temp,
            r#"echo "pg_dump: error: connection to server failed" >&2
exit 1"#,
            LIST_OK,
        );

        let err = backup.create_backup(9).unwrap_err();

        match &err {
            BackupError::DumpFailed { status, stderr } => {
                assert_eq!(status, "1");
                assert!(stderr.contains("connection to server failed"));
            }
            other => panic!("Expected DumpFailed, got {:?}", other),
        }
        assert_eq!(backup.state(), BackupState::Failed);
        assert!(backup.last_result().is_none());

        let run_dirs: Vec<_> = fs::read_dir(backup.backup_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(run_dirs.len(), 1);
        assert!(!run_dirs[0].join(MANIFEST_FILE_NAME).exists());

        let ctx = backup.logging();
        assert!(read_log(&ctx.main).contains("Backup failed: pg_dump: error"));
        assert!(read_log(ctx.details.as_ref().unwrap()).contains("Backup failed"));
    }

    #[test]
    #[serial]
    fn test_password_is_passed_through_environment_only() {
        let temp = TempDir::new().unwrap();
        let args_file = temp.path().join("args.txt");
        let env_file = temp.path().join("env.txt");
        let body = format!(
            "printf '%s\\n' \"$@\" > \"{}\"\nprintf '%s' \"$PGPASSWORD\" > \"{}\"\n{}",
            args_file.display(),
            env_file.display(),
            DUMP_TEN_BYTES
        );
        let mut backup = job(&temp, &body, LIST_OK);

        backup.create_backup(3).unwrap();

        let args = fs::read_to_string(&args_file).unwrap();
        assert!(!args.contains("hunter2"));
        assert!(args.lines().any(|l| l == "--no-owner"));
        assert!(args.lines().any(|l| l == "--no-privileges"));
        assert_eq!(fs::read_to_string(&env_file).unwrap(), "hunter2");
    }

    #[test]
    #[serial]
    fn test_missing_dump_tool_is_launch_error() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);
        backup.tools.dump_command = temp.path().join("no-such-tool").to_string_lossy().into_owned();

        let err = backup.create_backup(9).unwrap_err();

        assert!(matches!(err, BackupError::ToolLaunch { .. }));
        assert_eq!(backup.state(), BackupState::Failed);
    }

    #[test]
    #[serial]
    fn test_rejects_out_of_range_compression_level() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);

        let err = backup.create_backup(10).unwrap_err();

        assert!(matches!(err, BackupError::InvalidCompressionLevel(10)));
        assert!(!backup.backup_dir().exists());
    }

    #[test]
    #[serial]
    fn test_existing_run_dir_is_not_reused() {
        let temp = TempDir::new().unwrap();
        let backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);

        let first = backup.create_run_dir("20240315_120000").unwrap();
        fs::write(first.join("inventory_backup_20240315_120000.sql"), b"0123456789").unwrap();

        let err = backup.create_run_dir("20240315_120000").unwrap_err();

        match err {
            BackupError::BackupDirectory { path, cause } => {
                assert_eq!(path, first);
                assert_eq!(cause.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected error: {other}"),
        }
        let kept = fs::read(first.join("inventory_backup_20240315_120000.sql")).unwrap();
        assert_eq!(kept, b"0123456789");
    }

    #[test]
    #[serial]
    fn test_manifest_write_failure_does_not_fail_backup() {
        let temp = TempDir::new().unwrap();
        // A directory squatting on the manifest name makes the write fail
        let body = format!(
            "{}\nmkdir \"$(dirname \"$out\")/{}\"",
            DUMP_TEN_BYTES, MANIFEST_FILE_NAME
        );
        let mut backup = job(&temp, &body, LIST_OK);

        let path = backup.create_backup(9).unwrap();

        assert!(path.is_file());
        assert_eq!(backup.state(), BackupState::Dumped);
        assert!(read_log(&backup.logging().main).contains("Error creating backup manifest"));
    }

    #[test]
    #[serial]
    fn test_verify_missing_file_is_false() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);

        assert!(!backup.verify_backup(&temp.path().join("missing.sql")));
        assert_eq!(backup.state(), BackupState::Failed);
        assert!(read_log(&backup.logging().main).contains("Backup file not found"));
    }

    #[test]
    #[serial]
    fn test_verify_empty_file_is_false() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);
        let empty = temp.path().join("empty.sql");
        fs::write(&empty, b"").unwrap();

        assert!(!backup.verify_backup(&empty));
        assert!(read_log(&backup.logging().main).contains("Backup file is empty"));
    }

    #[test]
    #[serial]
    fn test_verify_false_when_list_fails() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(
            &temp,
            DUMP_TEN_BYTES,
            r#"echo "pg_restore: error: input file does not appear to be a valid archive" >&2
exit 1"#,
        );
        let artifact = temp.path().join("garbage.sql");
        fs::write(&artifact, b"not a dump").unwrap();

        assert!(!backup.verify_backup(&artifact));
        assert!(read_log(&backup.logging().main).contains("not appear to be a valid archive"));
    }

    #[test]
    #[serial]
    fn test_verify_true_when_list_succeeds() {
        let temp = TempDir::new().unwrap();
        let mut backup = job(&temp, DUMP_TEN_BYTES, LIST_OK);
        let artifact = temp.path().join("artifact.sql");
        fs::write(&artifact, b"0123456789").unwrap();

        assert!(backup.verify_backup(&artifact));
        assert_eq!(backup.state(), BackupState::Dumped);
        let details = read_log(backup.logging().details.as_ref().unwrap());
        assert!(details.contains("Verified backup size: 10 B"));
    }
}
