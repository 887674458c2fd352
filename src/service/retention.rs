use crate::models::backup_state::BackupState;
use crate::service::backup::{DatabaseBackup, BACKUP_DIR_FORMAT};
use chrono::{DateTime, Duration, Local, NaiveDateTime};
use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// What a retention sweep touched
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl DatabaseBackup {
    /// Removes backup directories older than `keep_days` days.
    ///
    /// A directory's age comes from the run timestamp in its name when the
    /// name parses as one; the modification time is only used for other
    /// names. A copy restored under an old run name is aged by that name.
    pub fn cleanup_old_backups(&mut self, keep_days: u32) -> CleanupReport {
        self.cleanup_old_backups_at(keep_days, Local::now().naive_local())
    }

    /// Same as [`cleanup_old_backups`](Self::cleanup_old_backups) with an
    /// explicit "now". Each directory is handled on its own; one failed
    /// removal does not stop the sweep.
    pub fn cleanup_old_backups_at(&mut self, keep_days: u32, now: NaiveDateTime) -> CleanupReport {
        self.sweep(keep_days, now, |path| fs::remove_dir_all(path))
    }

    fn sweep(
        &mut self,
        keep_days: u32,
        now: NaiveDateTime,
        mut remove: impl FnMut(&Path) -> io::Result<()>,
    ) -> CleanupReport {
        self.transition(BackupState::Cleaning);
        let cutoff = now - Duration::days(i64::from(keep_days));
        let mut report = CleanupReport::default();

        let entries = match fs::read_dir(self.backup_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                self.logging().failure(format!(
                    "Error cleaning up old backups in {}: {}",
                    self.backup_dir().display(),
                    e
                ));
                self.transition(BackupState::Done);
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.logging()
                        .failure(format!("Error reading backup directory entry: {}", e));
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            report.scanned += 1;

            let path = entry.path();
            let Some(created) = created_at(&entry) else {
                self.logging().main.warn(format!(
                    "Skipping backup with unknown creation time: {}",
                    path.display()
                ));
                continue;
            };
            if created >= cutoff {
                continue;
            }

            match remove(&path) {
                Ok(()) => {
                    let age_days = (now - created).num_seconds() as f64 / SECONDS_PER_DAY;
                    self.logging()
                        .main
                        .info(format!("Removed old backup: {}", path.display()));
                    self.logging().detail(format!(
                        "Cleanup details:\nPath: {}\nAge: {:.1} days",
                        path.display(),
                        age_days
                    ));
                    report.removed.push(path);
                }
                Err(e) => {
                    self.logging().failure(format!(
                        "Error removing old backup {}: {}",
                        path.display(),
                        e
                    ));
                    report.failed.push(path);
                }
            }
        }

        self.logging().main.info(format!(
            "Cleanup finished: {} scanned, {} removed, {} failed",
            report.scanned,
            report.removed.len(),
            report.failed.len()
        ));
        self.transition(BackupState::Done);
        report
    }
}

/// The run timestamp in the directory name, or the modification time for
/// directories that were not created by a backup run.
fn created_at(entry: &DirEntry) -> Option<NaiveDateTime> {
    let name = entry.file_name();
    if let Some(parsed) = name
        .to_str()
        .and_then(|n| NaiveDateTime::parse_from_str(n, BACKUP_DIR_FORMAT).ok())
    {
        return Some(parsed);
    }
    let modified = entry.metadata().ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}
