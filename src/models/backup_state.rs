use std::fmt;

/// Lifecycle of a single backup job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    /// Nothing has run yet
    Idle,

    /// The dump tool is running
    Dumping,

    /// The dump tool exited successfully and the artifact is on disk
    Dumped,

    /// The artifact is being listed by the restore tool
    Verifying,

    /// Old backup directories are being removed
    Cleaning,

    /// Every requested step completed
    Done,

    /// A step failed; the job stays here until a new backup starts
    Failed,
}

impl BackupState {
    /// Returns true if an artifact from this run is available
    pub fn has_artifact(&self) -> bool {
        matches!(
            self,
            BackupState::Dumped | BackupState::Verifying | BackupState::Cleaning | BackupState::Done
        )
    }
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupState::Idle => "idle",
            BackupState::Dumping => "dumping",
            BackupState::Dumped => "dumped",
            BackupState::Verifying => "verifying",
            BackupState::Cleaning => "cleaning",
            BackupState::Done => "done",
            BackupState::Failed => "failed",
        };
        f.write_str(name)
    }
}
