use crate::models::backup_result::BackupResult;
use crate::models::error::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MANIFEST_FILE_NAME: &str = "backup_manifest.txt";
const MANIFEST_TITLE: &str = "Database Backup Manifest";

/// Metadata written next to every backup artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupManifest {
    pub timestamp: String,
    pub database: String,
    pub size: u64,
    pub duration: Duration,
    pub compression_level: u32,
}

impl BackupManifest {
    pub fn from_result(database: &str, result: &BackupResult) -> Self {
        BackupManifest {
            timestamp: result.timestamp.clone(),
            database: database.to_string(),
            size: result.size,
            duration: result.duration,
            compression_level: result.compression_level,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(MANIFEST_TITLE);
        out.push('\n');
        out.push_str(&"=".repeat(MANIFEST_TITLE.len()));
        out.push_str("\n\n");
        for (key, value) in self.entries() {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        out
    }

    fn entries(&self) -> [(&'static str, String); 5] {
        [
            ("timestamp", self.timestamp.clone()),
            ("database", self.database.clone()),
            ("size", self.size.to_string()),
            ("duration", format!("{:.3}s", self.duration.as_secs_f64())),
            ("compression_level", self.compression_level.to_string()),
        ]
    }

    /// Writes the manifest into `dir`; the file is created fresh each time.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE_NAME);
        fs::write(&path, self.render()).map_err(|cause| BackupError::ManifestWrite {
            path: path.clone(),
            cause,
        })?;
        Ok(path)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses the `key: value` lines, ignoring the title block.
    pub fn parse(content: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut database = None;
        let mut size = None;
        let mut duration = None;
        let mut compression_level = None;

        for line in content.lines() {
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "timestamp" => timestamp = Some(value.to_string()),
                "database" => database = Some(value.to_string()),
                "size" => size = Some(parse_number::<u64>("size", value)?),
                "duration" => duration = Some(parse_duration(value)?),
                "compression_level" => {
                    compression_level = Some(parse_number::<u32>("compression_level", value)?)
                }
                _ => {}
            }
        }

        Ok(BackupManifest {
            timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
            database: database.ok_or_else(|| missing("database"))?,
            size: size.ok_or_else(|| missing("size"))?,
            duration: duration.ok_or_else(|| missing("duration"))?,
            compression_level: compression_level.ok_or_else(|| missing("compression_level"))?,
        })
    }
}

fn missing(key: &str) -> BackupError {
    BackupError::ManifestParse(format!("missing key '{}'", key))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| BackupError::ManifestParse(format!("invalid {} '{}'", key, value)))
}

fn parse_duration(value: &str) -> Result<Duration> {
    let secs = value.strip_suffix('s').unwrap_or(value);
    let secs: f64 = parse_number("duration", secs)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(BackupError::ManifestParse(format!(
            "invalid duration '{}'",
            value
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> BackupManifest {
        BackupManifest {
            timestamp: "20240102_030405".to_string(),
            database: "inventory".to_string(),
            size: 10,
            duration: Duration::from_millis(1500),
            compression_level: 9,
        }
    }

    #[test]
    fn test_render_has_title_and_all_keys() {
        let rendered = sample().render();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "Database Backup Manifest");
        assert!(lines[1].chars().all(|c| c == '='));
        assert_eq!(lines[2], "");
        assert_eq!(
            &lines[3..],
            &[
                "timestamp: 20240102_030405",
                "database: inventory",
                "size: 10",
                "duration: 1.500s",
                "compression_level: 9",
            ]
        );
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = sample().write_to(dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), MANIFEST_FILE_NAME);
        assert_eq!(BackupManifest::read_from(&path).unwrap(), sample());
    }

    #[test]
    fn test_parse_reports_missing_key() {
        let err = BackupManifest::parse("timestamp: 20240102_030405\ndatabase: inventory\n")
            .unwrap_err();
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn test_parse_rejects_bad_size() {
        let content = sample().render().replace("size: 10", "size: ten");
        let err = BackupManifest::parse(&content).unwrap_err();
        assert!(err.to_string().contains("invalid size"));
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let result = sample().write_to(&dir.path().join("gone"));
        assert!(matches!(result, Err(BackupError::ManifestWrite { .. })));
    }
}
