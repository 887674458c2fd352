use crate::models::config::DatabaseConfig;
use std::path::Path;
use std::process::Command;

/// Environment variable the dump tool reads its password from.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// External programs used to produce and inspect backups
#[derive(Debug, Clone)]
pub struct DumpTools {
    pub dump_command: String,
    pub restore_command: String,
}

impl Default for DumpTools {
    fn default() -> Self {
        DumpTools {
            dump_command: "pg_dump".to_string(),
            restore_command: "pg_restore".to_string(),
        }
    }
}

impl DumpTools {
    /// Custom-format dump with large objects, no ownership or privilege
    /// statements. The password only travels through the child environment.
    pub fn dump_command(
        &self,
        database: &DatabaseConfig,
        compression_level: u32,
        output: &Path,
    ) -> Command {
        let mut cmd = Command::new(&self.dump_command);
        cmd.env(PASSWORD_ENV, &database.password)
            .args(dump_args(database, compression_level))
            .arg("-f")
            .arg(output)
            .arg(&database.name);
        cmd
    }

    /// Table-of-contents listing, used as a structural check of an artifact
    pub fn list_command(&self, artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.restore_command);
        cmd.arg("-l").arg(artifact);
        cmd
    }
}

fn dump_args(database: &DatabaseConfig, compression_level: u32) -> Vec<String> {
    let mut args = vec!["-h".to_string(), database.host.clone()];
    if let Some(port) = database.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    args.extend([
        "-U".to_string(),
        database.user.clone(),
        "-F".to_string(),
        "c".to_string(),
        "-b".to_string(),
        "-v".to_string(),
        "-Z".to_string(),
        compression_level.to_string(),
        "--no-owner".to_string(),
        "--no-privileges".to_string(),
    ]);
    args
}
