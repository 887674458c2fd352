mod models;
mod service;
mod utils;

use crate::models::config::{parse_level, setup_config, Config};
use crate::models::manifest::{BackupManifest, MANIFEST_FILE_NAME};
use crate::service::backup::DatabaseBackup;
use crate::service::dump::DumpTools;
use crate::utils::logger::{LogOptions, LoggerRegistry};
use crate::utils::progress::format_bytes;
use crate::utils::prompt::confirm;
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const LOGGER_NAME: &str = "DatabaseBackup";

#[derive(Parser)]
#[command(name = "pg-backup")]
#[command(about = "PostgreSQL backup utility with verification and retention cleanup", long_about = None)]
struct Cli {
    #[arg(
        short = 'c',
        long = "config",
        default_value = "backup_config.json",
        env = "DB_BACKUP_CONFIG"
    )]
    config_file: String,

    /// Overrides log_level from the config file
    #[arg(short = 'l', long = "log-level", env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(short = 'z', long = "compression-level", value_parser = clap::value_parser!(u32).range(0..=9))]
    compression_level: Option<u32>,

    #[arg(short = 'k', long = "keep-days", value_parser = clap::value_parser!(u32).range(1..))]
    keep_days: Option<u32>,

    /// No console logging and no spinner
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Run retention cleanup without asking
    #[arg(short = 'y', long = "yes", conflicts_with = "no_cleanup")]
    yes: bool,

    #[arg(long = "no-cleanup")]
    no_cleanup: bool,

    #[arg(long = "validate-only")]
    validate_only: bool,

    /// Only verify an existing backup artifact
    #[arg(long = "verify", value_name = "PATH")]
    verify: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let bootstrap_level = args
        .log_level
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(log::LevelFilter::Warn);
    env_logger::Builder::from_default_env()
        .filter_level(bootstrap_level)
        .format_timestamp_secs()
        .init();

    match cli_main(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn cli_main(args: Cli) -> Result<()> {
    let mut config: Config = setup_config(args.config_file.clone()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args)?;
    debug!("Loaded config: {:?}", &config);

    if args.validate_only {
        info!("Configuration is valid. Exiting (--validate-only mode).");
        println!("Configuration is valid");
        return Ok(());
    }

    let mut registry = LoggerRegistry::new(&config.log_dir).context("Failed to set up logging")?;
    let logging = registry
        .configure(
            LOGGER_NAME,
            &LogOptions {
                level: config.level_filter(),
                console: config.log_to_console && !args.quiet,
                file: config.log_to_file,
                extra_logger: config.details_logger.clone(),
            },
        )
        .context("Failed to configure loggers")?;
    debug!("Log files for this run use timestamp {}", registry.timestamp());

    let tools = DumpTools {
        dump_command: config.dump_command.clone(),
        restore_command: config.restore_command.clone(),
    };
    let mut backup = DatabaseBackup::new(
        config.database.clone(),
        &config.backup_dir,
        tools,
        logging.clone(),
    )
    .with_progress(!args.quiet);

    let result = match &args.verify {
        Some(path) => verify_only(&mut backup, path),
        None => run_backup(&mut backup, &config, &args),
    };

    if let Err(e) = &result {
        logging.failure(format!("Fatal error: {:#}", e));
    }
    debug!("Backup job finished in state {}", backup.state());
    logging.flush();
    result
}

fn apply_overrides(config: &mut Config, args: &Cli) -> Result<()> {
    if let Some(level) = &args.log_level {
        if parse_level(level).is_none() {
            bail!("Unknown log level '{}'", level);
        }
        config.log_level = level.clone();
    }
    if let Some(level) = args.compression_level {
        config.compression_level = level;
    }
    if let Some(days) = args.keep_days {
        config.keep_days = days;
    }
    Ok(())
}

fn verify_only(backup: &mut DatabaseBackup, path: &Path) -> Result<()> {
    if backup.verify_backup(path) {
        backup.finish();
        println!("\nBackup verified successfully: {}", path.display());
        Ok(())
    } else {
        bail!("Backup verification failed: {}", path.display())
    }
}

fn run_backup(backup: &mut DatabaseBackup, config: &Config, args: &Cli) -> Result<()> {
    backup.logging().main.info("Starting database backup process");

    let backup_path = backup
        .create_backup(config.compression_level)
        .context("Database backup did not complete")?;

    if !backup.verify_backup(&backup_path) {
        println!("\nBackup verification failed!");
        bail!("Backup verification failed: {}", backup_path.display());
    }

    println!(
        "\nBackup created and verified successfully: {}",
        backup_path.display()
    );
    print_summary(backup);

    if should_cleanup(config.keep_days, args)? {
        let report = backup.cleanup_old_backups(config.keep_days);
        println!(
            "Old backups cleaned up ({} removed, {} failed)",
            report.removed.len(),
            report.failed.len()
        );
    }

    backup.finish();
    Ok(())
}

fn should_cleanup(keep_days: u32, args: &Cli) -> Result<bool> {
    if args.no_cleanup {
        return Ok(false);
    }
    if args.yes {
        return Ok(true);
    }
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut stdout = io::stdout();
    confirm(
        &mut reader,
        &mut stdout,
        &format!("Clean up backups older than {} days?", keep_days),
    )
    .context("Failed to read confirmation")
}

fn print_summary(backup: &DatabaseBackup) {
    if !backup.state().has_artifact() {
        return;
    }
    let Some(result) = backup.last_result() else {
        return;
    };
    println!(
        "  size: {}  duration: {:.1}s  compression level: {}",
        format_bytes(result.size),
        result.duration.as_secs_f64(),
        result.compression_level
    );
    let manifest_path = result.path.with_file_name(MANIFEST_FILE_NAME);
    match BackupManifest::read_from(&manifest_path) {
        Ok(_) => println!("  manifest: {}", manifest_path.display()),
        Err(e) => backup
            .logging()
            .main
            .warn(format!("Manifest unavailable at {}: {}", manifest_path.display(), e)),
    }
}
