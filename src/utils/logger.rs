use crate::models::error::{BackupError, Result};
use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where a logger sends its formatted lines
enum Sink {
    /// `<LEVEL>: <message>` on stdout
    Console,
    /// `<timestamp> - <LEVEL> - <message>` appended to a file
    File { path: PathBuf, file: Mutex<File> },
}

impl Sink {
    fn open_file(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|cause| BackupError::LogFile {
                path: path.clone(),
                cause,
            })?;
        Ok(Sink::File {
            path,
            file: Mutex::new(file),
        })
    }

    fn write(&self, record: &Record) {
        // Ignore write errors; there is nowhere left to report them
        match self {
            Sink::Console => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                let _ = writeln!(handle, "{}: {}", record.level(), record.args());
            }
            Sink::File { file, .. } => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(
                        file,
                        "{} - {} - {}",
                        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                        record.level(),
                        record.args()
                    );
                }
            }
        }
    }

    fn flush(&self) {
        match self {
            Sink::Console => {
                let _ = io::stdout().flush();
            }
            Sink::File { file, .. } => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
        }
    }
}

/// A named logger handle with its own level and sinks
pub struct Logger {
    name: String,
    level: RwLock<LevelFilter>,
    sinks: RwLock<Vec<Sink>>,
}

impl Logger {
    fn new(name: &str) -> Self {
        Logger {
            name: name.to_string(),
            level: RwLock::new(LevelFilter::Info),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LevelFilter {
        self.level.read().map(|l| *l).unwrap_or(LevelFilter::Off)
    }

    #[allow(dead_code)]
    pub fn sink_count(&self) -> usize {
        self.sinks.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Path of the file sink, if one is attached
    pub fn log_file(&self) -> Option<PathBuf> {
        let sinks = self.sinks.read().ok()?;
        sinks.iter().find_map(|sink| match sink {
            Sink::File { path, .. } => Some(path.clone()),
            Sink::Console => None,
        })
    }

    /// Drops every existing sink and installs `sinks` in their place
    fn replace_sinks(&self, level: LevelFilter, sinks: Vec<Sink>) {
        if let Ok(mut current) = self.level.write() {
            *current = level;
        }
        if let Ok(mut current) = self.sinks.write() {
            *current = sinks;
        }
    }

    pub fn emit(&self, level: Level, message: impl Display) {
        self.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(&self.name)
                .build(),
        );
    }

    pub fn error(&self, message: impl Display) {
        self.emit(Level::Error, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.emit(Level::Warn, message);
    }

    pub fn info(&self, message: impl Display) {
        self.emit(Level::Info, message);
    }

    pub fn debug(&self, message: impl Display) {
        self.emit(Level::Debug, message);
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(sinks) = self.sinks.read() {
            for sink in sinks.iter() {
                sink.write(record);
            }
        }
    }

    fn flush(&self) {
        if let Ok(sinks) = self.sinks.read() {
            for sink in sinks.iter() {
                sink.flush();
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: LevelFilter,
    pub console: bool,
    pub file: bool,
    /// Name of a secondary file-only logger for detailed output
    pub extra_logger: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: LevelFilter::Info,
            console: true,
            file: true,
            extra_logger: None,
        }
    }
}

/// The pair of handles a backup run logs through
#[derive(Clone)]
pub struct LoggingContext {
    pub main: Arc<Logger>,
    pub details: Option<Arc<Logger>>,
}

impl LoggingContext {
    /// Logs to the details stream when one is configured
    pub fn detail(&self, message: impl Display) {
        if let Some(details) = &self.details {
            details.info(message);
        }
    }

    /// Logs an error to both streams
    pub fn failure(&self, message: impl Display) {
        let message = message.to_string();
        self.main.error(&message);
        if let Some(details) = &self.details {
            details.error(&message);
        }
    }

    pub fn flush(&self) {
        self.main.flush();
        if let Some(details) = &self.details {
            details.flush();
        }
    }
}

/// Owns every logger created during one run.
///
/// All log files share the timestamp fixed when the registry is created.
/// Configuring a name that already exists reuses the handle and replaces
/// its sinks, so repeated configuration never duplicates output.
pub struct LoggerRegistry {
    log_dir: PathBuf,
    timestamp: String,
    loggers: HashMap<String, Arc<Logger>>,
}

impl LoggerRegistry {
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_timestamp(log_dir, Local::now().format(RUN_TIMESTAMP_FORMAT).to_string())
    }

    pub fn with_timestamp(log_dir: impl AsRef<Path>, timestamp: String) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir).map_err(|cause| BackupError::LogDirectory {
            path: log_dir.clone(),
            cause,
        })?;
        Ok(LoggerRegistry {
            log_dir,
            timestamp,
            loggers: HashMap::new(),
        })
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[allow(dead_code)]
    pub fn get(&self, name: &str) -> Option<Arc<Logger>> {
        self.loggers.get(name).cloned()
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir
            .join(format!("{}_{}.log", name.to_lowercase(), self.timestamp))
    }

    fn handle(&mut self, name: &str) -> Arc<Logger> {
        self.loggers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Logger::new(name)))
            .clone()
    }

    pub fn configure(&mut self, name: &str, options: &LogOptions) -> Result<LoggingContext> {
        let mut sinks = Vec::new();
        if options.file {
            sinks.push(Sink::open_file(self.log_path(name))?);
        }
        if options.console {
            sinks.push(Sink::Console);
        }

        let main = self.handle(name);
        main.replace_sinks(options.level, sinks);

        if let Some(path) = main.log_file() {
            main.info(format!("Logging to file: {}", path.display()));
        }

        let details = match &options.extra_logger {
            Some(extra) => Some(self.configure_extra(&main, extra, options.level)?),
            None => None,
        };

        main.info(format!("Logger initialized: {}", name));
        Ok(LoggingContext { main, details })
    }

    fn configure_extra(
        &mut self,
        main: &Logger,
        extra: &str,
        level: LevelFilter,
    ) -> Result<Arc<Logger>> {
        let sink = Sink::open_file(self.log_path(extra))?;
        let logger = self.handle(&format!("{}_{}", main.name(), extra));
        logger.replace_sinks(level, vec![sink]);
        main.info(format!("Extra logger initialized: {}", extra));
        Ok(logger)
    }
}
