use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Console logger plus an optional fault log that receives every warning and error, whatever
/// the console filter lets through.
pub struct FaultTeeLogger {
    console: env_logger::Logger,
    fault_log: Option<Mutex<File>>,
}

impl FaultTeeLogger {
    pub fn new(console: env_logger::Logger, fault_log: Option<File>) -> Self {
        Self {
            console,
            fault_log: fault_log.map(Mutex::new),
        }
    }

    /// Most verbose level any sink wants.
    pub fn max_level(&self) -> LevelFilter {
        let console = self.console.filter();
        match &self.fault_log {
            Some(_) => console.max(LevelFilter::Warn),
            None => console,
        }
    }

    /// Append a warning-or-above record to the fault log. Plain text, no colors.
    fn append_fault(&self, record: &Record) {
        let Some(fault_log) = &self.fault_log else {
            return;
        };
        let mut file = fault_log.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(
            file,
            "{} - {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
    }
}

impl Log for FaultTeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        (self.fault_log.is_some() && metadata.level() <= Level::Warn)
            || self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if record.level() <= Level::Warn {
            self.append_fault(record);
        }
        if self.console.matches(record) {
            self.console.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(fault_log) = &self.fault_log {
            let _ = fault_log.lock().unwrap_or_else(|e| e.into_inner()).flush();
        }
    }
}

/// Console logger with colored level tags, filtered by `RUST_LOG` or the verbosity flag.
pub fn console_logger(verbose: bool) -> env_logger::Logger {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level) // Our crate: use requested level
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        _ => "ERROR".red(),
                    };
                    let path = record.target().to_string().white();
                    format!("[{} {} {}] {}", name.cyan(), level_str, path, record.args())
                }
                _ => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .build()
}

/// Set up logging. When `fault_log` is given, warnings and errors are also appended to that
/// file. Safe to call more than once; later calls are no-ops.
pub fn setup_logging(verbose: bool, fault_log: Option<&Path>) {
    let fault_file = fault_log.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("cannot open fault log {}: {}", path.display(), e))
            .ok()
    });

    let logger = FaultTeeLogger::new(console_logger(verbose), fault_file);
    let max_level = logger.max_level();
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_only_console() -> env_logger::Logger {
        Builder::new().filter_level(LevelFilter::Error).build()
    }

    #[test]
    fn warnings_reach_fault_log_when_console_shows_errors_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let logger = FaultTeeLogger::new(error_only_console(), Some(file));
        assert_eq!(logger.max_level(), LevelFilter::Warn);

        let warn_meta = Metadata::builder()
            .level(Level::Warn)
            .target("batchqc")
            .build();
        assert!(logger.enabled(&warn_meta));

        for (level, msg) in [
            (Level::Warn, "slide looks odd"),
            (Level::Info, "working on slide"),
            (Level::Error, "slide unreadable"),
        ] {
            logger.log(
                &Record::builder()
                    .level(level)
                    .target("batchqc")
                    .args(format_args!("{msg}"))
                    .build(),
            );
        }
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("WARN - slide looks odd"));
        assert!(content.contains("ERROR - slide unreadable"));
        assert!(!content.contains("working on slide"));
    }

    #[test]
    fn without_fault_log_console_filter_decides() {
        let logger = FaultTeeLogger::new(error_only_console(), None);
        assert_eq!(logger.max_level(), LevelFilter::Error);
        let warn_meta = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&warn_meta));
    }
}
