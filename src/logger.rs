/// Walletpulse Logger with File Persistence
///
/// Dual output: colored console logging and clean text file logging.
///
/// ## Features:
/// - **Console Logging**: Colored output with fixed-width tags
/// - **File Logging**: Plain text logs stored in `logs/walletpulse_<start>.log`
/// - **Retention**: Old log files removed after the retention period
/// - **Thread-Safe**: Concurrent logging from multiple async tasks
/// - **Graceful Fallback**: If file logging fails, console logging continues
///
/// ## Usage:
/// ```rust,ignore
/// use walletpulse::logger::{self, log, LogTag};
///
/// logger::init_file_logging();
///
/// log(LogTag::System, "INFO", "Pipeline started");
/// logger::info(LogTag::Stream, "Shard 0 connected");
/// ```

/// Set to false to hide date in logs
const LOG_SHOW_DATE: bool = false;
/// Set to false to hide time in logs
const LOG_SHOW_TIME: bool = true;

/// File logging configuration
const ENABLE_FILE_LOGGING: bool = true;
const LOG_RETENTION_HOURS: u64 = 24;
const MAX_LOG_FILES: usize = 7;

/// Log Tag Configuration - Set to false to disable specific tags
const ENABLE_SYSTEM_LOGS: bool = true;
const ENABLE_STREAM_LOGS: bool = true;
const ENABLE_INGEST_LOGS: bool = true;
const ENABLE_CLASSIFY_LOGS: bool = true;
const ENABLE_DEDUP_LOGS: bool = true;
const ENABLE_DATABASE_LOGS: bool = true;
const ENABLE_FANOUT_LOGS: bool = true;
const ENABLE_METADATA_LOGS: bool = true;
const ENABLE_SOL_PRICE_LOGS: bool = true;
const ENABLE_WALLET_LOGS: bool = true;
const ENABLE_RPC_LOGS: bool = true;
const ENABLE_OTHER_LOGS: bool = true;

/// Log Type Configuration - Set to false to disable specific log types
const ENABLE_ERROR_LOGS: bool = true;
const ENABLE_WARN_LOGS: bool = true;
const ENABLE_SUCCESS_LOGS: bool = true;
const ENABLE_INFO_LOGS: bool = true;
const ENABLE_DEBUG_LOGS: bool = false;
const ENABLE_GENERAL_LOGS: bool = true;

/// Fixed tag column width for aligned output
const TAG_WIDTH: usize = 8;

use chrono::Local;
use colored::*;
use once_cell::sync::Lazy;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// File logger state for thread-safe file operations
struct FileLogger {
    file_writer: Option<BufWriter<File>>,
    log_dir: PathBuf,
    write_counter: u64,
}

impl FileLogger {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let log_dir = PathBuf::from(crate::global::LOGS_DIR);
        fs::create_dir_all(&log_dir)?;

        // Unique log file per application start
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let log_file_path = log_dir.join(format!("walletpulse_{}.log", timestamp));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)?;

        Ok(FileLogger {
            file_writer: Some(BufWriter::new(file)),
            log_dir,
            write_counter: 0,
        })
    }

    fn write_to_file(&mut self, message: &str) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut writer) = self.file_writer {
            writeln!(writer, "{}", message)?;
            writer.flush()?;

            self.write_counter += 1;
            if self.write_counter % 500 == 0 {
                let _ = self.cleanup_old_logs();
            }
        }
        Ok(())
    }

    fn cleanup_old_logs(&self) -> Result<(), Box<dyn std::error::Error>> {
        let cutoff = std::time::SystemTime::now()
            - std::time::Duration::from_secs(LOG_RETENTION_HOURS * 3600);

        let mut log_files: Vec<_> = fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with("walletpulse_") && name.ends_with(".log")
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        let excess = log_files.len().saturating_sub(MAX_LOG_FILES);
        for (i, entry) in log_files.iter().enumerate() {
            let too_old = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|t| t < cutoff)
                .unwrap_or(false);

            if i < excess || too_old {
                let _ = fs::remove_file(entry.path());
            }
        }

        Ok(())
    }
}

static FILE_LOGGER: Lazy<Mutex<Option<FileLogger>>> = Lazy::new(|| Mutex::new(None));

/// Initialize file logging (call once at startup)
pub fn init_file_logging() {
    if !ENABLE_FILE_LOGGING {
        return;
    }

    match FileLogger::new() {
        Ok(logger) => {
            if let Ok(mut guard) = FILE_LOGGER.lock() {
                *guard = Some(logger);
            }
        }
        Err(e) => {
            eprintln!("⚠️  File logging disabled: {}", e);
        }
    }
}

// =============================================================================
// LOG TAGS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LogTag {
    System,
    Stream,
    Ingest,
    Classify,
    Dedup,
    Database,
    Fanout,
    Metadata,
    SolPrice,
    Wallet,
    Rpc,
    Other(String),
}

impl LogTag {
    fn label(&self) -> String {
        let s = match self {
            LogTag::System => "SYSTEM",
            LogTag::Stream => "STREAM",
            LogTag::Ingest => "INGEST",
            LogTag::Classify => "CLASSIFY",
            LogTag::Dedup => "DEDUP",
            LogTag::Database => "DB",
            LogTag::Fanout => "FANOUT",
            LogTag::Metadata => "METADATA",
            LogTag::SolPrice => "PRICE",
            LogTag::Wallet => "WALLET",
            LogTag::Rpc => "RPC",
            LogTag::Other(s) => s.as_str(),
        };
        format!("{:<width$}", s, width = TAG_WIDTH)
    }

    fn colored_label(&self) -> ColoredString {
        let label = self.label();
        match self {
            LogTag::System => label.bright_yellow().bold(),
            LogTag::Stream => label.bright_cyan().bold(),
            LogTag::Ingest => label.bright_blue().bold(),
            LogTag::Classify => label.bright_green().bold(),
            LogTag::Dedup => label.bright_white().bold(),
            LogTag::Database => label.bright_magenta().bold(),
            LogTag::Fanout => label.bright_purple().bold(),
            LogTag::Metadata => label.bright_white().bold(),
            LogTag::SolPrice => label.bright_green().bold(),
            LogTag::Wallet => label.bright_magenta().bold(),
            LogTag::Rpc => label.bright_cyan().bold(),
            LogTag::Other(_) => label.white().bold(),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            LogTag::System => ENABLE_SYSTEM_LOGS,
            LogTag::Stream => ENABLE_STREAM_LOGS,
            LogTag::Ingest => ENABLE_INGEST_LOGS,
            LogTag::Classify => ENABLE_CLASSIFY_LOGS,
            LogTag::Dedup => ENABLE_DEDUP_LOGS,
            LogTag::Database => ENABLE_DATABASE_LOGS,
            LogTag::Fanout => ENABLE_FANOUT_LOGS,
            LogTag::Metadata => ENABLE_METADATA_LOGS,
            LogTag::SolPrice => ENABLE_SOL_PRICE_LOGS,
            LogTag::Wallet => ENABLE_WALLET_LOGS,
            LogTag::Rpc => ENABLE_RPC_LOGS,
            LogTag::Other(_) => ENABLE_OTHER_LOGS,
        }
    }
}

// =============================================================================
// LOGGING API
// =============================================================================

/// Logs a message with time, tag, log type, and message.
pub fn log(tag: LogTag, log_type: &str, message: &str) {
    if !tag.is_enabled() {
        return;
    }

    let log_type_enabled = match log_type.to_uppercase().as_str() {
        "ERROR" | "FAILED" => ENABLE_ERROR_LOGS,
        "WARN" | "WARNING" => ENABLE_WARN_LOGS,
        "SUCCESS" => ENABLE_SUCCESS_LOGS,
        "INFO" => ENABLE_INFO_LOGS,
        "DEBUG" => ENABLE_DEBUG_LOGS,
        _ => ENABLE_GENERAL_LOGS,
    };

    if !log_type_enabled {
        return;
    }

    let now = Local::now();
    let mut prefix = String::new();
    if LOG_SHOW_DATE {
        prefix.push_str(&format!("{} ", now.format("%Y-%m-%d")));
    }
    if LOG_SHOW_TIME {
        prefix.push_str(&format!("{} ", now.format("%H:%M:%S")));
    }

    let type_str = format!("{:<8}", log_type.to_uppercase());
    let colored_type = match log_type.to_uppercase().as_str() {
        "ERROR" | "FAILED" => type_str.bright_red().bold(),
        "WARN" | "WARNING" => type_str.bright_yellow(),
        "SUCCESS" => type_str.bright_green().bold(),
        "DEBUG" => type_str.dimmed(),
        _ => type_str.normal(),
    };

    println!(
        "{}[{}] [{}] {}",
        prefix.dimmed(),
        tag.colored_label(),
        colored_type,
        message
    );

    // File output without colors
    if ENABLE_FILE_LOGGING {
        let file_line = format!(
            "{} [{}] [{}] {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            tag.label(),
            format!("{:<8}", log_type.to_uppercase()),
            message
        );
        if let Ok(mut guard) = FILE_LOGGER.lock() {
            if let Some(ref mut logger) = *guard {
                let _ = logger.write_to_file(&file_line);
            }
        }
    }
}

/// Log an info message
pub fn info(tag: LogTag, message: &str) {
    log(tag, "INFO", message);
}

/// Log a debug message
pub fn debug(tag: LogTag, message: &str) {
    log(tag, "DEBUG", message);
}

/// Log a warning message
pub fn warning(tag: LogTag, message: &str) {
    log(tag, "WARN", message);
}

/// Log an error message
pub fn error(tag: LogTag, message: &str) {
    log(tag, "ERROR", message);
}

/// Log a success message
pub fn success(tag: LogTag, message: &str) {
    log(tag, "SUCCESS", message);
}
