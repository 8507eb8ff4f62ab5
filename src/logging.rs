//! Structured JSONL logging plus human-readable stderr output.
//!
//! - **JSONL to file** (`<data dir>/hotkey-dispatch/logs/hotkey-dispatch.jsonl`)
//! - **Compact to stderr** for whoever is watching the terminal
//!
//! ```rust,ignore
//! let _guard = hotkey_dispatch::logging::init();
//! tracing::info!(event_type = "hotkey_bind", combination = "Alt+Space", "Bound");
//! ```
//!
//! Each file line is one JSON object:
//! ```json
//! {"timestamp":"2026-01-04T10:30:45.123Z","level":"INFO","target":"hotkey_dispatch::registry","fields":{"message":"Hotkey bound","combination":"Alt+Space","backend":"standard"}}
//! ```

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "hotkey-dispatch.jsonl";
const DEFAULT_FILTER: &str = "info,global_hotkey=warn";

/// Keep alive for the duration of the program.
/// Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    log_path: Option<PathBuf>,
}

impl LoggingGuard {
    /// Where the JSONL log is written, if the file could be opened.
    pub fn log_path(&self) -> Option<&PathBuf> {
        self.log_path.as_ref()
    }
}

/// Initialize dual-output logging. `RUST_LOG` overrides the default filter.
///
/// If the log file cannot be opened, logging continues on stderr only.
pub fn init() -> LoggingGuard {
    let log_path = log_path();
    let file = log_path.parent().and_then(|dir| {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("[LOGGING] Failed to create log directory: {}", e);
            return None;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| eprintln!("[LOGGING] Failed to open log file: {}", e))
            .ok()
    });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    let (json_layer, file_guard) = match file {
        Some(file) => {
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let opened = file_guard.is_some();

    // try_init: a second call (tests, embedding hosts) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(stderr_layer)
        .try_init();

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        file_logging = opened,
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
        log_path: opened.then_some(log_path),
    }
}

/// Path of the JSONL log file.
pub fn log_path() -> PathBuf {
    log_dir().join(LOG_FILE_NAME)
}

fn log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("hotkey-dispatch").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("hotkey-dispatch-logs"))
}
