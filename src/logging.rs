// src/logging.rs
//
// =============================================================================
// MATENSEMBLE: WORKFLOW LOGGER
// =============================================================================
//
// A dual-sink `log::Log` implementation: a verbose, timestamped file under
// the workflow's `logs/` directory (always written) and an optional stderr
// stream (when the caller asks for it, or when stderr is a tty).

use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::status::WorkflowPaths;

pub struct WorkflowLogger {
    file: Mutex<std::fs::File>,
    console: bool,
}

impl WorkflowLogger {
    /// Installs the global logger, creating `paths.verbose_log_file`. Mirrors
    /// the teacher's singleton-install pattern (`log::set_logger` on a leaked
    /// boxed logger) but writes to a file/stderr pair instead of an
    /// in-memory ring buffer.
    pub fn init(paths: &WorkflowPaths, console: Option<bool>) -> Result<(), SetLoggerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&paths.verbose_log_file)
            .expect("failed to open workflow log file");

        let console = console.unwrap_or_else(|| atty_stderr());

        let logger = Box::new(WorkflowLogger {
            file: Mutex::new(file),
            console,
        });

        log::set_logger(Box::leak(logger)).map(|()| log::set_max_level(LevelFilter::Debug))?;

        let hint = format!(
            "Status file: {}\nWatch it with: watch -n 1 cat {}\nVerbose log: {}\nTask outputs: {}\n",
            paths.status_file.display(),
            paths.status_file.display(),
            paths.verbose_log_file.display(),
            paths.out_dir.display(),
        );
        eprint!("{hint}");

        log::info!("Workflow initialized at {}", paths.base_dir.display());
        Ok(())
    }
}

fn atty_stderr() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

impl log::Log for WorkflowLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!(
            "{} | {} | {} | {}\n",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        );

        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }

        if self.console && record.level() <= log::Level::Info {
            eprint!("{line}");
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}
