//! Logging
//!
//! Console output goes through a `tracing_subscriber` fmt layer filtered by
//! `RUST_LOG` (default `info`). On top of that every backup run writes its
//! own log file: [`FileLogLayer`] appends this crate's events to whatever
//! file the [`RunLogHandle`] currently points at, in the format
//!
//! ```text
//! [2021-01-02 16:30:45.123] [info] Backup completed
//! ```

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{BackupError, BackupResult};

/// Name of the run log inside the backup root
pub const LOG_FILE_NAME: &str = "backup.log";

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Install the global subscriber, returning the handle for run logs
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place and return a handle that is not attached to it.
pub fn init_tracing(verbose: bool) -> RunLogHandle {
    let handle = RunLogHandle::default();

    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    if tracing_subscriber::registry()
        .with(console)
        .with(handle.layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already installed");
    }

    handle
}

#[derive(Debug, Clone)]
struct LogTarget {
    path: PathBuf,
    level: LevelFilter,
}

/// Switches the run log on and off
#[derive(Debug, Clone, Default)]
pub struct RunLogHandle {
    target: Arc<Mutex<Option<LogTarget>>>,
}

impl RunLogHandle {
    /// Layer writing to this handle's file
    pub fn layer(&self) -> FileLogLayer {
        FileLogLayer {
            target: Arc::clone(&self.target),
        }
    }

    /// Start logging to `path`, discarding any log left from an earlier run
    ///
    /// With [`LevelFilter::OFF`] no file is written.
    pub fn enable(&self, path: &Path, level: LevelFilter) -> BackupResult<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                BackupError::Io(format!("Failed to remove old log {}: {}", path.display(), e))
            })?;
        }

        *self.lock() = (level != LevelFilter::OFF).then(|| LogTarget {
            path: path.to_path_buf(),
            level,
        });
        Ok(())
    }

    /// Stop logging, returning the log file if one was written
    pub fn disable(&self) -> Option<PathBuf> {
        self.lock()
            .take()
            .map(|target| target.path)
            .filter(|path| path.is_file())
    }

    /// Current log file path
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|target| target.path.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<LogTarget>> {
        self.target.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `tracing` layer appending to the current run log
#[derive(Debug, Clone)]
pub struct FileLogLayer {
    target: Arc<Mutex<Option<LogTarget>>>,
}

impl<S: Subscriber> Layer<S> for FileLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(CRATE_TARGET) {
            return;
        }

        let guard = self.target.lock().unwrap_or_else(|e| e.into_inner());
        let Some(target) = guard.as_ref() else {
            return;
        };
        if *metadata.level() > target.level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "[{}] [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            metadata.level().to_string().to_ascii_lowercase(),
            visitor.finish()
        );

        // Nowhere left to report a failing log write
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&target.path) {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
