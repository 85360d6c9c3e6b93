//! External collaborators
//!
//! The backup pipeline does not know how notes are stored or how the user is
//! told about problems. It talks to a [`NoteExporter`] and a [`Notifier`];
//! this module defines both and provides the implementations the command line
//! host uses: a note exporter over a directory tree and a console notifier.

pub mod console;
pub mod filesystem;

use std::path::Path;

use async_trait::async_trait;

use crate::config::settings::ExportFormat;
use crate::error::BackupResult;

pub use console::ConsoleNotifier;
pub use filesystem::FsNoteExporter;

/// A notebook or folder that notes are grouped in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub title: String,
    /// Empty for top-level containers
    pub parent_id: String,
}

impl Container {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_empty()
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Serializes note data into the staging area
#[async_trait]
pub trait NoteExporter: Send + Sync {
    /// Export the containers `ids` (with everything below them) to `dest`
    ///
    /// For [`ExportFormat::Jex`] `dest` is a file, for [`ExportFormat::Raw`]
    /// a directory. A raw export of one container puts its contents directly
    /// in `dest`; several containers each get `dest/<name>`.
    async fn export_items(&self, ids: &[String], format: ExportFormat, dest: &Path)
        -> BackupResult<()>;

    /// List containers, `page` starting at 1
    async fn list_containers(&self, page: u32) -> BackupResult<Page<Container>>;

    /// Whether the container holds any notes, directly or in children
    async fn has_content(&self, container_id: &str) -> BackupResult<bool>;

    /// Epoch milliseconds of the most recent change, 0 if unknown
    async fn last_change(&self) -> BackupResult<i64> {
        Ok(0)
    }
}

/// User-visible notifications
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
    fn info(&self, message: &str);

    fn warn(&self, message: &str) {
        self.info(message);
    }
}

/// Notifier that records messages, for tests
#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::Notifier;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub errors: Mutex<Vec<String>>,
        pub infos: Mutex<Vec<String>>,
        pub warnings: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        pub fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }

        pub fn infos(&self) -> Vec<String> {
            self.infos.lock().unwrap().clone()
        }

        pub fn warnings(&self) -> Vec<String> {
            self.warnings.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }

        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }
}
