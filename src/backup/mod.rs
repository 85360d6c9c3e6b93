//! Backup system for notes-backup
//!
//! Produces point-in-time backups of the note database and profile data and
//! keeps a bounded number of them.
//!
//! # Architecture
//!
//! - `staging`: the per-run scratch directory exporters write into
//! - `profile`, `notebooks`: fill the staging area
//! - `archive`, `assembler`: optional 7-Zip compression and encryption
//! - `placement`, `naming`: move the result into the backup root under a
//!   collision-free name
//! - `index`, `retention`: track retained backup sets and prune old ones
//! - `hooks`: post-backup command
//! - `pipeline`: runs all of the above and owns the periodic trigger
//!
//! # Layout
//!
//! With a retention of 1 the backup root holds the backup directly:
//!
//! ```text
//! NotesBackup/
//!   backup.log
//!   notes/<notebook>.jex
//!   profile/
//!   templates/
//! ```
//!
//! With a larger retention each run becomes a directory (or `.7z` file) named
//! from the backup-set template, for example `202101021630/`.

pub mod archive;
pub mod assembler;
pub mod hooks;
pub mod index;
pub mod naming;
pub mod notebooks;
pub mod pipeline;
pub mod placement;
pub mod profile;
pub mod retention;
pub mod staging;

pub use archive::{Archiver, SevenZip};
pub use index::{BackupIndexStore, BackupSetEntry};
pub use pipeline::{BackupPipeline, RunReport};
pub use placement::PlacementEngine;
pub use retention::RetentionPruner;
pub use staging::StagingManager;
