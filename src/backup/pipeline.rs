//! Backup pipeline
//!
//! One [`BackupPipeline`] value owns everything that changes between runs:
//! the running sentinel, the periodic trigger and the notification
//! suppression window. A run goes through these stages in order:
//!
//! 1. snapshot settings, resolve and check the backup root and password
//! 2. start the run log and create an empty staging area
//! 3. export profile data, then notebooks
//! 4. archive, place, prune
//! 5. post-backup command, record `lastBackup`, finalize the run log
//!
//! Any failure in 1-4 aborts the run and leaves the staging area and the
//! log at the backup root for inspection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::backup::archive::{AddOption, Archiver};
use crate::backup::assembler::ArchiveAssembler;
use crate::backup::hooks::run_finish_command;
use crate::backup::index::BackupIndexStore;
use crate::backup::naming::render_backup_set_name;
use crate::backup::notebooks::NotebookExport;
use crate::backup::placement::{
    PlacementEngine, PlacementRequest, LOG_ARCHIVE_NAME, SINGLE_ARCHIVE_NAME,
};
use crate::backup::profile::export_profile;
use crate::backup::retention::RetentionPruner;
use crate::backup::staging::{StagingManager, ACTIVE_BACKUP_JOB};
use crate::config::paths::{home_dir, normalize_path, resolve_backup_root};
use crate::config::settings::{
    enable_password, keys, BackupSettings, PasswordState, ScheduleSettings,
};
use crate::config::store::{global_string, SettingsStore};
use crate::error::{BackupError, BackupResult};
use crate::export::{NoteExporter, Notifier};
use crate::logging::{RunLogHandle, LOG_FILE_NAME};
use crate::storage::file_io::move_overwrite;

/// How often the periodic trigger checks whether a backup is due
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Repeated "backup path missing" notices are suppressed for this long in
/// unattended runs
pub const PATH_NOTICE_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    /// Backup root (retention 1) or the new backup set
    pub destination: PathBuf,
    /// Backup sets deleted by retention
    pub pruned: Vec<String>,
}

struct PreparedRun {
    settings: BackupSettings,
    profile_dir: PathBuf,
    root: PathBuf,
}

/// Orchestrates backup runs and the periodic trigger
pub struct BackupPipeline {
    store: Arc<dyn SettingsStore>,
    exporter: Arc<dyn NoteExporter>,
    archiver: Arc<dyn Archiver>,
    notifier: Arc<dyn Notifier>,
    run_log: RunLogHandle,
    home_dir: Option<PathBuf>,
    check_interval: Duration,
    running: Mutex<Option<DateTime<Local>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    last_path_notice: Mutex<Option<Instant>>,
}

impl fmt::Debug for BackupPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupPipeline")
            .field("home_dir", &self.home_dir)
            .field("check_interval", &self.check_interval)
            .field("running", &*lock(&self.running))
            .field("timer_armed", &self.timer_armed())
            .finish_non_exhaustive()
    }
}

impl BackupPipeline {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        exporter: Arc<dyn NoteExporter>,
        archiver: Arc<dyn Archiver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            exporter,
            archiver,
            notifier,
            run_log: RunLogHandle::default(),
            home_dir: home_dir(),
            check_interval: CHECK_INTERVAL,
            running: Mutex::new(None),
            timer: Mutex::new(None),
            last_path_notice: Mutex::new(None),
        }
    }

    /// Write run logs through `handle`
    pub fn with_run_log(mut self, handle: RunLogHandle) -> Self {
        self.run_log = handle;
        self
    }

    /// Home directory the backup root must differ from
    pub fn with_home_dir(mut self, home: Option<PathBuf>) -> Self {
        self.home_dir = home;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Whether the periodic trigger is scheduled
    pub fn timer_armed(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Perform one backup run
    ///
    /// `interactive` runs always notify on failure; unattended runs suppress
    /// repeated "backup path missing" notices for [`PATH_NOTICE_WINDOW`].
    pub async fn run(self: &Arc<Self>, interactive: bool) -> BackupResult<RunReport> {
        let started_at = {
            let mut running = lock(&self.running);
            if let Some(since) = *running {
                tracing::warn!("Backup already running since {}", since.format("%H:%M:%S"));
                self.notifier.info("Backup already running");
                return Err(BackupError::AlreadyRunning);
            }
            let now = Local::now();
            *running = Some(now);
            now
        };

        self.stop_timer();

        let result = self.execute(started_at).await;
        match &result {
            Ok(report) => self
                .notifier
                .info(&format!("Backup completed: {}", report.destination.display())),
            Err(e) => self.notify_failure(e, interactive),
        }

        *lock(&self.running) = None;
        self.start_timer(self.check_interval);
        result
    }

    async fn execute(&self, started_at: DateTime<Local>) -> BackupResult<RunReport> {
        let prepared = match self.prepare(&started_at) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!("Backup not started: {}", e);
                return Err(e);
            }
        };

        self.run_log.enable(
            &prepared.root.join(LOG_FILE_NAME),
            prepared.settings.file_log_level,
        )?;
        tracing::info!("Backup started");

        let (destination, log_target, pruned) = match self.stages(&prepared, &started_at).await {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Backup failed: {}", e);
                self.run_log.disable();
                return Err(e);
            }
        };

        let settings = &prepared.settings;
        let cmd = settings.exec_finish_cmd.trim();
        if !cmd.is_empty() {
            if let Err(failure) = run_finish_command(cmd, &destination).await {
                tracing::error!("Post-backup command failed: {}", failure);
                self.notifier
                    .error(&format!("Post-backup command failed: {}", failure));
            }
        }

        let recorded = self.store.set_value(
            keys::LAST_BACKUP,
            Value::from(started_at.timestamp_millis()),
        );
        if let Err(e) = &recorded {
            tracing::error!("Failed to record backup time: {}", e);
        }

        tracing::info!("Backup completed");
        if let Err(e) = self.finalize_log(&log_target, settings.password()).await {
            tracing::error!("{}", e);
            self.notifier.error(&e.to_string());
        }
        recorded?;

        Ok(RunReport {
            started_at,
            destination,
            pruned,
        })
    }

    /// Everything that is checked before the filesystem is touched
    fn prepare(&self, started_at: &DateTime<Local>) -> BackupResult<PreparedRun> {
        let store = self.store.as_ref();
        let settings = BackupSettings::load(store, started_at)?;
        for warning in &settings.warnings {
            tracing::warn!("{}", warning);
            self.notifier.warn(warning);
        }

        let profile_dir = global_string(store, keys::GLOBAL_PROFILE_DIR)?
            .map(PathBuf::from)
            .ok_or_else(|| BackupError::config("The profile directory is not known"))?;

        let resolved = resolve_backup_root(
            &settings.path,
            &profile_dir,
            self.home_dir.as_deref(),
            settings.create_subfolder,
        )?;
        if let Some(error) = &resolved.subfolder_error {
            self.notifier.error(error);
        }
        if !resolved.path.is_dir() {
            return Err(BackupError::BackupPathMissing(resolved.path));
        }

        enable_password(store, &settings.password)?;
        if matches!(settings.password, PasswordState::Mismatch) {
            return Err(BackupError::config("Passwords do not match"));
        }

        Ok(PreparedRun {
            settings,
            profile_dir,
            root: resolved.path,
        })
    }

    async fn stages(
        &self,
        prepared: &PreparedRun,
        started_at: &DateTime<Local>,
    ) -> BackupResult<(PathBuf, PathBuf, Vec<String>)> {
        let settings = &prepared.settings;
        let root = prepared.root.as_path();

        let export_base = match settings.export_path.trim() {
            "" => root.to_path_buf(),
            path if Path::new(path).is_absolute() => normalize_path(Path::new(path)),
            path => normalize_path(&prepared.profile_dir.join(path)),
        };
        let active = StagingManager::ensure_empty(&export_base, ACTIVE_BACKUP_JOB)?;
        tracing::debug!("Staging in {}", active.display());

        export_profile(&prepared.profile_dir, &active, settings.backup_plugins)
            .map_err(as_export_error)?;
        NotebookExport::new(self.exporter.as_ref(), settings.export_format)
            .run(&active, settings.single_jex)
            .await?;

        let zip = ArchiveAssembler::new(
            self.archiver.as_ref(),
            settings.password(),
            settings.compression_level,
        )
        .assemble(settings.effective_archive_mode(), root, &active)
        .await?;

        let backup_set_name = render_backup_set_name(&settings.backup_set_name, started_at);
        let index = || BackupIndexStore::new(self.store.as_ref());
        let destination = PlacementEngine::new(index()).place(&PlacementRequest {
            base: root,
            active: &active,
            retention: settings.retention,
            zip_file: zip.as_deref(),
            backup_set_name: &backup_set_name,
            started_at: started_at.timestamp_millis(),
        })?;

        let pruned = if settings.retention > 1 {
            RetentionPruner::new(index()).prune(root, settings.retention)?
        } else {
            Vec::new()
        };

        // A single archive in the root also takes the log
        let log_target = match zip {
            Some(_) if settings.retention <= 1 => destination.join(SINGLE_ARCHIVE_NAME),
            _ => destination.clone(),
        };

        Ok((destination, log_target, pruned))
    }

    /// Move the run log next to the finished backup, or into it when the
    /// backup is an archive file
    async fn finalize_log(&self, destination: &Path, password: Option<&str>) -> BackupResult<()> {
        let Some(log) = self.run_log.disable() else {
            return Ok(());
        };

        if destination.is_dir() {
            if let Some(password) = password {
                let archive = destination.join(LOG_ARCHIVE_NAME);
                return self.archive_log(&archive, &log, Some(password)).await;
            }
            let target = destination.join(LOG_FILE_NAME);
            if target != log {
                move_overwrite(&log, &target).map_err(|e| {
                    BackupError::Io(format!(
                        "Failed to move log to {}: {}",
                        target.display(),
                        e
                    ))
                })?;
            }
            return Ok(());
        }

        self.archive_log(destination, &log, password).await
    }

    async fn archive_log(&self, archive: &Path, log: &Path, password: Option<&str>) -> BackupResult<()> {
        self.archiver
            .add(archive, log, password, &[AddOption::DeleteSource])
            .await?
            .map_err(|failure| {
                BackupError::archive(format!(
                    "Failed to add log to {}: {}",
                    archive.display(),
                    failure
                ))
            })
    }

    fn notify_failure(&self, error: &BackupError, interactive: bool) {
        if error.is_path_missing() && !interactive {
            let mut last = lock(&self.last_path_notice);
            if last.map_or(false, |at| at.elapsed() < PATH_NOTICE_WINDOW) {
                tracing::debug!("Suppressing repeated notice: {}", error);
                return;
            }
            *last = Some(Instant::now());
        }
        self.notifier.error(&error.to_string());
    }

    /// Whether the periodic trigger should start a backup now
    pub async fn backup_due(&self) -> BackupResult<bool> {
        let schedule = ScheduleSettings::load(self.store.as_ref())?;
        if !schedule.interval_elapsed(Local::now().timestamp_millis()) {
            return Ok(false);
        }
        tracing::info!("Backup interval reached");

        if schedule.only_on_change {
            let last_change = self.exporter.last_change().await?;
            if last_change != 0 && last_change <= schedule.last_backup {
                tracing::info!("No changes since the last backup, skipping");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Arm the periodic trigger
    pub fn start(self: &Arc<Self>) {
        self.start_timer(self.check_interval);
    }

    /// Restart the trigger after the settings changed
    ///
    /// Ignored while a run is in progress; the run re-arms the trigger with
    /// the new settings when it ends.
    pub fn settings_changed(self: &Arc<Self>) {
        if self.is_running() {
            return;
        }
        self.stop_timer();
        self.start_timer(self.check_interval);
    }

    /// Schedule a check after `delay`; no-op if one is already scheduled
    pub fn start_timer(self: &Arc<Self>, delay: Duration) {
        let mut slot = lock(&self.timer);
        if slot.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return;
        }

        match ScheduleSettings::load(self.store.as_ref()) {
            Ok(schedule) if !schedule.enabled() => {
                tracing::info!("Automatic backup disabled");
                *slot = None;
                return;
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Cannot read the backup interval: {}", e),
        }

        let pipeline: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(pipeline) = pipeline.upgrade() else {
                return;
            };
            // Detach so that the run started below does not abort this task
            lock(&pipeline.timer).take();
            pipeline.backup_time().await;
        }));
    }

    /// Cancel the scheduled check, if any
    pub fn stop_timer(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }

    async fn backup_time(self: &Arc<Self>) {
        match self.backup_due().await {
            // run() re-arms the trigger itself
            Ok(true) => {
                if let Err(e) = self.run(false).await {
                    tracing::debug!("Scheduled backup did not complete: {}", e);
                }
            }
            Ok(false) => self.start_timer(self.check_interval),
            Err(e) => {
                tracing::error!("Cannot decide whether a backup is due: {}", e);
                self.start_timer(self.check_interval);
            }
        }
    }
}

impl Drop for BackupPipeline {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn as_export_error(error: BackupError) -> BackupError {
    match error {
        BackupError::Io(msg) => BackupError::Export(msg),
        other => other,
    }
}
