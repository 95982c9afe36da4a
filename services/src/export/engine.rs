//! Batch export engine.
//!
//! A task moves `Created -> Staging -> Finalized` and never back. Staging scrapes each
//! requested user through a [`TranscriptSource`] with bounded parallelism and writes one
//! JSON file per user under the task's `prepare/` directory; a single collector folds the
//! per-user outcomes into the task registry. Finalize zips `prepare/` under a provisional
//! name and renames it into place, so the final archive name only ever points at a
//! complete file.
//!
//! Within one process, staging and finalizing the same task exclude each other: any
//! number of staging passes may share a task, but finalize only starts once none is
//! running, and no staging pass starts while finalize runs.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, StreamExt};
use portal::AcademicPeriod;
use tracing::{debug, error, info, warn};
use util::config::AppConfig;
use util::{archive, paths};

use crate::achieve_service::TranscriptSource;
use crate::clock::{Clock, SystemClock};
use crate::error::{
    EMPTY_IDENTIFIER, INVALID_IDENTIFIER, RATE_LIMIT_MESSAGE, ServiceError, ServiceResult,
};
use crate::export::link::DownloadParams;
use crate::export::task::{
    ExportRequest, ExportTarget, StagedTranscript, TaskState, TaskStatus, UserOutcome, WarnEntry,
    bucket_of,
};

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub root: PathBuf,
    pub concurrency: usize,
    pub download_endpoint: String,
    pub app_secret: String,
}

impl ExportConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            root: paths::export_root(&config.export_root),
            concurrency: config.export_concurrency.max(1),
            download_endpoint: config.download_endpoint.clone(),
            app_secret: config.app_secret.clone(),
        }
    }
}

type TaskKey = (String, i64);

/// What is currently running against a task in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Number of staging passes in flight.
    Staging(usize),
    Finalizing,
}

/// Leaves the phase it entered when dropped.
struct PhaseGuard<'a> {
    phases: &'a Mutex<HashMap<TaskKey, Phase>>,
    key: TaskKey,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        match phases.get_mut(&self.key) {
            Some(Phase::Staging(n)) if *n > 1 => *n -= 1,
            _ => {
                phases.remove(&self.key);
            }
        }
    }
}

pub struct ExportEngine {
    config: ExportConfig,
    source: Arc<dyn TranscriptSource>,
    clock: Arc<dyn Clock>,
    tasks: Mutex<HashMap<TaskKey, TaskStatus>>,
    phases: Mutex<HashMap<TaskKey, Phase>>,
    temp_seq: AtomicU64,
}

impl ExportEngine {
    pub fn new(config: ExportConfig, source: Arc<dyn TranscriptSource>) -> Self {
        Self::with_clock(config, source, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ExportConfig,
        source: Arc<dyn TranscriptSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            clock,
            tasks: Mutex::new(HashMap::new()),
            phases: Mutex::new(HashMap::new()),
            temp_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<TaskKey, TaskStatus>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter_staging(&self, key: &TaskKey) -> ServiceResult<PhaseGuard<'_>> {
        let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        match phases.get_mut(key) {
            Some(Phase::Finalizing) => return Err(ServiceError::FinalizeInProgress(key.1)),
            Some(Phase::Staging(n)) => *n += 1,
            None => {
                phases.insert(key.clone(), Phase::Staging(1));
            }
        }
        Ok(PhaseGuard {
            phases: &self.phases,
            key: key.clone(),
        })
    }

    fn enter_finalize(&self, key: &TaskKey) -> ServiceResult<PhaseGuard<'_>> {
        let mut phases = self.phases.lock().unwrap_or_else(PoisonError::into_inner);
        match phases.get(key) {
            Some(Phase::Finalizing) => Err(ServiceError::FinalizeInProgress(key.1)),
            Some(Phase::Staging(_)) => Err(ServiceError::StagingInProgress(key.1)),
            None => {
                phases.insert(key.clone(), Phase::Finalizing);
                Ok(PhaseGuard {
                    phases: &self.phases,
                    key: key.clone(),
                })
            }
        }
    }

    fn check_owner(owner: &str) -> ServiceResult<()> {
        if paths::is_safe_component(owner) {
            Ok(())
        } else {
            Err(ServiceError::Validation(format!("invalid task owner {owner:?}")))
        }
    }

    /// Creates the task (or joins it, for an explicit id) and stages every requested user.
    ///
    /// The batch succeeds even when every user fails; per-user results are in the returned
    /// status, merged with whatever earlier calls for the same task recorded.
    pub async fn prepare(&self, request: ExportRequest) -> ServiceResult<TaskStatus> {
        Self::check_owner(&request.owner)?;
        let explicit = request.explicit_task_id();
        let task_id = explicit.unwrap_or_else(|| bucket_of(self.clock.unix_seconds()));
        let key: TaskKey = (request.owner.clone(), task_id);
        let root = &self.config.root;

        let _phase = self.enter_staging(&key).inspect_err(|_| {
            warn!(owner = %request.owner, task_id, "prepare while export task is finalizing");
        })?;
        if self.is_finalized(&key).await {
            warn!(owner = %request.owner, task_id, "prepare on finalized export task");
            return Err(ServiceError::AlreadyFinalized(task_id));
        }

        let owner_dir = paths::owner_task_dir(root, task_id, &request.owner);
        tokio::fs::create_dir_all(&owner_dir).await.inspect_err(|e| {
            error!(path = %owner_dir.display(), error = %e, "failed to create export task directory");
        })?;

        // Creating prepare/ is the rate-limit check: only one caller can create it.
        let prepare_dir = paths::prepare_dir(root, task_id, &request.owner);
        match tokio::fs::create_dir(&prepare_dir).await {
            Ok(()) => info!(owner = %request.owner, task_id, "export task created"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if explicit.is_none() {
                    warn!(owner = %request.owner, task_id, "implicit export task repeated within bucket");
                    return Err(ServiceError::RateLimited(RATE_LIMIT_MESSAGE.into()));
                }
                debug!(owner = %request.owner, task_id, "joining existing export task");
            }
            Err(e) => {
                error!(path = %prepare_dir.display(), error = %e, "failed to create staging directory");
                return Err(e.into());
            }
        }

        {
            let mut registry = self.registry();
            let status = registry
                .entry(key.clone())
                .or_insert_with(|| TaskStatus::new(task_id));
            if status.state == TaskState::Finalized {
                return Err(ServiceError::AlreadyFinalized(task_id));
            }
            status.state = TaskState::Staging;
        }

        let targets = request.unique_targets();
        let concurrency = self.config.concurrency.max(1);
        let owner = request.owner.as_str();
        let period = &request.period;

        let mut outcomes = stream::iter(targets)
            .map(|target| self.stage_one(task_id, owner, period, target))
            .buffer_unordered(concurrency);

        while let Some(outcome) = outcomes.next().await {
            match self.registry().get_mut(&key) {
                Some(status) if status.state != TaskState::Finalized => status.record(outcome),
                _ => warn!(
                    owner,
                    task_id,
                    uid = %outcome.uid(),
                    "dropping outcome for finalized export task"
                ),
            }
        }

        let snapshot = self
            .registry()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| TaskStatus::new(task_id));
        info!(
            owner,
            task_id,
            success = snapshot.success.len(),
            warn = snapshot.warn.len(),
            failed = snapshot.failed.len(),
            "export staging finished"
        );
        Ok(snapshot)
    }

    async fn is_finalized(&self, key: &TaskKey) -> bool {
        let in_registry = self
            .registry()
            .get(key)
            .is_some_and(|s| s.state == TaskState::Finalized);
        in_registry
            || tokio::fs::try_exists(paths::archive_path(&self.config.root, key.1, &key.0))
                .await
                .unwrap_or(false)
    }

    async fn stage_one(
        &self,
        task_id: i64,
        owner: &str,
        period: &AcademicPeriod,
        target: ExportTarget,
    ) -> UserOutcome {
        if target.user_id.trim().is_empty() {
            return UserOutcome::failed(&target, EMPTY_IDENTIFIER);
        }
        if !paths::is_safe_component(&target.user_id) {
            warn!(task_id, uid = %target.user_id, "export target id cannot name a file");
            return UserOutcome::failed(&target, INVALID_IDENTIFIER);
        }

        let report = match self
            .source
            .transcript(&target.user_id, period, Some(&target.name))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(task_id, uid = %target.user_id, error = %e, "export target scrape failed");
                return UserOutcome::failed(&target, e.user_message());
            }
        };

        let internal = report.result.source_name.clone();
        let staged = StagedTranscript {
            uid: target.user_id.clone(),
            name: target.name.clone(),
            name_internal: internal.clone(),
            period: period.clone(),
            current: report.result.records.current,
            failed: report.result.records.failed,
        };
        let path = paths::staged_file_path(&self.config.root, task_id, owner, &target.user_id);
        let temp = paths::staging_temp_path(
            &self.config.root,
            task_id,
            owner,
            &target.user_id,
            self.temp_seq.fetch_add(1, Ordering::Relaxed),
        );
        if let Err(e) = write_staged(&temp, &path, &staged).await {
            error!(task_id, uid = %target.user_id, path = %path.display(), error = %e, "failed to stage export file");
            return UserOutcome::failed(&target, e.user_message());
        }

        if report.name_check.is_mismatch() {
            UserOutcome::Warn(WarnEntry {
                uid: target.user_id,
                name: target.name,
                name_internal: internal,
            })
        } else {
            UserOutcome::Success(target)
        }
    }

    /// Current snapshot of a task.
    pub async fn status(&self, owner: &str, task_id: i64) -> ServiceResult<TaskStatus> {
        Self::check_owner(owner)?;
        let key: TaskKey = (owner.to_string(), task_id);
        if let Some(status) = self.registry().get(&key).cloned() {
            return Ok(status);
        }

        let root = &self.config.root;
        let state = if path_exists(&paths::archive_path(root, task_id, owner)).await {
            TaskState::Finalized
        } else if path_exists(&paths::prepare_dir(root, task_id, owner)).await {
            TaskState::Staging
        } else {
            return Err(ServiceError::NotFound(format!("export task {task_id}")));
        };
        let mut status = TaskStatus::new(task_id);
        status.state = state;
        Ok(status)
    }

    /// Archives the staging directory of a task. Succeeds once per task; the staging
    /// directory is left in place either way.
    pub async fn finalize(&self, owner: &str, task_id: i64) -> ServiceResult<PathBuf> {
        Self::check_owner(owner)?;
        if task_id < 0 {
            return Err(ServiceError::Validation(format!("invalid task id {task_id}")));
        }
        let key: TaskKey = (owner.to_string(), task_id);

        let _phase = self.enter_finalize(&key).inspect_err(|e| {
            warn!(owner, task_id, error = %e, "export task busy, finalize rejected");
        })?;

        let root = &self.config.root;
        let prepare_dir = paths::prepare_dir(root, task_id, owner);
        let provisional = paths::provisional_archive_path(root, task_id, owner);
        let final_path = paths::archive_path(root, task_id, owner);

        if !path_exists(&prepare_dir).await {
            warn!(owner, task_id, "finalize on unknown export task");
            return Err(ServiceError::NotFound(format!("export task {task_id}")));
        }
        if path_exists(&final_path).await {
            return Err(ServiceError::AlreadyFinalized(task_id));
        }

        // The provisional file doubles as a lock across processes. In-process finalizes
        // never get here concurrently, so an existing one was left by another process or
        // by an interrupted run and needs an operator to remove it.
        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&provisional)
            .await
        {
            Ok(file) => file.into_std().await,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                error!(
                    owner,
                    task_id,
                    path = %provisional.display(),
                    "provisional archive already exists, remove it if no other process is finalizing"
                );
                return Err(ServiceError::StaleProvisional(task_id));
            }
            Err(e) => {
                error!(path = %provisional.display(), error = %e, "failed to create provisional archive");
                return Err(e.into());
            }
        };

        if path_exists(&final_path).await {
            discard(&provisional).await;
            return Err(ServiceError::AlreadyFinalized(task_id));
        }

        if let Err(e) = archive::zip_dir_to_file(&prepare_dir, file).await {
            error!(owner, task_id, error = %format!("{e:#}"), "failed to archive export task");
            discard(&provisional).await;
            return Err(ServiceError::Infrastructure(format!("{e:#}")));
        }
        if let Err(e) = tokio::fs::rename(&provisional, &final_path).await {
            error!(owner, task_id, error = %e, "failed to move archive into place");
            discard(&provisional).await;
            return Err(e.into());
        }

        self.registry()
            .entry(key)
            .or_insert_with(|| TaskStatus::new(task_id))
            .state = TaskState::Finalized;
        info!(owner, task_id, path = %final_path.display(), "export task finalized");
        Ok(final_path)
    }

    /// Signed download link for a task's archive.
    pub fn link(&self, task_id: i64, access_token: &str) -> ServiceResult<String> {
        if task_id < 0 {
            return Err(ServiceError::Validation(format!("invalid task id {task_id}")));
        }
        let params = DownloadParams::issue(access_token, task_id, &self.config.app_secret);
        Ok(params.to_url(&self.config.download_endpoint)?.into())
    }

    pub fn verify(&self, params: &DownloadParams) -> ServiceResult<()> {
        params.verify(&self.config.app_secret).inspect_err(|_| {
            warn!(task_id = params.task_id, "download link signature rejected");
        })
    }

    /// The archive a verified download link refers to.
    pub async fn resolve_download(
        &self,
        owner: &str,
        params: &DownloadParams,
    ) -> ServiceResult<PathBuf> {
        self.verify(params)?;
        Self::check_owner(owner)?;
        let path = paths::archive_path(&self.config.root, params.task_id, owner);
        if path_exists(&path).await {
            Ok(path)
        } else {
            Err(ServiceError::NotFound(format!("export archive {}", params.task_id)))
        }
    }
}

/// Writes next to the task's staging directory, then renames into it, so `prepare/` only
/// ever holds complete files.
async fn write_staged(temp: &Path, path: &Path, staged: &StagedTranscript) -> ServiceResult<()> {
    let bytes = serde_json::to_vec_pretty(staged)
        .map_err(|e| ServiceError::Infrastructure(format!("serialize staged transcript: {e}")))?;
    tokio::fs::write(temp, bytes).await?;
    if let Err(e) = tokio::fs::rename(temp, path).await {
        let _ = tokio::fs::remove_file(temp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove provisional archive");
    }
}
