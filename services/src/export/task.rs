//! Export task model: ids, requests and the per-user outcome lists.

use std::collections::HashSet;

use portal::{AcademicPeriod, FailedCourseRecord, TranscriptRecord};
use serde::{Deserialize, Serialize};

/// Width of one task-id time bucket, in seconds.
pub const TASK_BUCKET_SECS: i64 = 300;

/// The task id derived from a wall-clock time.
pub fn bucket_of(unix_seconds: i64) -> i64 {
    unix_seconds.div_euclid(TASK_BUCKET_SECS)
}

/// The `ts` value a task id is signed with: the start of its bucket.
pub fn bucket_start(task_id: i64) -> i64 {
    task_id * TASK_BUCKET_SECS
}

/// One user to export, with the display name the requester knows them by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTarget {
    #[serde(rename = "uid")]
    pub user_id: String,
    pub name: String,
}

impl ExportTarget {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Account that owns the task; tasks of different owners never share files.
    pub owner: String,
    /// `None` or a negative id derives the id from the current time bucket.
    pub task_id: Option<i64>,
    pub period: AcademicPeriod,
    pub targets: Vec<ExportTarget>,
}

impl ExportRequest {
    pub fn explicit_task_id(&self) -> Option<i64> {
        self.task_id.filter(|id| *id >= 0)
    }

    /// Targets with duplicate user ids removed, first occurrence winning. Entries with an
    /// empty id are all kept so each one is reported.
    pub fn unique_targets(&self) -> Vec<ExportTarget> {
        let mut seen = HashSet::new();
        self.targets
            .iter()
            .filter(|t| t.user_id.trim().is_empty() || seen.insert(t.user_id.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Staging,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnEntry {
    pub uid: String,
    pub name: String,
    pub name_internal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub uid: String,
    pub name: String,
    pub error_info: String,
}

/// How staging one user ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOutcome {
    Success(ExportTarget),
    /// Staged, but the upstream knows the user under a different name.
    Warn(WarnEntry),
    Failed(FailedEntry),
}

impl UserOutcome {
    pub fn failed(target: &ExportTarget, error_info: impl Into<String>) -> Self {
        UserOutcome::Failed(FailedEntry {
            uid: target.user_id.clone(),
            name: target.name.clone(),
            error_info: error_info.into(),
        })
    }

    pub fn uid(&self) -> &str {
        match self {
            UserOutcome::Success(t) => &t.user_id,
            UserOutcome::Warn(w) => &w.uid,
            UserOutcome::Failed(f) => &f.uid,
        }
    }
}

/// Snapshot of an export task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: i64,
    pub state: TaskState,
    pub success: Vec<ExportTarget>,
    pub warn: Vec<WarnEntry>,
    pub failed: Vec<FailedEntry>,
}

impl TaskStatus {
    pub fn new(task_id: i64) -> Self {
        Self {
            task_id,
            state: TaskState::Created,
            success: Vec::new(),
            warn: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Records a user's latest outcome, dropping any earlier one for the same non-empty id.
    pub fn record(&mut self, outcome: UserOutcome) {
        let uid = outcome.uid().to_string();
        if !uid.is_empty() {
            self.success.retain(|t| t.user_id != uid);
            self.warn.retain(|w| w.uid != uid);
            self.failed.retain(|f| f.uid != uid);
        }
        match outcome {
            UserOutcome::Success(t) => self.success.push(t),
            UserOutcome::Warn(w) => self.warn.push(w),
            UserOutcome::Failed(f) => self.failed.push(f),
        }
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.warn.len() + self.failed.len()
    }
}

/// Contents of one staged per-user file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedTranscript {
    pub uid: String,
    pub name: String,
    pub name_internal: String,
    pub period: AcademicPeriod,
    pub current: Vec<TranscriptRecord>,
    pub failed: Vec<FailedCourseRecord>,
}
