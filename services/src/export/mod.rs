//! Batch export of many users' transcripts into one signed, downloadable archive.

pub mod engine;
pub mod link;
pub mod task;

pub use engine::{ExportConfig, ExportEngine};
pub use link::DownloadParams;
pub use task::{
    ExportRequest, ExportTarget, FailedEntry, TaskState, TaskStatus, UserOutcome, WarnEntry,
};
