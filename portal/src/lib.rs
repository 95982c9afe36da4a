//! Upstream portal access: the postback client, positional table extraction and the
//! record types they produce.

pub mod client;
pub mod error;
pub mod extractor;
pub mod types;

pub use client::{PortalClient, PortalConfig};
pub use error::{PortalError, Stage};
pub use types::{
    AcademicPeriod, ExamRecord, FailedCourseRecord, ScrapeResult, Transcript, TranscriptRecord,
};
