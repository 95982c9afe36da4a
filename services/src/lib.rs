//! Orchestration layer: transcript and exam services, the record cache gateway and the
//! batch export engine, wired against the session and storage capabilities they consume.

pub mod achieve_service;
pub mod app;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod exam_service;
pub mod export;
pub mod record_cache;
pub mod session;

pub use error::{ServiceError, ServiceResult};
