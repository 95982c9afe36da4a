//! Service-level error taxonomy.
//!
//! Every variant renders a detailed operator message through `Display`; what leaves the
//! service towards an end user goes through [`ServiceError::user_message`] instead.

use portal::PortalError;

/// Rejection for roles the portal holds no transcript for.
pub const NO_TRANSCRIPT_FOR_ROLE: &str = "no transcript applicable";
/// Rejection for roles the portal holds no exam schedule for.
pub const NO_EXAMS_FOR_ROLE: &str = "no exam schedule applicable";
/// Failure reason for an export target without a user id.
pub const EMPTY_IDENTIFIER: &str = "empty identifier";
/// Failure reason for an export target whose id cannot name a file.
pub const INVALID_IDENTIFIER: &str = "invalid identifier";
/// Rejection for a second implicit export task inside one time bucket.
pub const RATE_LIMIT_MESSAGE: &str = "do not create export tasks repeatedly within a short window";

const PROCESSING_FAILED: &str = "request processing failed";

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Network or filesystem failure.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// The upstream page lacked an expected token or marker: expired session or layout drift.
    #[error("upstream protocol failure: {0}")]
    UpstreamProtocol(String),

    /// Rejected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("export task {0} is already finalized")]
    AlreadyFinalized(i64),

    #[error("export task {0} is being finalized")]
    FinalizeInProgress(i64),

    #[error("export task {0} is still staging")]
    StagingInProgress(i64),

    /// A provisional archive from another process or an interrupted run is in the way.
    #[error("export task {0} has a leftover provisional archive")]
    StaleProvisional(i64),

    #[error("{0} not found")]
    NotFound(String),

    #[error("download signature does not match")]
    InvalidSignature,
}

impl ServiceError {
    /// The sanitized message shown to end users.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Infrastructure(_) | ServiceError::UpstreamProtocol(_) => {
                PROCESSING_FAILED.to_string()
            }
            ServiceError::Validation(msg) | ServiceError::RateLimited(msg) => msg.clone(),
            ServiceError::AlreadyFinalized(_) => "export task already finalized".to_string(),
            ServiceError::FinalizeInProgress(_) => "export task is being finalized".to_string(),
            ServiceError::StagingInProgress(_) => "export task is still staging".to_string(),
            ServiceError::StaleProvisional(_) => {
                "export archive is locked, contact an administrator".to_string()
            }
            ServiceError::NotFound(what) => format!("{what} not found"),
            ServiceError::InvalidSignature => "invalid download link".to_string(),
        }
    }

    /// Only protocol failures may be cured by a fresh upstream session.
    pub fn is_retryable_with_new_session(&self) -> bool {
        matches!(self, ServiceError::UpstreamProtocol(_))
    }
}

impl From<PortalError> for ServiceError {
    fn from(err: PortalError) -> Self {
        if err.is_infrastructure() {
            ServiceError::Infrastructure(err.to_string())
        } else {
            ServiceError::UpstreamProtocol(err.to_string())
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Infrastructure(err.to_string())
    }
}
