//! Portal Error Types
//!
//! [`PortalError`] covers everything that can go wrong while talking to the upstream
//! portal or pulling tables out of its pages. Callers care mostly about one split:
//! infrastructure failures ([`PortalError::is_infrastructure`]) versus protocol failures, which
//! usually mean the session expired or the page layout drifted.

use std::fmt;

/// Which half of the postback exchange produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Get,
    Post,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Get => f.write_str("GET"),
            Stage::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// Connection, timeout or body read failure.
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The upstream answered with a server error status.
    #[error("upstream returned status {status} on {stage}")]
    Status { stage: Stage, status: u16 },

    /// The upstream redirected instead of rendering the page; this is how it reports an
    /// expired session.
    #[error("upstream redirected on {stage} to {location}")]
    Redirected { stage: Stage, location: String },

    /// The page carried no `__VIEWSTATE` token.
    #[error("__VIEWSTATE not found in {stage} response")]
    MissingViewState { stage: Stage },

    /// A data row had fewer cells than the positional schema needs.
    #[error("table {table} row {row} has {cells} cells, expected more than {expected}")]
    Layout {
        table: &'static str,
        row: usize,
        cells: usize,
        expected: usize,
    },

    #[error("invalid portal url: {0}")]
    InvalidUrl(String),
}

impl PortalError {
    /// True for transport or configuration failures that say nothing about the session.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            PortalError::Network(_) | PortalError::Status { .. } | PortalError::InvalidUrl(_)
        )
    }
}
