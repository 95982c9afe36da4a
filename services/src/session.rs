//! External capabilities consumed by the services: upstream session issuance.
//!
//! Sessions are per user and short-lived; providers hand out a fresh value per call and
//! nothing here pools or shares them between users.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ServiceResult;

/// Role of a portal account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    Student,
    Staff,
}

/// What the portal knows about an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub faculty: i32,
    pub specialty: i32,
    pub class: i32,
    pub grade: i32,
}

/// A live upstream session plus the account it belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    pub handle: String,
    pub identity: Identity,
    pub profile: UserProfile,
}

/// Whether a previously issued session may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHint {
    Cached,
    /// The last session was rejected upstream; log in again.
    Refresh,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, user_id: &str, hint: SessionHint) -> ServiceResult<Session>;
}

/// Runs `op` with the user's current session and, if the upstream rejected it, once more
/// with a refreshed one. Any failure of the second attempt is returned as is.
pub async fn with_session_retry<T, F, Fut>(
    sessions: &dyn SessionProvider,
    user_id: &str,
    mut op: F,
) -> ServiceResult<T>
where
    F: FnMut(Session) -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let session = sessions.session(user_id, SessionHint::Cached).await?;
    match op(session).await {
        Err(e) if e.is_retryable_with_new_session() => {
            warn!(user_id, error = %e, "upstream rejected session, retrying with a fresh one");
            let session = sessions.session(user_id, SessionHint::Refresh).await?;
            op(session).await
        }
        other => other,
    }
}
