//! Transcript ("achieve") service: scrape, extract, cache.

use std::sync::Arc;

use async_trait::async_trait;
use portal::extractor::extract_transcript;
use portal::{AcademicPeriod, PortalClient, ScrapeResult, Transcript};
use tracing::{error, info};

use crate::error::{EMPTY_IDENTIFIER, NO_TRANSCRIPT_FOR_ROLE, ServiceError, ServiceResult};
use crate::record_cache::{CachedTranscript, NameCheck, RecordCacheGateway};
use crate::session::{Identity, Session, SessionProvider, UserProfile, with_session_retry};

/// A fresh transcript plus the outcome of the identity check made while caching it.
#[derive(Debug, Clone)]
pub struct AchieveReport {
    pub result: ScrapeResult<Transcript>,
    pub name_check: NameCheck,
}

/// Anything that can produce a fresh transcript for one user. The export engine depends
/// on this rather than on [`AchieveService`] directly.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn transcript(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
        expected_name: Option<&str>,
    ) -> ServiceResult<AchieveReport>;
}

#[derive(Clone)]
pub struct AchieveService {
    portal: PortalClient,
    sessions: Arc<dyn SessionProvider>,
    cache: RecordCacheGateway,
}

impl AchieveService {
    pub fn new(
        portal: PortalClient,
        sessions: Arc<dyn SessionProvider>,
        cache: RecordCacheGateway,
    ) -> Self {
        Self {
            portal,
            sessions,
            cache,
        }
    }

    /// Scrapes the transcript for `period` and overwrites the cache with it.
    ///
    /// The session is looked up first; a session rejected by the upstream is refreshed and
    /// the scrape retried once.
    pub async fn get(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
        expected_name: Option<&str>,
    ) -> ServiceResult<AchieveReport> {
        if user_id.trim().is_empty() {
            return Err(ServiceError::Validation(EMPTY_IDENTIFIER.into()));
        }

        with_session_retry(self.sessions.as_ref(), user_id, move |session| {
            self.scrape_with(user_id, period, session, expected_name)
        })
        .await
        .inspect_err(|e| error!(user_id, %period, error = %e, "transcript request failed"))
    }

    /// The last stored transcript for `period`, without contacting the upstream.
    pub async fn cached(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
    ) -> ServiceResult<Option<CachedTranscript>> {
        self.cache.get(user_id, period).await
    }

    async fn scrape_with(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
        session: Session,
        expected_name: Option<&str>,
    ) -> ServiceResult<AchieveReport> {
        if session.identity != Identity::Student {
            info!(user_id, identity = ?session.identity, "transcript requested for non-student");
            return Err(ServiceError::Validation(NO_TRANSCRIPT_FOR_ROLE.into()));
        }
        self.student_achieve(user_id, period, &session.handle, &session.profile, expected_name)
            .await
    }

    /// Fetches, extracts and caches one student's transcript using an existing session.
    pub async fn student_achieve(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
        session: &str,
        profile: &UserProfile,
        expected_name: Option<&str>,
    ) -> ServiceResult<AchieveReport> {
        let body = self.portal.fetch_transcript(user_id, period, session).await?;
        let transcript = extract_transcript(&body).inspect_err(|e| {
            error!(user_id, %period, error = %e, "transcript page layout not recognised");
        })?;

        info!(
            user_id,
            %period,
            current = transcript.current.len(),
            failed = transcript.failed.len(),
            "transcript scraped"
        );

        let result = ScrapeResult {
            records: transcript,
            source_name: profile.name.clone(),
        };
        let name_check = self
            .cache
            .update(user_id, profile, period, &result, expected_name)
            .await;

        Ok(AchieveReport { result, name_check })
    }
}

#[async_trait]
impl TranscriptSource for AchieveService {
    async fn transcript(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
        expected_name: Option<&str>,
    ) -> ServiceResult<AchieveReport> {
        self.get(user_id, period, expected_name).await
    }
}
