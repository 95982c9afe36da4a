//! Exam schedule service. Schedules change often and are never cached.

use std::sync::Arc;

use portal::extractor::extract_exams;
use portal::{ExamRecord, PortalClient, ScrapeResult};
use tracing::{error, info};

use crate::error::{EMPTY_IDENTIFIER, NO_EXAMS_FOR_ROLE, ServiceError, ServiceResult};
use crate::session::{Identity, Session, SessionProvider, with_session_retry};

#[derive(Clone)]
pub struct ExamService {
    portal: PortalClient,
    sessions: Arc<dyn SessionProvider>,
}

impl ExamService {
    pub fn new(portal: PortalClient, sessions: Arc<dyn SessionProvider>) -> Self {
        Self { portal, sessions }
    }

    pub async fn get(&self, user_id: &str) -> ServiceResult<ScrapeResult<Vec<ExamRecord>>> {
        if user_id.trim().is_empty() {
            return Err(ServiceError::Validation(EMPTY_IDENTIFIER.into()));
        }

        with_session_retry(self.sessions.as_ref(), user_id, move |session| {
            self.scrape_with(user_id, session)
        })
        .await
        .inspect_err(|e| error!(user_id, error = %e, "exam schedule request failed"))
    }

    async fn scrape_with(
        &self,
        user_id: &str,
        session: Session,
    ) -> ServiceResult<ScrapeResult<Vec<ExamRecord>>> {
        if session.identity != Identity::Student {
            info!(user_id, identity = ?session.identity, "exam schedule requested for non-student");
            return Err(ServiceError::Validation(NO_EXAMS_FOR_ROLE.into()));
        }

        let body = self.portal.fetch_exam_schedule(user_id, &session.handle).await?;
        let exams = extract_exams(&body)?;
        info!(user_id, count = exams.len(), "exam schedule scraped");

        Ok(ScrapeResult {
            records: exams,
            source_name: session.profile.name,
        })
    }
}
