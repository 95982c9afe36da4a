//! Composition root: every long-lived service, built once at process start from
//! [`AppConfig`] and the two capabilities the host supplies.

use std::sync::Arc;

use portal::{PortalClient, PortalConfig};
use tracing::info;
use util::config::AppConfig;

use crate::achieve_service::AchieveService;
use crate::calendar::TermConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::exam_service::ExamService;
use crate::export::{ExportConfig, ExportEngine};
use crate::record_cache::{RecordCacheGateway, RecordStore};
use crate::session::SessionProvider;

#[derive(Clone)]
pub struct AppServices {
    pub achieve: AchieveService,
    pub exams: ExamService,
    pub export: Arc<ExportEngine>,
    pub term: TermConfig,
}

impl AppServices {
    /// Builds from the process-wide [`AppConfig`].
    pub fn from_global(
        sessions: Arc<dyn SessionProvider>,
        store: Arc<dyn RecordStore>,
    ) -> ServiceResult<Self> {
        let config = AppConfig::global().clone();
        Self::build(&config, sessions, store)
    }

    pub fn build(
        config: &AppConfig,
        sessions: Arc<dyn SessionProvider>,
        store: Arc<dyn RecordStore>,
    ) -> ServiceResult<Self> {
        let portal_config = PortalConfig::from_app(config);
        let portal = PortalClient::new(&portal_config)
            .map_err(|e| ServiceError::Infrastructure(format!("portal client: {e}")))?;
        let term = TermConfig::from_app(config)?;

        let achieve = AchieveService::new(
            portal.clone(),
            sessions.clone(),
            RecordCacheGateway::new(store),
        );
        let exams = ExamService::new(portal, sessions);

        let export_config = ExportConfig::from_app(config);
        info!(
            portal = %portal_config.base_url,
            export_root = %export_config.root.display(),
            concurrency = export_config.concurrency,
            "services ready"
        );
        let export = Arc::new(ExportEngine::new(export_config, Arc::new(achieve.clone())));

        Ok(Self {
            achieve,
            exams,
            export,
            term,
        })
    }
}
