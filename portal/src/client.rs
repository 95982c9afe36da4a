//! HTTP client for the upstream academic portal.
//!
//! The portal is a classic postback application: a GET renders the form together with a
//! `__VIEWSTATE` token, and a POST carrying that token (plus the form fields below) renders
//! the requested data. Redirects are never followed, because an expired session is
//! reported by redirecting to the login page.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, Url, header, redirect};
use tracing::{debug, error, warn};
use util::config::AppConfig;

use crate::error::{PortalError, Stage};
use crate::types::AcademicPeriod;

/// Cookie carrying the upstream session handle.
pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";
/// Fixed `__VIEWSTATEGENERATOR` value of the transcript form.
pub const VIEWSTATE_GENERATOR: &str = "17EB693E";
/// Score range sent with every transcript query.
pub const MIN_SCORE: &str = "0";
pub const MAX_SCORE: &str = "100";

const TRANSCRIPT_PAGE: &str = "xscj.aspx";
const EXAM_PAGE: &str = "xskscx.aspx";

static VIEWSTATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"__VIEWSTATE" value="(.*?)""#).expect("viewstate regex"));

/// Connection settings for the portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl PortalConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.portal_base_url.clone(),
            timeout: Duration::from_secs(config.portal_timeout_secs),
        }
    }
}

/// Returns the `__VIEWSTATE` token of a page, if it has one.
pub fn view_state(body: &str) -> Option<&str> {
    VIEWSTATE_RE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Stateless client; the session handle is supplied per call and never stored.
#[derive(Clone)]
pub struct PortalClient {
    http: Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn page_url(&self, page: &str, user_id: &str) -> Result<Url, PortalError> {
        Url::parse_with_params(&format!("{}/{}", self.base_url, page), &[("xh", user_id)])
            .map_err(|e| PortalError::InvalidUrl(format!("{}/{}: {e}", self.base_url, page)))
    }

    fn with_session(builder: RequestBuilder, url: &Url, session: &str) -> RequestBuilder {
        builder
            .header(header::COOKIE, format!("{SESSION_COOKIE}={session}"))
            .header(header::REFERER, url.as_str())
    }

    /// Reads a response body, turning redirects and server errors into typed failures and
    /// requiring a `__VIEWSTATE` token in what remains.
    async fn read_page(
        user_id: &str,
        stage: Stage,
        resp: Response,
    ) -> Result<String, PortalError> {
        let status = resp.status();
        debug!(user_id, %stage, status = status.as_u16(), "portal responded");

        if status.is_redirection() {
            let location = resp
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            warn!(user_id, %stage, %location, "portal redirected, session likely expired");
            return Err(PortalError::Redirected { stage, location });
        }
        if status.is_server_error() {
            error!(user_id, %stage, status = status.as_u16(), "portal server error");
            return Err(PortalError::Status {
                stage,
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.inspect_err(|e| {
            error!(user_id, %stage, error = %e, "failed to read portal response body");
        })?;

        if view_state(&body).is_none() {
            error!(user_id, %stage, "__VIEWSTATE not found");
            return Err(PortalError::MissingViewState { stage });
        }
        Ok(body)
    }

    async fn send(
        user_id: &str,
        stage: Stage,
        builder: RequestBuilder,
    ) -> Result<Response, PortalError> {
        builder.send().await.map_err(|e| {
            error!(user_id, %stage, error = %e, "portal request failed");
            PortalError::Network(e)
        })
    }

    /// Runs the two-step postback for a transcript and returns the raw result page.
    pub async fn fetch_transcript(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
        session: &str,
    ) -> Result<String, PortalError> {
        let url = self.page_url(TRANSCRIPT_PAGE, user_id)?;

        let get = Self::with_session(self.http.get(url.clone()), &url, session)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        let form_page = Self::read_page(user_id, Stage::Get, Self::send(user_id, Stage::Get, get).await?).await?;
        let token = view_state(&form_page).unwrap_or_default();

        let semester = period.semester.to_string();
        let fields = [
            ("__VIEWSTATE", token),
            ("__VIEWSTATEGENERATOR", VIEWSTATE_GENERATOR),
            ("ddlXN", period.year.as_str()),
            ("ddlXQ", semester.as_str()),
            ("txtQSCJ", MIN_SCORE),
            ("txtZZCJ", MAX_SCORE),
            ("Button1", period.query_mode().button_caption()),
        ];
        debug!(user_id, %period, "posting transcript query");

        let post = Self::with_session(self.http.post(url.clone()), &url, session).form(&fields);
        Self::read_page(user_id, Stage::Post, Self::send(user_id, Stage::Post, post).await?).await
    }

    /// Fetches the exam schedule page. The schedule is rendered directly on GET.
    pub async fn fetch_exam_schedule(
        &self,
        user_id: &str,
        session: &str,
    ) -> Result<String, PortalError> {
        let url = self.page_url(EXAM_PAGE, user_id)?;
        let get = Self::with_session(self.http.get(url.clone()), &url, session)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        Self::read_page(user_id, Stage::Get, Self::send(user_id, Stage::Get, get).await?).await
    }
}
