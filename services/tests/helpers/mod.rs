#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use portal::{AcademicPeriod, ScrapeResult, Transcript, TranscriptRecord};
use services::achieve_service::{AchieveReport, TranscriptSource};
use services::error::{ServiceError, ServiceResult};
use services::record_cache::{CachedTranscript, MemoryRecordStore, NameCheck, RecordStore};
use services::session::{Identity, Session, SessionHint, SessionProvider, UserProfile};

pub const FORM_PAGE: &str = r#"<html><form><input type="hidden" name="__VIEWSTATE" value="dDw0NTY3OTg=" />
<input type="hidden" name="__VIEWSTATEGENERATOR" value="17EB693E" /></form></html>"#;

/// Two transcript rows and no failed-course grid.
pub const RESULT_PAGE: &str = r#"<html><input type="hidden" name="__VIEWSTATE" value="next" />
<table class="datelist" id="DataGrid1">
<tr class="datelisthead"><td>学年</td><td>课程名称</td><td>性质</td><td>成绩</td><td>等级</td><td>x</td><td>补考</td><td>重修</td><td>学分</td></tr>
<tr><td>2021</td><td>高等数学</td><td>必修</td><td>91</td><td>A</td><td>-</td><td>0</td><td>0</td><td>4.0</td></tr>
<tr class="alt"><td>2021</td><td>大学物理</td><td>必修</td><td>66</td><td>D</td><td>-</td><td>0</td><td>1</td><td>3.0</td></tr>
</table></html>"#;

pub const LOGIN_PAGE: &str = "<html><body>please log in</body></html>";

/// Hands out one session handle per hint and remembers which hints were asked for.
pub struct FakeSessions {
    pub identity: Identity,
    pub name: String,
    pub hints: Mutex<Vec<SessionHint>>,
}

impl FakeSessions {
    pub fn student(name: &str) -> Self {
        Self {
            identity: Identity::Student,
            name: name.to_string(),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn staff() -> Self {
        Self {
            identity: Identity::Staff,
            name: "教师".to_string(),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn hints(&self) -> Vec<SessionHint> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn session(&self, _user_id: &str, hint: SessionHint) -> ServiceResult<Session> {
        self.hints.lock().unwrap().push(hint);
        let handle = match hint {
            SessionHint::Cached => "stale",
            SessionHint::Refresh => "fresh",
        };
        Ok(Session {
            handle: handle.to_string(),
            identity: self.identity,
            profile: UserProfile {
                name: self.name.clone(),
                ..Default::default()
            },
        })
    }
}

/// Memory store that counts writes.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryRecordStore,
    pub writes: AtomicUsize,
}

impl CountingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn cached_records(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
    ) -> ServiceResult<Option<CachedTranscript>> {
        self.inner.cached_records(user_id, period).await
    }

    async fn store_records(
        &self,
        user_id: &str,
        profile: &UserProfile,
        period: &AcademicPeriod,
        records: CachedTranscript,
    ) -> ServiceResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.store_records(user_id, profile, period, records).await
    }
}

/// What the fake source does for one user id.
#[derive(Clone)]
pub enum Scripted {
    /// Scrape succeeds; the upstream knows the user under this name.
    Name(String),
    Fail(String),
}

/// Transcript source driven by a script, tracking peak parallelism.
pub struct ScriptedSource {
    script: HashMap<String, Scripted>,
    delay: Duration,
    pub calls: AtomicUsize,
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = (&'static str, Scripted)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptSource for ScriptedSource {
    async fn transcript(
        &self,
        user_id: &str,
        _period: &AcademicPeriod,
        expected_name: Option<&str>,
    ) -> ServiceResult<AchieveReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match self.script.get(user_id) {
            Some(Scripted::Name(name)) => Ok(AchieveReport {
                result: ScrapeResult {
                    records: Transcript {
                        current: vec![TranscriptRecord {
                            name: "高等数学".into(),
                            paper_score: "91".into(),
                            ..Default::default()
                        }],
                        failed: Vec::new(),
                    },
                    source_name: name.clone(),
                },
                name_check: NameCheck::compare(expected_name, name),
            }),
            Some(Scripted::Fail(msg)) => Err(ServiceError::Validation(msg.clone())),
            None => Err(ServiceError::UpstreamProtocol("__VIEWSTATE not found".into())),
        }
    }
}
