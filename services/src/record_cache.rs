//! Record cache gateway.
//!
//! Scraped transcripts are stored per `(user, period)` key with last-write-wins
//! semantics: every update replaces the whole record set for its key. The gateway also
//! compares the name the upstream echoed with the name the caller expected, so stale
//! identity mappings surface as warnings without blocking the write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal::{AcademicPeriod, ScrapeResult, Transcript};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::error::ServiceResult;
use crate::session::UserProfile;

/// A stored record set together with the name it was scraped under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTranscript {
    pub transcript: Transcript,
    pub source_name: String,
    pub stored_at: DateTime<Utc>,
}

/// Storage capability for scraped transcripts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn cached_records(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
    ) -> ServiceResult<Option<CachedTranscript>>;

    /// Replaces whatever is stored for `(user_id, period)`.
    async fn store_records(
        &self,
        user_id: &str,
        profile: &UserProfile,
        period: &AcademicPeriod,
        records: CachedTranscript,
    ) -> ServiceResult<()>;
}

/// In-process store, used when no external storage is wired in and in tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    entries: RwLock<HashMap<(String, AcademicPeriod), CachedTranscript>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn cached_records(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
    ) -> ServiceResult<Option<CachedTranscript>> {
        let key = (user_id.to_string(), period.clone());
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn store_records(
        &self,
        user_id: &str,
        _profile: &UserProfile,
        period: &AcademicPeriod,
        records: CachedTranscript,
    ) -> ServiceResult<()> {
        self.entries
            .write()
            .await
            .insert((user_id.to_string(), period.clone()), records);
        Ok(())
    }
}

/// Outcome of comparing the upstream name with the caller's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NameCheck {
    /// The caller supplied no display name.
    Unchecked,
    Match,
    Mismatch { expected: String, internal: String },
}

impl NameCheck {
    pub fn compare(expected: Option<&str>, internal: &str) -> Self {
        match expected {
            None => NameCheck::Unchecked,
            Some(e) if e == internal => NameCheck::Match,
            Some(e) => NameCheck::Mismatch {
                expected: e.to_string(),
                internal: internal.to_string(),
            },
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, NameCheck::Mismatch { .. })
    }
}

#[derive(Clone)]
pub struct RecordCacheGateway {
    store: Arc<dyn RecordStore>,
}

impl RecordCacheGateway {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The cached record set for `(user_id, period)`, if one was ever stored.
    pub async fn get(
        &self,
        user_id: &str,
        period: &AcademicPeriod,
    ) -> ServiceResult<Option<CachedTranscript>> {
        let hit = self.store.cached_records(user_id, period).await?;
        debug!(user_id, %period, hit = hit.is_some(), "record cache lookup");
        Ok(hit)
    }

    /// Overwrites the cached record set with a fresh scrape.
    ///
    /// A failed write is logged and does not fail the caller: the scrape itself succeeded
    /// and is still returned.
    pub async fn update(
        &self,
        user_id: &str,
        profile: &UserProfile,
        period: &AcademicPeriod,
        result: &ScrapeResult<Transcript>,
        expected_name: Option<&str>,
    ) -> NameCheck {
        let check = NameCheck::compare(expected_name, &result.source_name);
        if let NameCheck::Mismatch { expected, internal } = &check {
            warn!(user_id, %expected, %internal, "upstream name differs from display name");
        }

        let entry = CachedTranscript {
            transcript: result.records.clone(),
            source_name: result.source_name.clone(),
            stored_at: Utc::now(),
        };
        if let Err(e) = self.store.store_records(user_id, profile, period, entry).await {
            error!(user_id, %period, error = %e, "failed to update record cache");
        }
        check
    }
}
