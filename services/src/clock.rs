//! Wall clock abstraction, so task-id derivation can be pinned in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

pub trait Clock: Send + Sync {
    /// Seconds since the UNIX epoch.
    fn unix_seconds(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    seconds: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn at(unix_seconds: i64) -> Self {
        Self {
            seconds: Arc::new(AtomicI64::new(unix_seconds)),
        }
    }

    pub fn set(&self, unix_seconds: i64) {
        self.seconds.store(unix_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.seconds.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn unix_seconds(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}
