//! Account metrics provider trait.
//!
//! Trait-based abstraction over the account metrics source so the
//! governor can be driven by the JSON export in production and by a mock
//! in tests.

use crate::error::{RiskError, RiskResult};
use crate::BoxFuture;
use parking_lot::Mutex;
use relay_core::RiskSnapshot;
use std::path::PathBuf;

/// Source of account risk snapshots, polled once per governor tick.
pub trait MetricsProvider: Send + Sync {
    /// Pull one fresh snapshot.
    fn snapshot(&self) -> BoxFuture<'_, RiskResult<RiskSnapshot>>;
}

/// Reads snapshots from the account-metrics JSON export on disk.
///
/// The main process rewrites this file from each STATUS_RESPONSE; the
/// governor only ever reads it, keeping the process boundary file-based.
pub struct FileMetricsProvider {
    path: PathBuf,
}

impl FileMetricsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsProvider for FileMetricsProvider {
    fn snapshot(&self) -> BoxFuture<'_, RiskResult<RiskSnapshot>> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| RiskError::MetricsUnavailable(format!("{}: {}", self.path.display(), e)))?;
            let snapshot = serde_json::from_str(&content)
                .map_err(|e| RiskError::MetricsUnavailable(format!("{}: {}", self.path.display(), e)))?;
            Ok(snapshot)
        })
    }
}

/// Mock provider for testing.
pub struct MockMetricsProvider {
    current: Mutex<Option<RiskSnapshot>>,
    polls: std::sync::atomic::AtomicU32,
}

impl Default for MockMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetricsProvider {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            polls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Set the snapshot returned by subsequent polls.
    pub fn set(&self, snapshot: RiskSnapshot) {
        *self.current.lock() = Some(snapshot);
    }

    /// Number of polls served so far.
    pub fn poll_count(&self) -> u32 {
        self.polls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl MetricsProvider for MockMetricsProvider {
    fn snapshot(&self) -> BoxFuture<'_, RiskResult<RiskSnapshot>> {
        Box::pin(async move {
            self.polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.current
                .lock()
                .clone()
                .ok_or_else(|| RiskError::MetricsUnavailable("no snapshot configured".to_string()))
        })
    }
}
