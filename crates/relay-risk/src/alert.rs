//! Operator alert dispatcher trait.
//!
//! The real delivery channel (email/SMS) is an external collaborator;
//! this crate ships a tracing-backed implementation and a recording mock.

use crate::error::{RiskError, RiskResult};
use crate::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Delivers operator notifications.
pub trait AlertDispatcher: Send + Sync {
    fn dispatch(
        &self,
        severity: AlertSeverity,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, RiskResult<()>>;
}

/// Tracing-backed dispatcher: alerts become structured log events.
#[derive(Debug, Default)]
pub struct LogAlertDispatcher;

impl AlertDispatcher for LogAlertDispatcher {
    fn dispatch(
        &self,
        severity: AlertSeverity,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, RiskResult<()>> {
        let subject = subject.to_string();
        let body = body.to_string();
        Box::pin(async move {
            match severity {
                AlertSeverity::Info => info!(%subject, %body, "ALERT"),
                AlertSeverity::Warning => warn!(%subject, %body, "ALERT"),
                AlertSeverity::Critical => error!(%subject, %body, "ALERT"),
            }
            Ok(())
        })
    }
}

/// Recording mock for tests.
#[derive(Debug, Default)]
pub struct MockAlertDispatcher {
    sent: Mutex<Vec<(AlertSeverity, String, String)>>,
    fail: AtomicBool,
}

impl MockAlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent dispatches fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Alerts recorded so far.
    pub fn sent(&self) -> Vec<(AlertSeverity, String, String)> {
        self.sent.lock().clone()
    }

    /// Number of alerts at the given severity.
    pub fn count_at(&self, severity: AlertSeverity) -> usize {
        self.sent.lock().iter().filter(|(s, _, _)| *s == severity).count()
    }
}

impl AlertDispatcher for MockAlertDispatcher {
    fn dispatch(
        &self,
        severity: AlertSeverity,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, RiskResult<()>> {
        let subject = subject.to_string();
        let body = body.to_string();
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RiskError::AlertFailed("mock failure".to_string()));
            }
            self.sent.lock().push((severity, subject, body));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_alerts() {
        let dispatcher = MockAlertDispatcher::new();
        dispatcher
            .dispatch(AlertSeverity::Critical, "breach", "drawdown")
            .await
            .unwrap();

        assert_eq!(dispatcher.count_at(AlertSeverity::Critical), 1);
        assert_eq!(dispatcher.count_at(AlertSeverity::Warning), 0);
    }

    #[tokio::test]
    async fn test_mock_failure_mode() {
        let dispatcher = MockAlertDispatcher::new();
        dispatcher.set_fail(true);

        let result = dispatcher
            .dispatch(AlertSeverity::Warning, "cpu", "pressure")
            .await;
        assert!(result.is_err());
        assert!(dispatcher.sent().is_empty());
    }
}
