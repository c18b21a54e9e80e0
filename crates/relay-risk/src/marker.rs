//! Durable trading-disabled marker.
//!
//! A small JSON file on the host, written once per breach episode and
//! readable by any process. The dispatch loop refuses new signals while
//! it exists; it survives process restarts and is cleared only by an
//! operator.

use crate::error::RiskResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Contents of the marker file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// Human-readable breach description.
    pub reason: String,
    /// When trading was disabled.
    pub disabled_at: DateTime<Utc>,
    /// Process that wrote the marker.
    pub source: String,
}

impl MarkerRecord {
    /// Create a record stamped with the current time.
    pub fn new(reason: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            disabled_at: Utc::now(),
            source: source.into(),
        }
    }
}

/// Handle to the trading-disabled marker file.
#[derive(Debug, Clone)]
pub struct DisabledMarker {
    path: PathBuf,
}

impl DisabledMarker {
    /// Create a handle for the given path. The file is not touched.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the marker is present.
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Write the marker atomically (temp file + rename), so a reader
    /// never observes a partial record.
    pub fn write(&self, record: &MarkerRecord) -> RiskResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(record)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;

        info!(path = %self.path.display(), reason = %record.reason, "Trading-disabled marker written");
        Ok(())
    }

    /// Read the marker record, if present.
    ///
    /// An unreadable or corrupt marker still counts as set (`is_set()`),
    /// but yields `None` here.
    pub fn read(&self) -> Option<MarkerRecord> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt marker file");
                None
            }
        }
    }

    /// Remove the marker. Missing file is not an error.
    pub fn clear(&self) -> RiskResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Trading-disabled marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_in_tempdir() -> (tempfile::TempDir, DisabledMarker) {
        let dir = tempfile::tempdir().unwrap();
        let marker = DisabledMarker::new(dir.path().join("trading_disabled.json"));
        (dir, marker)
    }

    #[test]
    fn test_marker_roundtrip() {
        let (_dir, marker) = marker_in_tempdir();
        assert!(!marker.is_set());

        let record = MarkerRecord::new("drawdown 12% exceeds limit 10%", "riskd");
        marker.write(&record).unwrap();

        assert!(marker.is_set());
        let back = marker.read().unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (_dir, marker) = marker_in_tempdir();
        marker.clear().unwrap();

        marker
            .write(&MarkerRecord::new("manual", "test"))
            .unwrap();
        marker.clear().unwrap();
        assert!(!marker.is_set());
        marker.clear().unwrap();
    }

    #[test]
    fn test_corrupt_marker_still_counts_as_set() {
        let (_dir, marker) = marker_in_tempdir();
        std::fs::write(marker.path(), b"not json").unwrap();

        assert!(marker.is_set());
        assert!(marker.read().is_none());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let (dir, marker) = marker_in_tempdir();
        marker
            .write(&MarkerRecord::new("manual", "test"))
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
