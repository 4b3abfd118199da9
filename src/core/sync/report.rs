use serde::Serialize;
use tracing::warn;

use crate::core::error::SyncError;

/// A single item that could not be processed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncFailure {
    pub item: String,
    pub error: String,
}

/// What a pass did. Per-item failures land here instead of aborting the pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub downloaded: Vec<String>,
    pub deleted: Vec<String>,
    pub backed_up: Vec<String>,
    /// Remote entries left in place because their replacement failed.
    pub kept: Vec<String>,
    pub failures: Vec<SyncFailure>,
    /// The pass had nothing to do and touched nothing.
    pub skipped: bool,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn record_failure(&mut self, item: impl Into<String>, err: &SyncError) {
        let item = item.into();
        warn!("{}: {}", item, err);
        self.failures.push(SyncFailure {
            item,
            error: err.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
