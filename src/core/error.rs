use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the sync backend.
/// Every module returns `Result<T, SyncError>`.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote {operation} failed: HTTP {status}: {body}")]
    RemoteStatus {
        operation: String,
        status: u16,
        body: String,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("MD5 mismatch for {title}: expected {expected}, got {actual}")]
    Md5Mismatch {
        title: String,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unpack destination already exists: {0:?}")]
    DestinationExists(PathBuf),

    // ── Configuration ───────────────────────────────────
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Saves directory does not exist: {0:?}")]
    SavesRootMissing(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    // ── Remote entries ──────────────────────────────────
    #[error("Remote entry not found: {0}")]
    NotFound(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether retrying the same remote call may succeed.
    ///
    /// Rate limiting, server-side failures and connection-level errors are
    /// transient; everything else (bad requests, missing entries, local IO)
    /// is not.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            SyncError::RemoteStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Configuration errors abort a run before any remote call is made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::UnsupportedPlatform(_)
                | SyncError::SavesRootMissing(_)
                | SyncError::Config(_)
        )
    }
}

impl From<std::io::Error> for SyncError {
    fn from(source: std::io::Error) -> Self {
        SyncError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for status consumers ──────────────────
// Failure details are reported to the frontend as plain strings.
impl serde::Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
