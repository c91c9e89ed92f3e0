//! Error types for the Xyston library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`XystonError`] enum. The variants split failures the way callers need to
//! react to them: corruption and format problems are fatal, capacity and
//! contract violations are caller bugs, and `ListingUnstable` is what a
//! bounded retry loop reports when directory listings never settle.

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Xyston operations.
#[derive(Error, Debug)]
pub enum XystonError {
    /// I/O errors (file operations, sync failures, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// The file does not start with a recognizable catalog header.
    #[error("Format error: {0}")]
    Format(String),

    /// The catalog (or a segment in it) was written by an engine version
    /// that is no longer readable. Reported distinctly so callers can
    /// suggest upgrading through an intermediate release.
    #[error("Version too old: {0}")]
    VersionTooOld(String),

    /// A persisted invariant does not hold: bad counts, version ordering,
    /// checksum mismatch, missing required fields.
    #[error("Corrupt catalog: {0}")]
    Corrupt(String),

    /// A segment record was rejected before it ever reached storage.
    #[error("Invalid segment record: {0}")]
    InvalidRecord(String),

    /// The configured document ceiling would be exceeded.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A contract violation by the caller: double-prepare, finish without
    /// prepare, decreasing a generation or version. Never retried.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// No catalog snapshot exists in the directory.
    #[error("Catalog not found: {0}")]
    CatalogNotFound(String),

    /// A snapshot references a codec name the registry cannot resolve.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// Directory listings kept changing for longer than the retry budget.
    #[error("Directory listing did not stabilize after {attempts} attempts")]
    ListingUnstable {
        /// Number of listing attempts made before giving up.
        attempts: usize,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with XystonError.
pub type Result<T> = std::result::Result<T, XystonError>;

impl XystonError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        XystonError::Storage(msg.into())
    }

    /// Create a new format error.
    pub fn format<S: Into<String>>(msg: S) -> Self {
        XystonError::Format(msg.into())
    }

    /// Create a new version-too-old error.
    pub fn version_too_old<S: Into<String>>(msg: S) -> Self {
        XystonError::VersionTooOld(msg.into())
    }

    /// Create a new corruption error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        XystonError::Corrupt(msg.into())
    }

    /// Create a new invalid-record error.
    pub fn invalid_record<S: Into<String>>(msg: S) -> Self {
        XystonError::InvalidRecord(msg.into())
    }

    /// Create a new capacity error.
    pub fn capacity<S: Into<String>>(msg: S) -> Self {
        XystonError::CapacityExceeded(msg.into())
    }

    /// Create a new illegal-state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        XystonError::IllegalState(msg.into())
    }

    /// Create a new not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        XystonError::CatalogNotFound(msg.into())
    }

    /// Create a new unknown-codec error.
    pub fn unknown_codec<S: Into<String>>(msg: S) -> Self {
        XystonError::UnknownCodec(msg.into())
    }

    /// Whether a load that failed with this error may be worth retrying
    /// after a concurrent writer has published a newer snapshot.
    ///
    /// Transient candidates are exactly the failures a racing writer can
    /// cause by superseding and deleting the snapshot mid-read: I/O and
    /// storage errors (file vanished, truncated read) and corruption
    /// (half of an old file, half of a new one). Deterministic failures
    /// like an unreadable format version or an unknown codec are not.
    pub fn is_load_transient(&self) -> bool {
        matches!(
            self,
            XystonError::Io(_) | XystonError::Storage(_) | XystonError::Corrupt(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = XystonError::corrupt("bad counts");
        assert_eq!(error.to_string(), "Corrupt catalog: bad counts");

        let error = XystonError::illegal_state("prepare already pending");
        assert_eq!(error.to_string(), "Illegal state: prepare already pending");

        let error = XystonError::ListingUnstable { attempts: 10 };
        assert_eq!(
            error.to_string(),
            "Directory listing did not stabilize after 10 attempts"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = XystonError::from(io_error);

        match error {
            XystonError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(XystonError::storage("gone").is_load_transient());
        assert!(XystonError::corrupt("torn read").is_load_transient());
        assert!(!XystonError::format("bad magic").is_load_transient());
        assert!(!XystonError::unknown_codec("nope").is_load_transient());
        assert!(!XystonError::version_too_old("v5").is_load_transient());
    }
}
