//! Error types for the wiki2adoc library.
//!
//! Two tiers of failure exist, mirroring the two scopes a run can fail at:
//!
//! * [`Wiki2AdocError`]: **Fatal**: the run cannot proceed at all (the
//!   conversion engine is not installed, the configuration is invalid, the
//!   HTTP client could not be built). Returned as `Err` from the top-level
//!   `convert*` functions.
//!
//! * [`PageError`]: **Non-fatal**: one page failed (404, engine rejected
//!   the markup, disk full) while every other page is unaffected. Stored in
//!   [`crate::output::ConversionResult::outcome`] so a batch keeps going.
//!
//! [`NormalizationWarning`] is not an error at all: it records a lossy
//! rewrite and travels with a successful result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the wiki2adoc library.
#[derive(Debug, Error)]
pub enum Wiki2AdocError {
    /// The conversion engine cannot be reached; no page can succeed.
    #[error(transparent)]
    EngineUnavailable(#[from] EngineUnavailable),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The conversion engine is not installed or not reachable.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Conversion engine '{engine}' is unavailable: {reason}")]
pub struct EngineUnavailable {
    pub engine: String,
    pub reason: String,
}

/// Failure to retrieve a page from the wiki.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// The reference cannot be turned into a request URL.
    #[error("Cannot resolve page reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Transport-level failure (DNS, connection refused, TLS, …).
    #[error("Request to '{url}' failed: {reason}")]
    Network { url: String, reason: String },

    /// The request did not complete within the configured timeout.
    #[error("Request to '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// The wiki answered with a non-success status.
    #[error("HTTP {status} for '{url}'")]
    Status { url: String, status: u16 },

    /// The wiki reports the page does not exist.
    #[error("Page '{title}' not found")]
    NotFound { title: String },

    /// The response body could not be interpreted.
    #[error("Malformed response from '{url}': {detail}")]
    MalformedResponse { url: String, detail: String },
}

impl FetchError {
    /// Whether a caller-level retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// The engine rejected the normalised markup or terminated abnormally.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Conversion engine '{engine}' failed: {detail}")]
pub struct ConversionEngineError {
    pub engine: String,
    pub detail: String,
}

/// Failure to persist a final document.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Failed to write '{}': {reason}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    pub reason: String,
}

/// A non-fatal error for a single page.
///
/// The batch continues; the summary reports it and the exit code turns
/// non-zero.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Engine(#[from] ConversionEngineError),

    /// The engine did not answer within the configured timeout.
    #[error("Conversion engine '{engine}' timed out after {secs}s")]
    EngineTimeout { engine: String, secs: u64 },

    /// The engine vanished mid-run. Escalated to a fatal error by the batch.
    #[error(transparent)]
    EngineUnavailable(#[from] EngineUnavailable),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// The batch was cancelled before this page started.
    #[error("Cancelled before conversion started")]
    Cancelled,
}

/// What kind of lossy rewrite a [`NormalizationWarning`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A template or transclusion was removed.
    Template,
    /// Image embed options without an AsciiDoc equivalent were dropped.
    ImageOptions,
    /// An extension tag with no AsciiDoc analog was removed.
    UnsupportedTag,
    /// Brackets or braces did not balance; the text was kept literally.
    UnbalancedMarkup,
}

/// A non-fatal, recorded degradation of the source markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationWarning {
    pub kind: WarningKind,
    pub detail: String,
}

impl NormalizationWarning {
    pub fn new(kind: WarningKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            WarningKind::Template => "template removed",
            WarningKind::ImageOptions => "image options dropped",
            WarningKind::UnsupportedTag => "unsupported tag removed",
            WarningKind::UnbalancedMarkup => "unbalanced markup",
        };
        write!(f, "{kind}: {}", self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_names_url() {
        let e = FetchError::Status {
            url: "https://wiki.example.org/w/index.php".into(),
            status: 404,
        };
        let msg = e.to_string();
        assert!(msg.contains("404"), "got: {msg}");
        assert!(msg.contains("wiki.example.org"));
    }

    #[test]
    fn transient_classification() {
        let server = FetchError::Status {
            url: "u".into(),
            status: 503,
        };
        let throttled = FetchError::Status {
            url: "u".into(),
            status: 429,
        };
        let gone = FetchError::Status {
            url: "u".into(),
            status: 410,
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!gone.is_transient());
        assert!(!FetchError::NotFound { title: "X".into() }.is_transient());
        assert!(FetchError::Timeout {
            url: "u".into(),
            secs: 3
        }
        .is_transient());
    }

    #[test]
    fn page_error_wraps_transparently() {
        let e: PageError = WriteError {
            path: PathBuf::from("out/Intro.adoc"),
            reason: "disk full".into(),
        }
        .into();
        let msg = e.to_string();
        assert!(msg.contains("out/Intro.adoc"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn engine_unavailable_is_fatal_variant() {
        let e: Wiki2AdocError = EngineUnavailable {
            engine: "pandoc".into(),
            reason: "not found on PATH".into(),
        }
        .into();
        assert!(matches!(e, Wiki2AdocError::EngineUnavailable(_)));
        assert!(e.to_string().contains("pandoc"));
    }

    #[test]
    fn warning_display() {
        let w = NormalizationWarning::new(WarningKind::Template, "{{Infobox}}");
        assert_eq!(w.to_string(), "template removed: {{Infobox}}");
    }
}
