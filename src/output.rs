//! Document values passed between pipeline stages, and the per-page and
//! per-batch results handed back to callers.
//!
//! Every document type is produced by exactly one stage and consumed by the
//! next:
//!
//! ```text
//! RawDocument ──▶ NormalizedDocument ──▶ ConvertedDocument ──▶ FinalDocument
//!   (fetch)          (normalize)             (adapter)           (postprocess)
//! ```

use crate::error::{NormalizationWarning, PageError};
use crate::markers::MarkerTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies one wiki page: a bare title or a full URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageReference {
    Title(String),
    Url(String),
}

impl PageReference {
    /// Interpret a command-line argument. Anything with an HTTP(S) scheme is a URL.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if crate::pipeline::fetch::is_url(input) {
            PageReference::Url(input.to_string())
        } else {
            PageReference::Title(input.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PageReference::Title(t) => t,
            PageReference::Url(u) => u,
        }
    }
}

impl fmt::Display for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unmodified markup as returned by the wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Display title (spaces, not underscores).
    pub title: String,
    /// The URL the markup was retrieved from.
    pub source_url: String,
    /// Wiki page id, when the endpoint reports one (API mode only).
    pub page_id: Option<u64>,
    pub markup: String,
}

/// Markup rewritten into the engine's source dialect plus opaque markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub title: String,
    pub markup: String,
    pub markers: MarkerTable,
    /// Category names in first-seen order, deduplicated.
    pub categories: Vec<String>,
    pub warnings: Vec<NormalizationWarning>,
}

/// Engine output; may still carry marker tokens and converter artefacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedDocument {
    pub title: String,
    pub asciidoc: String,
    pub markers: MarkerTable,
}

/// Postprocessed AsciiDoc, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalDocument {
    pub title: String,
    pub asciidoc: String,
}

/// Outcome of converting one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub reference: PageReference,
    /// Resolved display title, once known.
    pub title: Option<String>,
    /// Wiki page id, when the wiki reported one.
    #[serde(default)]
    pub page_id: Option<u64>,
    pub outcome: Result<FinalDocument, PageError>,
    pub warnings: Vec<NormalizationWarning>,
    pub categories: Vec<String>,
    /// Where the document was written, if a writer ran and succeeded.
    pub output_path: Option<PathBuf>,
    pub duration_ms: u64,
}

impl ConversionResult {
    pub(crate) fn failed(reference: PageReference, error: PageError) -> Self {
        Self {
            reference,
            title: None,
            page_id: None,
            outcome: Err(error),
            warnings: Vec::new(),
            categories: Vec::new(),
            output_path: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&PageError> {
        self.outcome.as_ref().err()
    }

    /// The final AsciiDoc text, if the page converted.
    pub fn asciidoc(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(|d| d.asciidoc.as_str())
    }
}

/// Aggregate counters for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Subset of `failed` that never started because the batch was cancelled.
    pub cancelled: usize,
    /// Normalisation warnings summed over every page.
    pub warnings: usize,
    pub duration_ms: u64,
}

impl BatchStats {
    pub fn from_results(results: &[ConversionResult], duration_ms: u64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let cancelled = results
            .iter()
            .filter(|r| matches!(r.error(), Some(PageError::Cancelled)))
            .count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            cancelled,
            warnings: results.iter().map(|r| r.warnings.len()).sum(),
            duration_ms,
        }
    }
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub results: Vec<ConversionResult>,
    pub stats: BatchStats,
}

impl BatchOutput {
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    fn ok(title: &str) -> ConversionResult {
        ConversionResult {
            reference: PageReference::Title(title.into()),
            title: Some(title.into()),
            page_id: None,
            outcome: Ok(FinalDocument {
                title: title.into(),
                asciidoc: format!("= {title}\n"),
            }),
            warnings: vec![NormalizationWarning::new(
                crate::error::WarningKind::Template,
                "{{Stub}}",
            )],
            categories: vec![],
            output_path: None,
            duration_ms: 3,
        }
    }

    #[test]
    fn parse_reference_kinds() {
        assert_eq!(
            PageReference::parse("Main Page"),
            PageReference::Title("Main Page".into())
        );
        assert_eq!(
            PageReference::parse(" https://wiki.example.org/wiki/Intro "),
            PageReference::Url("https://wiki.example.org/wiki/Intro".into())
        );
    }

    #[test]
    fn stats_count_outcomes() {
        let results = vec![
            ok("A"),
            ok("B"),
            ConversionResult::failed(
                PageReference::Title("C".into()),
                FetchError::NotFound { title: "C".into() }.into(),
            ),
            ConversionResult::failed(PageReference::Title("D".into()), PageError::Cancelled),
        ];
        let stats = BatchStats::from_results(&results, 42);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.warnings, 2);
        assert_eq!(stats.duration_ms, 42);
    }

    #[test]
    fn result_serialises_outcome() {
        let json = serde_json::to_string(&ok("Intro")).unwrap();
        assert!(json.contains("\"Ok\""), "got: {json}");
        assert!(json.contains("= Intro"));
    }
}
