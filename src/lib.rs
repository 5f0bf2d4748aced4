//! # wiki2adoc
//!
//! Convert wiki pages to AsciiDoc documents.
//!
//! Generic document converters read MediaWiki markup well enough for
//! headings, lists and emphasis, but lose what makes a wiki a wiki:
//! internal links, file embeds, templates, categories and attribute-laden
//! tables. This crate rewrites those constructs before conversion and
//! resolves them afterwards, so the engine only sees core syntax and the
//! output links to sibling `.adoc` files instead of dead wiki URLs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Page title / URL
//!  │
//!  ├─ 1. Fetch        index.php?action=raw or api.php, per-host rate limits
//!  ├─ 2. Normalize    links/images → markers, templates and categories stripped
//!  ├─ 3. Convert      pandoc (or the native engine) MediaWiki → AsciiDoc
//!  ├─ 4. Polish       markers → xref/image macros, header, heading levels
//!  └─ 5. Write        one .adoc per page, atomic rename
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wiki2adoc::{convert_to_dir, ConversionConfig, PageReference};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .wiki_url("https://wiki.example.org")
//!         .build()?;
//!     let refs = vec![PageReference::parse("Main Page")];
//!     let output = convert_to_dir(refs, "docs", &config).await?;
//!     eprintln!("{}/{} pages converted",
//!         output.stats.succeeded,
//!         output.stats.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `wiki2adoc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! wiki2adoc = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing an Engine
//!
//! | Engine | Needs | Coverage |
//! |--------|-------|----------|
//! | `pandoc` (default) | `pandoc` on `PATH` | Broad; pandoc's own MediaWiki reader |
//! | `native` | nothing | Core syntax: headings, lists, emphasis, code, tables |
//!
//! Any other converter can be plugged in by implementing [`ConversionEngine`]
//! and passing it to [`ConversionConfigBuilder::engine`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod markers;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod wikitext;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationFlag;
pub use config::{
    ConversionConfig, ConversionConfigBuilder, EngineKind, FetchMode, FileNaming, LinkStyle,
};
pub use convert::{convert_batch, convert_page, convert_text, convert_to_dir, convert_to_dir_sync};
pub use engine::{ConversionEngine, Dialect, EngineError, NativeEngine, PandocEngine};
pub use error::{
    ConversionEngineError, EngineUnavailable, FetchError, NormalizationWarning, PageError,
    WarningKind, Wiki2AdocError, WriteError,
};
pub use output::{
    BatchOutput, BatchStats, ConversionResult, ConvertedDocument, FinalDocument,
    NormalizedDocument, PageReference, RawDocument,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, convert_stream_to_dir, ResultStream};
