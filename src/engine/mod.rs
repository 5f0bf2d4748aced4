//! Document-conversion engines.
//!
//! The pipeline treats the converter as a black box behind
//! [`ConversionEngine`]. Two implementations ship:
//!
//! - [`PandocEngine`]: runs an external `pandoc` process per page.
//! - [`NativeEngine`]: a built-in MediaWiki → AsciiDoc converter with no
//!   external dependency.
//!
//! Tests and embedders inject their own engine through
//! [`crate::config::ConversionConfigBuilder::engine`].

pub mod native;
pub mod pandoc;

pub use native::NativeEngine;
pub use pandoc::PandocEngine;

use crate::config::{ConversionConfig, EngineKind};
use crate::error::{ConversionEngineError, EngineUnavailable};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Markup dialects an engine is asked to convert between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    MediaWiki,
    AsciiDoc,
}

impl Dialect {
    /// Pandoc's reader/writer name for this dialect.
    pub fn pandoc_name(self) -> &'static str {
        match self {
            Dialect::MediaWiki => "mediawiki",
            Dialect::AsciiDoc => "asciidoc",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pandoc_name())
    }
}

/// Why a single `convert` call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine cannot run at all. Never retried.
    #[error(transparent)]
    Unavailable(#[from] EngineUnavailable),

    /// The engine ran but rejected the input or crashed.
    #[error(transparent)]
    Failed(#[from] ConversionEngineError),
}

/// A general-purpose document converter.
///
/// Implementations must be safe to call from many tasks at once; the
/// pipeline bounds concurrency itself.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Check the engine can run, before any page is fetched.
    async fn probe(&self) -> Result<(), EngineUnavailable>;

    /// Convert `input` from one dialect to another.
    async fn convert(&self, input: &str, from: Dialect, to: Dialect)
        -> Result<String, EngineError>;
}

/// Pick the engine a run will use: an injected engine wins over the named kind.
pub fn resolve_engine(config: &ConversionConfig) -> Arc<dyn ConversionEngine> {
    if let Some(engine) = &config.engine {
        return Arc::clone(engine);
    }
    match config.engine_kind {
        EngineKind::Pandoc => Arc::new(PandocEngine::new(
            config.pandoc_path.clone(),
            config.pandoc_format.clone(),
        )),
        EngineKind::Native => Arc::new(NativeEngine::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_names() {
        assert_eq!(Dialect::MediaWiki.pandoc_name(), "mediawiki");
        assert_eq!(Dialect::AsciiDoc.to_string(), "asciidoc");
    }

    #[test]
    fn resolve_prefers_injected_engine() {
        let injected: Arc<dyn ConversionEngine> = Arc::new(NativeEngine::new());
        let config = ConversionConfig::builder()
            .engine_kind(EngineKind::Pandoc)
            .engine(Arc::clone(&injected))
            .build()
            .unwrap();
        assert_eq!(resolve_engine(&config).name(), "native");
    }

    #[test]
    fn resolve_by_kind() {
        let config = ConversionConfig::builder()
            .engine_kind(EngineKind::Pandoc)
            .build()
            .unwrap();
        assert_eq!(resolve_engine(&config).name(), "pandoc");
    }
}
