//! Engine adapter: drive one conversion through the configured engine.
//!
//! The adapter always asks for MediaWiki → AsciiDoc explicitly; engines are
//! never left to guess the source dialect.
//!
//! ## Retry Strategy
//!
//! Engine output is a pure function of its input, so a retry only helps an
//! engine that failed for reasons of its own (a crashed process, a busy
//! service). Retries are off by default. When enabled, the wait doubles per
//! attempt (`retry_backoff_ms * 2^attempt`, capped at [`MAX_BACKOFF`]). An
//! unavailable engine is never retried: the batch escalates it to a fatal
//! error instead.

use crate::config::ConversionConfig;
use crate::engine::{ConversionEngine, Dialect, EngineError};
use crate::error::PageError;
use crate::output::{ConvertedDocument, NormalizedDocument};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Longest wait between two attempts, however many retries are configured.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Wait before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// saturating and capped at [`MAX_BACKOFF`].
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Convert a normalised document, with timeout and bounded retry.
pub async fn convert_document(
    engine: &Arc<dyn ConversionEngine>,
    doc: &NormalizedDocument,
    config: &ConversionConfig,
) -> Result<ConvertedDocument, PageError> {
    let start = Instant::now();
    let limit = Duration::from_secs(config.engine_timeout_secs);
    let mut last_err: Option<PageError> = None;

    for attempt in 0..=config.engine_retries {
        if attempt > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempt);
            warn!(
                "{}: engine retry {}/{} after {}ms",
                doc.title,
                attempt,
                config.engine_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        let call = engine.convert(&doc.markup, Dialect::MediaWiki, Dialect::AsciiDoc);
        match timeout(limit, call).await {
            Ok(Ok(asciidoc)) => {
                debug!(
                    "{}: {} engine produced {} bytes in {:?}",
                    doc.title,
                    engine.name(),
                    asciidoc.len(),
                    start.elapsed()
                );
                return Ok(ConvertedDocument {
                    title: doc.title.clone(),
                    asciidoc,
                    markers: doc.markers.clone(),
                });
            }
            Ok(Err(EngineError::Unavailable(e))) => return Err(PageError::EngineUnavailable(e)),
            Ok(Err(EngineError::Failed(e))) => {
                warn!("{}: attempt {} failed: {}", doc.title, attempt + 1, e);
                last_err = Some(PageError::Engine(e));
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    doc.title,
                    attempt + 1,
                    config.engine_timeout_secs
                );
                last_err = Some(PageError::EngineTimeout {
                    engine: engine.name().to_string(),
                    secs: config.engine_timeout_secs,
                });
            }
        }
    }

    Err(last_err.unwrap_or(PageError::EngineTimeout {
        engine: engine.name().to_string(),
        secs: config.engine_timeout_secs,
    }))
}
