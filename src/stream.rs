//! Streaming conversion API: emit pages as they complete.
//!
//! Unlike the eager [`crate::convert::convert_batch`], which returns only
//! after every page finishes, [`convert_stream`] yields each
//! [`ConversionResult`] as soon as its page is done. Pages arrive in
//! completion order, not input order.
//!
//! Fatal errors (engine not available, bad HTTP client settings) are
//! reported before the stream is returned. An engine that disappears while
//! the stream runs surfaces as [`crate::error::PageError::EngineUnavailable`]
//! on the affected page; every page not yet started then finishes as
//! cancelled.

use crate::config::ConversionConfig;
use crate::convert::{convert_unit, prepare};
use crate::error::Wiki2AdocError;
use crate::output::{ConversionResult, PageReference};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type ResultStream = Pin<Box<dyn Stream<Item = ConversionResult> + Send>>;

/// Fetch and convert pages, streaming results as they are ready.
///
/// # Example
/// ```rust,no_run
/// use wiki2adoc::{convert_stream, ConversionConfig, PageReference};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder()
///     .wiki_url("https://wiki.example.org")
///     .build()?;
/// let refs = vec![PageReference::Title("Main Page".into())];
/// let mut results = convert_stream(refs, &config).await?;
/// while let Some(page) = results.next().await {
///     match page.asciidoc() {
///         Some(text) => println!("{}: {} bytes", page.reference, text.len()),
///         None => eprintln!("{}: {:?}", page.reference, page.error()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream(
    references: Vec<PageReference>,
    config: &ConversionConfig,
) -> Result<ResultStream, Wiki2AdocError> {
    build_stream(references, None, config).await
}

/// Like [`convert_stream`], writing each successful page under `output_dir`
/// before it is yielded.
pub async fn convert_stream_to_dir(
    references: Vec<PageReference>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ResultStream, Wiki2AdocError> {
    build_stream(references, Some(output_dir.as_ref().to_path_buf()), config).await
}

async fn build_stream(
    references: Vec<PageReference>,
    output_dir: Option<PathBuf>,
    config: &ConversionConfig,
) -> Result<ResultStream, Wiki2AdocError> {
    let (ctx, pages) = prepare(references, output_dir, config).await?;
    info!("Streaming {} pages", pages.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(pages.len());
    }

    let s = stream::iter(pages.into_iter().map(move |reference| {
        let ctx = Arc::clone(&ctx);
        convert_unit(ctx, reference)
    }))
    .buffer_unordered(config.concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NativeEngine;
    use crate::error::PageError;

    #[tokio::test]
    async fn stream_yields_every_reference() {
        let config = ConversionConfig::builder()
            .engine(Arc::new(NativeEngine::new()))
            .build()
            .unwrap();
        // No wiki URL: every title fails to resolve, without network access.
        let refs = vec![
            PageReference::Title("A".into()),
            PageReference::Title("B".into()),
            PageReference::Title("C".into()),
        ];
        let results: Vec<ConversionResult> = convert_stream(refs, &config)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| matches!(r.error(), Some(PageError::Fetch(_)))));
    }

    #[tokio::test]
    async fn stream_reports_missing_engine_up_front() {
        let config = ConversionConfig::builder()
            .pandoc_path("wiki2adoc-no-such-pandoc-binary")
            .build()
            .unwrap();
        let err = convert_stream(vec![PageReference::Title("A".into())], &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Wiki2AdocError::EngineUnavailable(_)));
    }
}
