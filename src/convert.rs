//! Eager conversion entry points.
//!
//! This module provides the simpler API: wait for every page, then return.
//! Results come back in input order inside a [`BatchOutput`]. Use
//! [`crate::stream::convert_stream`] instead to receive pages as they
//! complete.
//!
//! ## Failure Scopes
//!
//! A page that cannot be fetched, converted or written becomes a failed
//! [`ConversionResult`]; the rest of the batch is unaffected. An engine
//! that is not available is different: it is probed before the first
//! request, and if it disappears mid-run the remaining pages are cancelled
//! and the batch returns `Err`.

use crate::cancel::CancellationFlag;
use crate::config::{ConversionConfig, FileNaming};
use crate::engine::{resolve_engine, ConversionEngine};
use crate::error::{FetchError, PageError, Wiki2AdocError};
use crate::output::{
    BatchOutput, BatchStats, ConversionResult, FinalDocument, PageReference, RawDocument,
};
use crate::pipeline::fetch::{PageRequest, ResolvedPage, WikiClient};
use crate::pipeline::postprocess::{postprocess, PostprocessContext};
use crate::pipeline::write::PathRegistry;
use crate::pipeline::{adapter, normalize, write};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::{sleep, sleep_until, Duration};
use tracing::{debug, error, info, warn};

/// Convert markup already in hand; no network access.
///
/// The engine is probed first, so an unavailable engine is an `Err` rather
/// than a failed result.
pub async fn convert_text(
    title: &str,
    markup: &str,
    config: &ConversionConfig,
) -> Result<ConversionResult, Wiki2AdocError> {
    let start = Instant::now();
    let engine = resolve_engine(config);
    engine.probe().await?;

    let raw = RawDocument {
        title: crate::wikitext::canonical_title(title),
        source_url: String::new(),
        page_id: None,
        markup: markup.to_string(),
    };
    let normalized = normalize::normalize(&raw);
    let outcome = match adapter::convert_document(&engine, &normalized, config).await {
        Ok(converted) => {
            let pctx =
                PostprocessContext::from_config(&raw.title, config, &normalized.categories);
            Ok(postprocess(&converted, &pctx))
        }
        Err(PageError::EngineUnavailable(e)) => return Err(e.into()),
        Err(e) => Err(e),
    };

    Ok(ConversionResult {
        reference: PageReference::Title(title.to_string()),
        title: Some(raw.title),
        page_id: None,
        outcome,
        warnings: normalized.warnings,
        categories: normalized.categories,
        output_path: None,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Fetch and convert one page without writing it.
pub async fn convert_page(
    reference: PageReference,
    config: &ConversionConfig,
) -> Result<ConversionResult, Wiki2AdocError> {
    let mut batch = run_batch(vec![reference], None, config).await?;
    batch
        .results
        .pop()
        .ok_or_else(|| Wiki2AdocError::Internal("batch produced no result".into()))
}

/// Fetch and convert every page, keeping results in memory.
pub async fn convert_batch(
    references: Vec<PageReference>,
    config: &ConversionConfig,
) -> Result<BatchOutput, Wiki2AdocError> {
    run_batch(references, None, config).await
}

/// Fetch, convert and write every page under `output_dir`.
///
/// Each successful page lands at `<output_dir>/<title>.adoc`; subpages go
/// into a directory named after their parent.
pub async fn convert_to_dir(
    references: Vec<PageReference>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchOutput, Wiki2AdocError> {
    run_batch(references, Some(output_dir.as_ref().to_path_buf()), config).await
}

/// Synchronous wrapper around [`convert_to_dir`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_to_dir_sync(
    references: Vec<PageReference>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchOutput, Wiki2AdocError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Wiki2AdocError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_to_dir(references, output_dir, config))
}

async fn run_batch(
    references: Vec<PageReference>,
    output_dir: Option<PathBuf>,
    config: &ConversionConfig,
) -> Result<BatchOutput, Wiki2AdocError> {
    let total_start = Instant::now();
    let (ctx, pages) = prepare(references, output_dir, config).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(pages.len());
    }

    let mut indexed: Vec<(usize, ConversionResult)> =
        stream::iter(pages.into_iter().enumerate().map(|(idx, reference)| {
            let ctx = Arc::clone(&ctx);
            async move { (idx, convert_unit(ctx, reference).await) }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    indexed.sort_by_key(|(idx, _)| *idx);
    let results: Vec<ConversionResult> = indexed.into_iter().map(|(_, r)| r).collect();

    if let Some(e) = results.iter().find_map(|r| match r.error() {
        Some(PageError::EngineUnavailable(e)) => Some(e.clone()),
        _ => None,
    }) {
        warn!("Engine became unavailable mid-run: {}", e);
        return Err(e.into());
    }

    let stats = BatchStats::from_results(&results, total_start.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {}/{} pages, {} warnings, {}ms",
        stats.succeeded, stats.total, stats.warnings, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(stats.total, stats.succeeded);
    }

    Ok(BatchOutput { results, stats })
}

// ── Shared run state ─────────────────────────────────────────────────────

/// Per-host courtesy limits: in-flight cap plus spacing between starts.
struct HostLimiter {
    permits: Semaphore,
    interval: Duration,
    next_slot: tokio::sync::Mutex<tokio::time::Instant>,
}

impl HostLimiter {
    fn new(max_in_flight: usize, interval: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_in_flight.max(1)),
            interval,
            next_slot: tokio::sync::Mutex::new(tokio::time::Instant::now()),
        }
    }

    /// Wait for a request slot. The permit must be held for the request.
    async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        let permit = self.permits.acquire().await.ok();
        if !self.interval.is_zero() {
            let start = {
                let mut next = self.next_slot.lock().await;
                let start = (*next).max(tokio::time::Instant::now());
                *next = start + self.interval;
                start
            };
            sleep_until(start).await;
        }
        permit
    }
}

/// Everything page units share for one run.
pub(crate) struct PipelineContext {
    config: ConversionConfig,
    engine: Arc<dyn ConversionEngine>,
    client: WikiClient,
    engine_slots: Semaphore,
    hosts: Mutex<HashMap<String, Arc<HostLimiter>>>,
    output_dir: Option<PathBuf>,
    /// Output paths handed out so far; keeps colliding titles apart.
    paths: PathRegistry,
    /// Set when the engine disappears; stops units that have not started.
    abort: CancellationFlag,
}

impl PipelineContext {
    fn limiter(&self, host: &str) -> Arc<HostLimiter> {
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(hosts.entry(host.to_string()).or_insert_with(|| {
            Arc::new(HostLimiter::new(
                self.config.max_requests_per_host,
                Duration::from_millis(self.config.request_interval_ms),
            ))
        }))
    }

    fn cancelled(&self) -> bool {
        self.config.cancellation.is_cancelled() || self.abort.is_cancelled()
    }
}

/// Probe the engine, build the client and expand recursive references.
///
/// No request is made before the probe succeeds.
pub(crate) async fn prepare(
    references: Vec<PageReference>,
    output_dir: Option<PathBuf>,
    config: &ConversionConfig,
) -> Result<(Arc<PipelineContext>, Vec<PageReference>), Wiki2AdocError> {
    let engine = resolve_engine(config);
    info!("Probing conversion engine '{}'", engine.name());
    engine.probe().await?;

    let ctx = Arc::new(PipelineContext {
        config: config.clone(),
        client: WikiClient::new(config)?,
        engine,
        engine_slots: Semaphore::new(config.engine_slots()),
        hosts: Mutex::new(HashMap::new()),
        output_dir,
        paths: PathRegistry::default(),
        abort: CancellationFlag::new(),
    });

    let pages = expand_references(&ctx, references).await;
    if ctx.output_dir.is_some() && ctx.config.file_naming == FileNaming::Title {
        // Earlier references keep the plain name when titles collide.
        for page in pages.iter().filter_map(|r| ctx.client.resolve(r).ok()) {
            ctx.paths.reserve(&write::page_path(&page.title), &page.title);
        }
    }
    info!("Converting {} pages", pages.len());
    Ok((ctx, pages))
}

/// Deduplicate references and, in recursive mode, append each page's subpages.
async fn expand_references(
    ctx: &PipelineContext,
    references: Vec<PageReference>,
) -> Vec<PageReference> {
    let mut seen = HashSet::new();
    let mut pages = Vec::new();

    for reference in references {
        let resolved = ctx.client.resolve(&reference).ok();
        let key = dedup_key(&reference, resolved.as_ref());
        if !seen.insert(key) {
            debug!("Skipping duplicate reference {}", reference);
            continue;
        }
        pages.push(reference.clone());

        let Some(page) = resolved.filter(|_| ctx.config.recursive) else {
            continue;
        };
        let children = {
            let limiter = ctx.limiter(&page.host);
            let _permit = limiter.acquire().await;
            ctx.client.list_subpages(&page).await
        };
        match children {
            Ok(children) => {
                debug!("{}: {} subpages", page.title, children.len());
                for child in children {
                    let child_ref = child_reference(&reference, &page, &child);
                    let child_page = ctx.client.resolve(&child_ref).ok();
                    if seen.insert(dedup_key(&child_ref, child_page.as_ref())) {
                        pages.push(child_ref);
                    }
                }
            }
            Err(e) => warn!("{}: cannot list subpages: {}", page.title, e),
        }
    }
    pages
}

fn dedup_key(reference: &PageReference, page: Option<&ResolvedPage>) -> String {
    match page {
        Some(p) => format!("{:?}", p.request),
        None => reference.to_string(),
    }
}

/// A subpage reference on the same wiki as its parent.
fn child_reference(parent: &PageReference, page: &ResolvedPage, child: &str) -> PageReference {
    match (parent, &page.request) {
        (PageReference::Url(_), PageRequest::Wiki { base, .. }) => PageReference::Url(format!(
            "{base}/index.php?title={}",
            crate::wikitext::wire_title(child)
                .replace('%', "%25")
                .replace('&', "%26")
                .replace('+', "%2B")
                .replace('#', "%23")
        )),
        _ => PageReference::Title(child.to_string()),
    }
}

// ── Page unit ────────────────────────────────────────────────────────────

/// Run one page through the whole pipeline. Never fails; errors land in
/// the returned result.
pub(crate) async fn convert_unit(
    ctx: Arc<PipelineContext>,
    reference: PageReference,
) -> ConversionResult {
    let start = Instant::now();
    let cb = ctx.config.progress_callback.as_ref();

    if ctx.cancelled() {
        debug!("{}: cancelled before start", reference);
        if let Some(cb) = cb {
            cb.on_page_error(reference.as_str(), &PageError::Cancelled.to_string());
        }
        return ConversionResult::failed(reference, PageError::Cancelled);
    }

    if let Some(cb) = cb {
        cb.on_page_start(reference.as_str());
    }

    let mut result = ConversionResult::failed(reference.clone(), PageError::Cancelled);
    let outcome = run_unit(&ctx, &mut result).await;
    result.outcome = outcome;
    result.duration_ms = start.elapsed().as_millis() as u64;

    match &result.outcome {
        Ok(doc) => {
            info!(
                "{}: converted ({} bytes, {} warnings, {}ms)",
                doc.title,
                doc.asciidoc.len(),
                result.warnings.len(),
                result.duration_ms
            );
            if let Some(cb) = cb {
                cb.on_page_complete(&doc.title, &result.warnings, doc.asciidoc.len());
            }
        }
        Err(e) => {
            if matches!(e, PageError::EngineUnavailable(_)) {
                ctx.abort.cancel();
            }
            if matches!(e, PageError::Cancelled) {
                warn!("{}: {}", reference, e);
            } else {
                error!("{}: {}", reference, e);
            }
            if let Some(cb) = cb {
                cb.on_page_error(reference.as_str(), &e.to_string());
            }
        }
    }
    result
}

async fn run_unit(
    ctx: &PipelineContext,
    result: &mut ConversionResult,
) -> Result<FinalDocument, PageError> {
    let page = ctx.client.resolve(&result.reference)?;
    result.title = Some(page.title.clone());

    let raw = fetch_with_retry(ctx, &page).await?;
    result.title = Some(raw.title.clone());
    result.page_id = raw.page_id;

    let normalized = normalize::normalize(&raw);
    for w in &normalized.warnings {
        debug!("{}: {}", raw.title, w);
    }
    result.warnings = normalized.warnings.clone();
    result.categories = normalized.categories.clone();

    let converted = {
        let _slot = ctx.engine_slots.acquire().await.ok();
        adapter::convert_document(&ctx.engine, &normalized, &ctx.config).await?
    };

    let pctx = PostprocessContext::from_config(&raw.title, &ctx.config, &normalized.categories);
    let doc = postprocess(&converted, &pctx);

    if let Some(ref dir) = ctx.output_dir {
        let wanted = write::document_path(ctx.config.file_naming, &doc.title, raw.page_id);
        let path = ctx.paths.claim(&wanted, &doc.title);
        if path != wanted {
            warn!(
                "{}: {} belongs to another page, writing {} instead",
                doc.title,
                wanted.display(),
                path.display()
            );
        }
        result.output_path = Some(write::write_document(dir, &path, &doc).await?);
    }
    Ok(doc)
}

/// Fetch under the host limiter, retrying transient failures.
async fn fetch_with_retry(
    ctx: &PipelineContext,
    page: &ResolvedPage,
) -> Result<RawDocument, FetchError> {
    let limiter = ctx.limiter(&page.host);
    let mut attempt = 0u32;
    loop {
        let outcome = {
            let _permit = limiter.acquire().await;
            ctx.client.fetch_resolved(page).await
        };
        match outcome {
            Err(e) if e.is_transient() && attempt < ctx.config.fetch_retries => {
                attempt += 1;
                let backoff = adapter::backoff_delay(ctx.config.retry_backoff_ms, attempt);
                warn!(
                    "{}: fetch retry {}/{} after {}ms: {}",
                    page.title,
                    attempt,
                    ctx.config.fetch_retries,
                    backoff.as_millis(),
                    e
                );
                sleep(backoff).await;
            }
            other => return other,
        }
    }
}
