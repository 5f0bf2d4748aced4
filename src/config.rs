//! Configuration types for wiki-to-AsciiDoc conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! batch can share it across concurrent page units with a cheap clone.

use crate::cancel::CancellationFlag;
use crate::engine::ConversionEngine;
use crate::error::Wiki2AdocError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use wiki2adoc::{ConversionConfig, EngineKind};
///
/// let config = ConversionConfig::builder()
///     .wiki_url("https://wiki.example.org")
///     .engine_kind(EngineKind::Native)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Wiki site root, e.g. `https://en.wikipedia.org`. Required for bare titles.
    pub wiki_url: Option<String>,

    /// Path of the MediaWiki script directory under `wiki_url`. Default: `/w`.
    ///
    /// `index.php` and `api.php` live here. Wikipedia uses `/w`; many
    /// self-hosted wikis install at the root, which is `""`.
    pub script_path: String,

    /// Which endpoint retrieves page markup. Default: [`FetchMode::Raw`].
    pub fetch_mode: FetchMode,

    /// HTTP basic-auth user name.
    pub username: Option<String>,

    /// HTTP basic-auth password.
    pub password: Option<String>,

    /// `User-Agent` header sent with every request.
    ///
    /// Wikimedia sites reject requests without a descriptive agent.
    pub user_agent: String,

    /// Named engine to use when `engine` is not set. Default: [`EngineKind::Pandoc`].
    pub engine_kind: EngineKind,

    /// Pre-constructed engine. Takes precedence over `engine_kind`.
    pub engine: Option<Arc<dyn ConversionEngine>>,

    /// Path or name of the pandoc binary. Default: `pandoc`.
    pub pandoc_path: String,

    /// Pandoc output format name. Default: `asciidoc`.
    ///
    /// Pandoc 3 renamed the old writer to `asciidoc_legacy`; older releases
    /// only know `asciidoctor` for the modern dialect.
    pub pandoc_format: String,

    /// Number of pages converted at once. Default: 4.
    pub concurrency: usize,

    /// In-flight requests allowed per wiki host. Default: 2.
    pub max_requests_per_host: usize,

    /// Minimum gap between request starts to the same host, in ms. Default: 0.
    pub request_interval_ms: u64,

    /// Concurrent engine invocations. Default: `None` (same as `concurrency`).
    ///
    /// Each pandoc run is a separate process with its own memory footprint,
    /// so large batches on small machines may want this lower than the
    /// fetch concurrency.
    pub engine_concurrency: Option<usize>,

    /// HTTP request timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Per-page engine timeout in seconds. Default: 60.
    pub engine_timeout_secs: u64,

    /// Retries for transient fetch failures (network, timeout, 429, 5xx). Default: 0.
    pub fetch_retries: u32,

    /// Retries for engine failures. Default: 0.
    ///
    /// The input is deterministic, so retrying only helps a flaky engine.
    pub engine_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// How internal links and images resolve. Default: [`LinkStyle::Relative`].
    pub link_style: LinkStyle,

    /// Directory image paths are prefixed with in relative mode. Default: `images`.
    pub image_dir: String,

    /// How output files are named. Default: [`FileNaming::Title`].
    ///
    /// [`FileNaming::PageId`] needs the API endpoint, which reports ids,
    /// and wiki-style links, since `xref:` targets are title paths.
    pub file_naming: FileNaming,

    /// Extra `:key: value` lines placed in every document header.
    pub header_attributes: Vec<(String, String)>,

    /// Emit recorded categories as a `:page-categories:` header attribute. Default: false.
    pub categories_attribute: bool,

    /// Also convert every subpage of each title reference. Default: false.
    pub recursive: bool,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked before each page starts; set it to stop a running batch.
    pub cancellation: CancellationFlag,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            wiki_url: None,
            script_path: "/w".to_string(),
            fetch_mode: FetchMode::default(),
            username: None,
            password: None,
            user_agent: concat!("wiki2adoc/", env!("CARGO_PKG_VERSION")).to_string(),
            engine_kind: EngineKind::default(),
            engine: None,
            pandoc_path: "pandoc".to_string(),
            pandoc_format: "asciidoc".to_string(),
            concurrency: 4,
            max_requests_per_host: 2,
            request_interval_ms: 0,
            engine_concurrency: None,
            fetch_timeout_secs: 30,
            engine_timeout_secs: 60,
            fetch_retries: 0,
            engine_retries: 0,
            retry_backoff_ms: 500,
            link_style: LinkStyle::default(),
            image_dir: "images".to_string(),
            file_naming: FileNaming::default(),
            header_attributes: Vec::new(),
            categories_attribute: false,
            recursive: false,
            progress_callback: None,
            cancellation: CancellationFlag::new(),
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("wiki_url", &self.wiki_url)
            .field("script_path", &self.script_path)
            .field("fetch_mode", &self.fetch_mode)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("engine_kind", &self.engine_kind)
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .field("concurrency", &self.concurrency)
            .field("max_requests_per_host", &self.max_requests_per_host)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("engine_timeout_secs", &self.engine_timeout_secs)
            .field("link_style", &self.link_style)
            .field("image_dir", &self.image_dir)
            .field("file_naming", &self.file_naming)
            .field("recursive", &self.recursive)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective engine concurrency.
    pub fn engine_slots(&self) -> usize {
        self.engine_concurrency.unwrap_or(self.concurrency).max(1)
    }

    /// Wiki root with any trailing slash removed.
    pub fn wiki_root(&self) -> Option<&str> {
        self.wiki_url.as_deref().map(|u| u.trim_end_matches('/'))
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn wiki_url(mut self, url: impl Into<String>) -> Self {
        self.config.wiki_url = Some(url.into());
        self
    }

    pub fn script_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim().trim_end_matches('/');
        self.config.script_path = if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.config.fetch_mode = mode;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn engine_kind(mut self, kind: EngineKind) -> Self {
        self.config.engine_kind = kind;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ConversionEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<String>) -> Self {
        self.config.pandoc_path = path.into();
        self
    }

    pub fn pandoc_format(mut self, format: impl Into<String>) -> Self {
        self.config.pandoc_format = format.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_requests_per_host(mut self, n: usize) -> Self {
        self.config.max_requests_per_host = n.max(1);
        self
    }

    pub fn request_interval_ms(mut self, ms: u64) -> Self {
        self.config.request_interval_ms = ms;
        self
    }

    pub fn engine_concurrency(mut self, n: usize) -> Self {
        self.config.engine_concurrency = Some(n.max(1));
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn fetch_retries(mut self, n: u32) -> Self {
        self.config.fetch_retries = n;
        self
    }

    pub fn engine_retries(mut self, n: u32) -> Self {
        self.config.engine_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn link_style(mut self, style: LinkStyle) -> Self {
        self.config.link_style = style;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.image_dir = dir.into().trim_end_matches('/').to_string();
        self
    }

    pub fn file_naming(mut self, naming: FileNaming) -> Self {
        self.config.file_naming = naming;
        self
    }

    pub fn header_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .header_attributes
            .push((key.into(), value.into()));
        self
    }

    pub fn categories_attribute(mut self, v: bool) -> Self {
        self.config.categories_attribute = v;
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.config.cancellation = flag;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Wiki2AdocError> {
        let c = &self.config;
        if let Some(ref url) = c.wiki_url {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                Wiki2AdocError::InvalidConfig(format!("wiki URL '{url}' is not a valid URL: {e}"))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Wiki2AdocError::InvalidConfig(format!(
                    "wiki URL '{url}' must use http or https"
                )));
            }
        }
        if c.concurrency == 0 {
            return Err(Wiki2AdocError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.fetch_timeout_secs == 0 || c.engine_timeout_secs == 0 {
            return Err(Wiki2AdocError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.username.is_some() != c.password.is_some() {
            return Err(Wiki2AdocError::InvalidConfig(
                "Username and password must be given together".into(),
            ));
        }
        if c.file_naming == FileNaming::PageId {
            if c.fetch_mode != FetchMode::Api {
                return Err(Wiki2AdocError::InvalidConfig(
                    "Page-id file names need the API fetch mode".into(),
                ));
            }
            if c.link_style != LinkStyle::Wiki {
                return Err(Wiki2AdocError::InvalidConfig(
                    "Page-id file names need wiki-style links; xrefs point at title paths".into(),
                ));
            }
        }
        for (key, _) in &c.header_attributes {
            if !is_attribute_name(key) {
                return Err(Wiki2AdocError::InvalidConfig(format!(
                    "'{key}' is not a valid AsciiDoc attribute name"
                )));
            }
        }
        Ok(self.config)
    }
}

/// AsciiDoc attribute names: word characters and hyphens, not starting with a hyphen.
fn is_attribute_name(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('-')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Endpoint used to retrieve page markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchMode {
    /// `index.php?action=raw`: plain wikitext, no JSON. (default)
    #[default]
    Raw,
    /// `api.php?action=query&prop=revisions`: follows redirects, reports
    /// the canonical title.
    Api,
}

/// Which conversion engine performs the structural conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineKind {
    /// External `pandoc` process. (default)
    #[default]
    Pandoc,
    /// Built-in converter for MediaWiki core syntax; no external process.
    Native,
}

/// How internal links and image references resolve in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkStyle {
    /// `xref:` to sibling `.adoc` files; images under `image_dir`. (default)
    #[default]
    Relative,
    /// Absolute URLs back into the wiki.
    Wiki,
}

/// How each page's output file is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileNaming {
    /// Sanitised title; subpages become directories. (default)
    #[default]
    Title,
    /// `<pageid>.adoc`, flat. Pages without a reported id fall back to the title.
    PageId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.script_path, "/w");
        assert_eq!(c.fetch_mode, FetchMode::Raw);
        assert_eq!(c.engine_kind, EngineKind::Pandoc);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.engine_slots(), 4);
        assert_eq!(c.image_dir, "images");
        assert!(c.user_agent.starts_with("wiki2adoc/"));
    }

    #[test]
    fn script_path_is_normalised() {
        let c = ConversionConfig::builder().script_path("w/").build().unwrap();
        assert_eq!(c.script_path, "/w");
        let c = ConversionConfig::builder().script_path("/").build().unwrap();
        assert_eq!(c.script_path, "");
    }

    #[test]
    fn rejects_non_http_wiki_url() {
        let err = ConversionConfig::builder()
            .wiki_url("ftp://wiki.example.org")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn rejects_bad_attribute_name() {
        assert!(ConversionConfig::builder()
            .header_attribute("toc", "left")
            .build()
            .is_ok());
        assert!(ConversionConfig::builder()
            .header_attribute("bad key", "x")
            .build()
            .is_err());
    }

    #[test]
    fn credentials_must_pair() {
        let mut c = ConversionConfig::builder();
        c.config.username = Some("bot".into());
        assert!(c.build().is_err());
    }

    #[test]
    fn page_id_naming_needs_api_and_wiki_links() {
        let err = ConversionConfig::builder()
            .file_naming(FileNaming::PageId)
            .link_style(LinkStyle::Wiki)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("API"), "{err}");

        let err = ConversionConfig::builder()
            .file_naming(FileNaming::PageId)
            .fetch_mode(FetchMode::Api)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("wiki-style"), "{err}");

        let c = ConversionConfig::builder()
            .file_naming(FileNaming::PageId)
            .fetch_mode(FetchMode::Api)
            .link_style(LinkStyle::Wiki)
            .build()
            .unwrap();
        assert_eq!(c.file_naming, FileNaming::PageId);
        assert_eq!(ConversionConfig::default().file_naming, FileNaming::Title);
    }

    #[test]
    fn wiki_root_trims_slash() {
        let c = ConversionConfig::builder()
            .wiki_url("https://wiki.example.org/")
            .build()
            .unwrap();
        assert_eq!(c.wiki_root(), Some("https://wiki.example.org"));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let c = ConversionConfig::builder()
            .concurrency(0)
            .engine_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.engine_slots(), 1);
    }
}
