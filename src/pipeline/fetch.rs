//! Content fetcher: resolve a page reference and retrieve its raw markup.
//!
//! ## Reference Resolution
//!
//! A bare title is resolved against the configured wiki. A URL is inspected:
//! `/wiki/<Title>` article paths and `index.php?title=<Title>` links are
//! mapped back to a title on that host, so they go through the same
//! endpoint as bare titles. Any other URL is fetched verbatim and treated
//! as raw wikitext.
//!
//! ## Endpoints
//!
//! * [`FetchMode::Raw`]: `index.php?action=raw`: plain text, one request,
//!   no JSON. Redirect pages come back as `#REDIRECT [[…]]` markup.
//! * [`FetchMode::Api`]: `api.php?action=query&prop=revisions`: follows
//!   redirects server-side and reports the canonical title.
//!
//! This layer never retries. [`FetchError::is_transient`] tells the caller
//! whether a retry is worthwhile.

use crate::config::{ConversionConfig, FetchMode};
use crate::error::{FetchError, Wiki2AdocError};
use crate::output::{PageReference, RawDocument};
use crate::wikitext::{canonical_title, split_namespace, wire_title};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// File extensions stripped from the last segment of a raw-content URL.
const RAW_EXTENSIONS: &[&str] = &[".wiki", ".mediawiki", ".wikitext", ".txt"];

/// Canonical MediaWiki namespace ids, used for subpage listing.
const NAMESPACES: &[(&str, u32)] = &[
    ("talk", 1),
    ("user", 2),
    ("user talk", 3),
    ("project", 4),
    ("project talk", 5),
    ("file", 6),
    ("mediawiki", 8),
    ("template", 10),
    ("help", 12),
    ("category", 14),
];

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// How a resolved page is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// A title on a MediaWiki install; `base` is origin plus script path.
    Wiki { base: String, title: String },
    /// A URL returning raw wikitext as-is.
    Raw { url: String },
}

/// A page reference after resolution, before any request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPage {
    /// Display title.
    pub title: String,
    pub request: PageRequest,
    /// `host:port` of the server the request goes to.
    pub host: String,
}

/// Resolve `reference` into a request, without touching the network.
pub fn resolve_reference(
    reference: &PageReference,
    wiki_root: Option<&str>,
    script_path: &str,
) -> Result<ResolvedPage, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    };

    match reference {
        PageReference::Title(raw) => {
            let title = canonical_title(raw);
            if title.is_empty() {
                return Err(invalid("empty title"));
            }
            let root = wiki_root.ok_or_else(|| invalid("no wiki URL configured"))?;
            let url = Url::parse(root).map_err(|e| invalid(&e.to_string()))?;
            Ok(ResolvedPage {
                title: title.clone(),
                request: PageRequest::Wiki {
                    base: format!("{root}{script_path}"),
                    title,
                },
                host: host_key(&url),
            })
        }
        PageReference::Url(raw) => {
            let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
            if url.host_str().is_none() {
                return Err(invalid("URL has no host"));
            }
            let host = host_key(&url);
            let origin = origin(&url);

            if let Some(rest) = url.path().strip_prefix("/wiki/") {
                let title = canonical_title(&percent_decode(rest));
                if !title.is_empty() {
                    return Ok(ResolvedPage {
                        title: title.clone(),
                        request: PageRequest::Wiki {
                            base: format!("{origin}{script_path}"),
                            title,
                        },
                        host,
                    });
                }
            }

            let query_title = url
                .query_pairs()
                .find(|(k, _)| k == "title")
                .map(|(_, v)| canonical_title(&v));
            if let Some(title) = query_title.filter(|t| !t.is_empty()) {
                let path = url.path();
                let base = match path.strip_suffix("/index.php") {
                    Some(prefix) => format!("{origin}{prefix}"),
                    None => format!("{origin}{script_path}"),
                };
                return Ok(ResolvedPage {
                    title: title.clone(),
                    request: PageRequest::Wiki { base, title },
                    host,
                });
            }

            let title = url
                .path_segments()
                .and_then(|mut s| s.next_back())
                .map(|last| strip_raw_extension(&percent_decode(last)))
                .map(|t| canonical_title(&t))
                .filter(|t| !t.is_empty())
                .ok_or_else(|| invalid("cannot derive a page title from the URL"))?;
            Ok(ResolvedPage {
                title,
                request: PageRequest::Raw {
                    url: url.to_string(),
                },
                host,
            })
        }
    }
}

fn host_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or(0)
    )
}

fn origin(url: &Url) -> String {
    match url.port() {
        Some(port) => format!(
            "{}://{}:{port}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        ),
        None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    }
}

fn strip_raw_extension(segment: &str) -> String {
    let lower = segment.to_ascii_lowercase();
    RAW_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| segment[..segment.len() - ext.len()].to_string())
        .unwrap_or_else(|| segment.to_string())
}

/// Decode `%XX` escapes; malformed escapes are kept, invalid UTF-8 returns the input.
pub fn percent_decode(input: &str) -> String {
    percent_encoding::percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| input.to_string())
}

// ── API response shapes (formatversion=2) ───────────────────────────────────

#[derive(Debug, Deserialize)]
struct RevisionsResponse {
    query: Option<RevisionsQuery>,
}

#[derive(Debug, Deserialize)]
struct RevisionsQuery {
    #[serde(default)]
    pages: Vec<ApiPage>,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    title: String,
    #[serde(default)]
    pageid: Option<u64>,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    revisions: Vec<ApiRevision>,
}

#[derive(Debug, Deserialize)]
struct ApiRevision {
    slots: ApiSlots,
}

#[derive(Debug, Deserialize)]
struct ApiSlots {
    main: ApiSlot,
}

#[derive(Debug, Deserialize)]
struct ApiSlot {
    content: String,
}

#[derive(Debug, Deserialize)]
struct AllPagesResponse {
    #[serde(rename = "continue")]
    next: Option<AllPagesContinue>,
    query: Option<AllPagesQuery>,
}

#[derive(Debug, Deserialize)]
struct AllPagesContinue {
    apcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllPagesQuery {
    #[serde(default)]
    allpages: Vec<ListedPage>,
}

#[derive(Debug, Deserialize)]
struct ListedPage {
    title: String,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// HTTP client for one conversion run; cheap to share behind an `Arc`.
pub struct WikiClient {
    http: Client,
    wiki_root: Option<String>,
    script_path: String,
    mode: FetchMode,
    credentials: Option<(String, String)>,
    timeout_secs: u64,
}

impl WikiClient {
    pub fn new(config: &ConversionConfig) -> Result<Self, Wiki2AdocError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Wiki2AdocError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            wiki_root: config.wiki_root().map(str::to_string),
            script_path: config.script_path.clone(),
            mode: config.fetch_mode,
            credentials: config.username.clone().zip(config.password.clone()),
            timeout_secs: config.fetch_timeout_secs,
        })
    }

    pub fn resolve(&self, reference: &PageReference) -> Result<ResolvedPage, FetchError> {
        resolve_reference(reference, self.wiki_root.as_deref(), &self.script_path)
    }

    /// Resolve and fetch in one step.
    pub async fn fetch(&self, reference: &PageReference) -> Result<RawDocument, FetchError> {
        let page = self.resolve(reference)?;
        self.fetch_resolved(&page).await
    }

    /// Fetch an already-resolved page with exactly one request.
    pub async fn fetch_resolved(&self, page: &ResolvedPage) -> Result<RawDocument, FetchError> {
        match &page.request {
            PageRequest::Raw { url } => {
                let url = parse_url(url)?;
                let markup = self.get_text(url.clone(), &page.title).await?;
                Ok(RawDocument {
                    title: page.title.clone(),
                    source_url: url.to_string(),
                    page_id: None,
                    markup,
                })
            }
            PageRequest::Wiki { base, title } => match self.mode {
                FetchMode::Raw => {
                    let url = raw_url(base, title)?;
                    let markup = self.get_text(url.clone(), title).await?;
                    Ok(RawDocument {
                        title: title.clone(),
                        source_url: url.to_string(),
                        page_id: None,
                        markup,
                    })
                }
                FetchMode::Api => self.fetch_api(base, title).await,
            },
        }
    }

    /// Titles of every subpage of `page`, in the order the wiki lists them.
    ///
    /// Raw-content URLs have no subpages.
    pub async fn list_subpages(&self, page: &ResolvedPage) -> Result<Vec<String>, FetchError> {
        let PageRequest::Wiki { base, title } = &page.request else {
            return Ok(Vec::new());
        };

        let (namespace, prefix) = match split_namespace(title) {
            Some((ns, rest)) => match NAMESPACES.iter().find(|(name, _)| *name == ns) {
                Some((_, id)) => (*id, rest.to_string()),
                None => (0, title.clone()),
            },
            None => (0, title.clone()),
        };
        let prefix = format!("{}/", canonical_title(&prefix));

        let mut titles = Vec::new();
        let mut cont: Option<String> = None;
        loop {
            let mut url = parse_url(&format!("{base}/api.php"))?;
            {
                let mut q = url.query_pairs_mut();
                q.append_pair("action", "query")
                    .append_pair("list", "allpages")
                    .append_pair("apprefix", &prefix)
                    .append_pair("apnamespace", &namespace.to_string())
                    .append_pair("aplimit", "max")
                    .append_pair("format", "json")
                    .append_pair("formatversion", "2");
                if let Some(c) = &cont {
                    q.append_pair("apcontinue", c);
                }
            }
            let response = self.send(url.clone(), title).await?;
            let body: AllPagesResponse = response.json().await.map_err(|e| {
                FetchError::MalformedResponse {
                    url: url.to_string(),
                    detail: e.to_string(),
                }
            })?;

            if let Some(query) = body.query {
                titles.extend(query.allpages.into_iter().map(|p| p.title));
            }
            match body.next.and_then(|n| n.apcontinue) {
                Some(next) if cont.as_ref() != Some(&next) => cont = Some(next),
                _ => break,
            }
        }

        debug!(title = %title, count = titles.len(), "subpages listed");
        Ok(titles)
    }

    async fn fetch_api(&self, base: &str, title: &str) -> Result<RawDocument, FetchError> {
        let mut url = parse_url(&format!("{base}/api.php"))?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("prop", "revisions")
            .append_pair("rvprop", "content")
            .append_pair("rvslots", "main")
            .append_pair("format", "json")
            .append_pair("formatversion", "2")
            .append_pair("redirects", "1")
            .append_pair("titles", &wire_title(title));

        let response = self.send(url.clone(), title).await?;
        let malformed = |detail: String| FetchError::MalformedResponse {
            url: url.to_string(),
            detail,
        };
        let body: RevisionsResponse = response.json().await.map_err(|e| malformed(e.to_string()))?;

        let page = body
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| malformed("no page in response".into()))?;
        if page.missing || page.invalid {
            return Err(FetchError::NotFound {
                title: title.to_string(),
            });
        }
        let markup = page
            .revisions
            .into_iter()
            .next()
            .map(|r| r.slots.main.content)
            .ok_or_else(|| malformed(format!("no revision content for '{}'", page.title)))?;

        if page.title != title {
            debug!(requested = %title, canonical = %page.title, "title resolved by wiki");
        }
        Ok(RawDocument {
            title: page.title,
            source_url: url.to_string(),
            page_id: page.pageid,
            markup,
        })
    }

    async fn get_text(&self, url: Url, title: &str) -> Result<String, FetchError> {
        let response = self.send(url.clone(), title).await?;
        response.text().await.map_err(|e| self.transport_error(&url, e))
    }

    /// One GET; maps 404 to `NotFound` and other failures to their variants.
    async fn send(&self, url: Url, title: &str) -> Result<reqwest::Response, FetchError> {
        debug!(url = %url, "GET");
        let response = self
            .authorize(self.http.get(url.clone()))
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                title: title.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    fn transport_error(&self, url: &Url, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::InvalidReference {
        reference: raw.to_string(),
        reason: e.to_string(),
    })
}

fn raw_url(base: &str, title: &str) -> Result<Url, FetchError> {
    let mut url = parse_url(&format!("{base}/index.php"))?;
    url.query_pairs_mut()
        .append_pair("title", &wire_title(title))
        .append_pair("action", "raw");
    Ok(url)
}
