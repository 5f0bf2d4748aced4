//! CLI binary for wiki2adoc.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use wiki2adoc::{
    convert_to_dir, BatchOutput, CancellationFlag, ConversionConfig, ConversionProgressCallback,
    EngineKind, FetchMode, FileNaming, LinkStyle, NormalizationWarning, PageReference,
    ProgressCallback,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one status line per page on stderr, plus a
/// live bar when enabled. Pages complete out of order, so start times are
/// keyed by reference.
struct CliProgressCallback {
    bar: ProgressBar,
    show_bar: bool,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new(show_bar: bool) -> Arc<Self> {
        let bar = if show_bar {
            let bar = ProgressBar::new(0);
            let spinner_style =
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(spinner_style);
            bar.set_prefix("Preparing");
            bar.set_message("Checking conversion engine…");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };

        Arc::new(Self {
            bar,
            show_bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn line(&self, text: String) {
        if self.show_bar {
            self.bar.println(text);
        } else {
            eprintln!("{text}");
        }
    }

    fn elapsed_secs(&self, reference: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(reference))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_pages: usize) {
        if self.show_bar {
            let progress_style = ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            self.bar.set_length(total_pages as u64);
            self.bar.set_style(progress_style);
            self.bar.set_prefix("Converting");
            self.bar.reset_eta();
        }
        self.line(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, reference: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(reference.to_string(), Instant::now());
        }
        self.bar.set_message(reference.to_string());
    }

    fn on_page_complete(&self, title: &str, warnings: &[NormalizationWarning], asciidoc_len: usize) {
        // Keyed by reference, which is usually the title; fall back to 0s.
        let secs = self.elapsed_secs(title);
        let warn_note = if warnings.is_empty() {
            String::new()
        } else {
            format!("  {}", cyan(&format!("{} warnings", warnings.len())))
        };
        self.line(format!(
            "  {} {:<40}  {}  {}{}",
            green("✓"),
            title,
            dim(&format!("{asciidoc_len:>6} bytes")),
            dim(&format!("{secs:.1}s")),
            warn_note,
        ));
        for line in warning_lines(warnings) {
            self.line(dim(&line));
        }
        self.bar.inc(1);
    }

    fn on_page_error(&self, reference: &str, error: &str) {
        let secs = self.elapsed_secs(reference);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };

        self.line(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            reference,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one page from a wiki
  wiki2adoc --wiki-url https://wiki.example.org -o docs "Main Page"

  # Convert a page by URL (the wiki is taken from the URL)
  wiki2adoc -o docs https://wiki.example.org/wiki/Installation

  # A page and all of its subpages, via the API endpoint
  wiki2adoc --wiki-url https://wiki.example.org --fetch-mode api --recursive -o docs Guide

  # Built-in engine, no pandoc needed
  wiki2adoc --engine native -o docs https://wiki.example.org/wiki/FAQ

  # Extra header attributes and categories
  wiki2adoc -a toc -a icons=font --categories-attribute -o docs Setup

  # JSON report on stdout
  wiki2adoc --json -o docs Setup > report.json

  # Files named by page id, links back into the wiki
  wiki2adoc -w https://wiki.example.org --fetch-mode api --link-style wiki \
    --file-names page-id -o docs Setup

ENVIRONMENT VARIABLES:
  WIKI2ADOC_WIKI_URL      Default wiki for bare titles
  WIKI2ADOC_USERNAME      HTTP basic-auth user
  WIKI2ADOC_PASSWORD      HTTP basic-auth password
  WIKI2ADOC_PANDOC        Path to the pandoc binary
  RUST_LOG                Overrides the log filter (e.g. wiki2adoc=debug)

EXIT STATUS:
  0  every page converted
  1  at least one page failed, or the run could not start
"#;

/// Convert wiki pages to AsciiDoc.
#[derive(Parser, Debug)]
#[command(
    name = "wiki2adoc",
    version,
    about = "Convert wiki pages to AsciiDoc documents",
    long_about = "Fetch MediaWiki pages by title or URL, rewrite wiki-specific markup (links, \
images, templates, categories, table attributes), convert with pandoc or the built-in engine, \
and write one .adoc file per page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page titles or HTTP/HTTPS URLs.
    #[arg(required = true)]
    pages: Vec<String>,

    /// Directory the .adoc files are written to.
    #[arg(short, long, env = "WIKI2ADOC_OUTPUT")]
    output: PathBuf,

    /// Wiki root URL used for bare titles.
    #[arg(short, long, env = "WIKI2ADOC_WIKI_URL")]
    wiki_url: Option<String>,

    /// Script path of the wiki (where index.php and api.php live).
    #[arg(long, env = "WIKI2ADOC_SCRIPT_PATH", default_value = "/w")]
    script_path: String,

    /// Endpoint used to fetch markup.
    #[arg(long, env = "WIKI2ADOC_FETCH_MODE", value_enum, default_value = "raw")]
    fetch_mode: FetchModeArg,

    /// HTTP basic-auth user name.
    #[arg(long, env = "WIKI2ADOC_USERNAME", requires = "password")]
    username: Option<String>,

    /// HTTP basic-auth password.
    #[arg(long, env = "WIKI2ADOC_PASSWORD", hide_env_values = true, requires = "username")]
    password: Option<String>,

    /// User-Agent header for wiki requests.
    #[arg(long, env = "WIKI2ADOC_USER_AGENT")]
    user_agent: Option<String>,

    /// Conversion engine.
    #[arg(long, env = "WIKI2ADOC_ENGINE", value_enum, default_value = "pandoc")]
    engine: EngineArg,

    /// Path to the pandoc binary.
    #[arg(long, env = "WIKI2ADOC_PANDOC", default_value = "pandoc")]
    pandoc: String,

    /// Pandoc output format (asciidoc, asciidoctor, asciidoc_legacy).
    #[arg(long, env = "WIKI2ADOC_PANDOC_FORMAT", default_value = "asciidoc")]
    pandoc_format: String,

    /// Pages converted at once.
    #[arg(short, long, env = "WIKI2ADOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// In-flight requests per wiki host.
    #[arg(long, env = "WIKI2ADOC_PER_HOST", default_value_t = 2)]
    per_host: usize,

    /// Minimum milliseconds between request starts to one host.
    #[arg(long, env = "WIKI2ADOC_REQUEST_INTERVAL_MS", default_value_t = 0)]
    request_interval_ms: u64,

    /// Concurrent engine runs (defaults to --concurrency).
    #[arg(long, env = "WIKI2ADOC_ENGINE_CONCURRENCY")]
    engine_concurrency: Option<usize>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "WIKI2ADOC_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Per-page engine timeout in seconds.
    #[arg(long, env = "WIKI2ADOC_ENGINE_TIMEOUT", default_value_t = 60)]
    engine_timeout: u64,

    /// Retries for transient fetch failures.
    #[arg(long, env = "WIKI2ADOC_FETCH_RETRIES", default_value_t = 0)]
    fetch_retries: u32,

    /// Retries for engine failures.
    #[arg(long, env = "WIKI2ADOC_ENGINE_RETRIES", default_value_t = 0)]
    engine_retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt.
    #[arg(long, env = "WIKI2ADOC_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// How internal links and images resolve.
    #[arg(long, env = "WIKI2ADOC_LINK_STYLE", value_enum, default_value = "relative")]
    link_style: LinkStyleArg,

    /// Directory prefix for image paths in relative mode.
    #[arg(long, env = "WIKI2ADOC_IMAGE_DIR", default_value = "images")]
    image_dir: String,

    /// Name output files by title or by page id (page-id needs --fetch-mode api
    /// and --link-style wiki).
    #[arg(long, env = "WIKI2ADOC_FILE_NAMES", value_enum, default_value = "title")]
    file_names: FileNamesArg,

    /// Header attribute, `name` or `name=value`. Repeatable.
    #[arg(short = 'a', long = "attribute", value_name = "NAME[=VALUE]")]
    attributes: Vec<String>,

    /// Emit page categories as a `:page-categories:` attribute.
    #[arg(long, env = "WIKI2ADOC_CATEGORIES_ATTRIBUTE")]
    categories_attribute: bool,

    /// Also convert every subpage of each title.
    #[arg(short, long, env = "WIKI2ADOC_RECURSIVE")]
    recursive: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "WIKI2ADOC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "WIKI2ADOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "WIKI2ADOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "WIKI2ADOC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FetchModeArg {
    Raw,
    Api,
}

impl From<FetchModeArg> for FetchMode {
    fn from(v: FetchModeArg) -> Self {
        match v {
            FetchModeArg::Raw => FetchMode::Raw,
            FetchModeArg::Api => FetchMode::Api,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum EngineArg {
    Pandoc,
    Native,
}

impl From<EngineArg> for EngineKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Pandoc => EngineKind::Pandoc,
            EngineArg::Native => EngineKind::Native,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LinkStyleArg {
    Relative,
    Wiki,
}

impl From<LinkStyleArg> for LinkStyle {
    fn from(v: LinkStyleArg) -> Self {
        match v {
            LinkStyleArg::Relative => LinkStyle::Relative,
            LinkStyleArg::Wiki => LinkStyle::Wiki,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FileNamesArg {
    Title,
    PageId,
}

impl From<FileNamesArg> for FileNaming {
    fn from(v: FileNamesArg) -> Self {
        match v {
            FileNamesArg::Title => FileNaming::Title,
            FileNamesArg::PageId => FileNaming::PageId,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Silence library logs when the progress bar is active or in quiet mode;
    // the per-page lines and the failure summary carry the feedback.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "off"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Cancellation ─────────────────────────────────────────────────────
    // Ctrl-C stops pages that have not started; in-flight pages finish and
    // their files are written atomically.
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} interrupted, finishing in-flight pages…", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if cli.quiet {
        None
    } else {
        let cb = CliProgressCallback::new(show_progress);
        Some(cb as Arc<dyn ConversionProgressCallback>)
    };

    let config = build_config(&cli, progress_cb, cancel)?;
    let references: Vec<PageReference> = cli.pages.iter().map(|p| PageReference::parse(p)).collect();

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert_to_dir(references, &cli.output, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    // Without a progress callback nothing has reported failed pages yet.
    if cli.quiet {
        for line in failure_lines(&output) {
            eprintln!("{line}");
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} warnings  —  {}ms total  →  {}",
            dim(&output.stats.warnings.to_string()),
            output.stats.duration_ms,
            bold(&cli.output.display().to_string()),
        );
    }

    Ok(if output.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// One indented line per normalisation warning, shown under a page's status line.
fn warning_lines(warnings: &[NormalizationWarning]) -> Vec<String> {
    warnings.iter().map(|w| format!("      ! {w}")).collect()
}

/// `reference: error` for every failed page, in input order.
fn failure_lines(output: &BatchOutput) -> Vec<String> {
    output
        .results
        .iter()
        .filter_map(|r| r.error().map(|e| format!("✗ {}: {e}", r.reference.as_str())))
        .collect()
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancellationFlag,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .script_path(cli.script_path.clone())
        .fetch_mode(cli.fetch_mode.clone().into())
        .engine_kind(cli.engine.clone().into())
        .pandoc_path(cli.pandoc.clone())
        .pandoc_format(cli.pandoc_format.clone())
        .concurrency(cli.concurrency)
        .max_requests_per_host(cli.per_host)
        .request_interval_ms(cli.request_interval_ms)
        .fetch_timeout_secs(cli.fetch_timeout)
        .engine_timeout_secs(cli.engine_timeout)
        .fetch_retries(cli.fetch_retries)
        .engine_retries(cli.engine_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .link_style(cli.link_style.clone().into())
        .image_dir(cli.image_dir.clone())
        .file_naming(cli.file_names.clone().into())
        .categories_attribute(cli.categories_attribute)
        .recursive(cli.recursive)
        .cancellation(cancel);

    if let Some(ref url) = cli.wiki_url {
        builder = builder.wiki_url(url.clone());
    }
    if let (Some(user), Some(pass)) = (&cli.username, &cli.password) {
        builder = builder.credentials(user.clone(), pass.clone());
    }
    if let Some(ref agent) = cli.user_agent {
        builder = builder.user_agent(agent.clone());
    }
    if let Some(n) = cli.engine_concurrency {
        builder = builder.engine_concurrency(n);
    }
    for attr in &cli.attributes {
        let (key, value) = parse_attribute(attr);
        builder = builder.header_attribute(key, value);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Split `name=value`; a bare `name` sets an empty value.
fn parse_attribute(s: &str) -> (String, String) {
    match s.split_once('=') {
        Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
        None => (s.trim().to_string(), String::new()),
    }
}
