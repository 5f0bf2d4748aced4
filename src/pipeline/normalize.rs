//! Normalisation: rewrite wiki-specific constructs before the engine sees them.
//!
//! A generic converter understands MediaWiki core syntax but mishandles
//! everything a real wiki layers on top: templates, file embeds with layout
//! options, categories, styled tables. This stage rewrites those into either
//! plain core syntax or opaque marker tokens, recording every lossy step as a
//! [`NormalizationWarning`].
//!
//! ## Order
//!
//! A pre-pass protects verbatim spans and removes things with no meaning in
//! the output (comments, behaviour switches, extension tags). Then the rules
//! run once each:
//!
//! 1. + 2. Internal links and file embeds become markers. They share one
//!    innermost-first bracket scan because embeds nest links in captions.
//! 3. Templates are removed (or expanded, for deterministic magic words).
//! 4. Category tags are removed and recorded.
//! 5. Table attributes are dropped.
//!
//! Finally the verbatim spans are restored untouched.

use crate::error::{NormalizationWarning, WarningKind};
use crate::markers::{ImageMarker, LinkKind, LinkMarker, MarkerTable};
use crate::output::{NormalizedDocument, RawDocument};
use crate::wikitext::{
    canonical_title, find_closing, split_cells, split_namespace, strip_cell_attributes, TableLine,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Tags whose content must reach the engine byte-for-byte.
const VERBATIM_TAGS: &[&str] = &["nowiki", "pre", "syntaxhighlight", "source", "code", "math"];

/// Extension tags with no AsciiDoc counterpart.
const UNSUPPORTED_TAGS: &[&str] = &[
    "timeline",
    "graph",
    "mapframe",
    "maplink",
    "inputbox",
    "categorytree",
    "imagemap",
    "score",
    "templatedata",
    "hiero",
    "charinsert",
];

/// Image options that only affect on-wiki layout.
const LAYOUT_OPTIONS: &[&str] = &[
    "thumb",
    "thumbnail",
    "frame",
    "framed",
    "frameless",
    "border",
    "left",
    "right",
    "center",
    "centre",
    "none",
    "baseline",
    "sub",
    "super",
    "top",
    "text-top",
    "middle",
    "bottom",
    "text-bottom",
    "upright",
];

/// Option prefixes with a value that only affect on-wiki behaviour.
const LAYOUT_PREFIXES: &[&str] = &[
    "link=",
    "page=",
    "class=",
    "lang=",
    "upright=",
    "thumb=",
    "thumbnail=",
    "border=",
    "start=",
    "end=",
];

/// Rewrite one raw document into the engine's source dialect plus markers.
///
/// Pure and total: every input produces a document, and the same input
/// always produces the same document.
pub fn normalize(raw: &RawDocument) -> NormalizedDocument {
    let mut state = Normalizer::new(&raw.title);

    let text = normalise_line_endings(&raw.markup);
    let text = state.stash_verbatim(&text);
    let text = strip_comments(&text);
    let text = strip_behaviour_switches(&text);
    let text = state.remove_unsupported_tags(&text);
    let text = expand_galleries(&text);
    let text = rewrite_redirect(&text);
    let text = state.rewrite_brackets(&text);
    let text = state.rewrite_templates(&text);
    let text = state.strip_categories(&text);
    let text = strip_table_attributes(&text);
    let text = state.restore_verbatim(&text);

    debug!(
        title = %raw.title,
        links = state.markers.links.len(),
        images = state.markers.images.len(),
        warnings = state.warnings.len(),
        "normalised"
    );

    NormalizedDocument {
        title: raw.title.clone(),
        markup: text,
        markers: state.markers,
        categories: state.categories,
        warnings: state.warnings,
    }
}

struct Normalizer<'a> {
    title: &'a str,
    markers: MarkerTable,
    categories: Vec<String>,
    warnings: Vec<NormalizationWarning>,
    stash: Vec<String>,
}

impl<'a> Normalizer<'a> {
    fn new(title: &'a str) -> Self {
        Self {
            title,
            markers: MarkerTable::default(),
            categories: Vec::new(),
            warnings: Vec::new(),
            stash: Vec::new(),
        }
    }

    fn warn(&mut self, kind: WarningKind, detail: impl Into<String>) {
        self.warnings.push(NormalizationWarning::new(kind, detail));
    }

    // ── Pre-pass: verbatim spans ────────────────────────────────────────────

    fn stash_verbatim(&mut self, input: &str) -> String {
        let mut text = RE_NOWIKI_EMPTY.replace_all(input, "").into_owned();
        for re in RE_VERBATIM.iter() {
            text = re
                .replace_all(&text, |caps: &regex::Captures| {
                    self.stash.push(caps[0].to_string());
                    stash_token(self.stash.len() - 1)
                })
                .into_owned();
        }
        text
    }

    fn restore_verbatim(&self, input: &str) -> String {
        let mut text = input.to_string();
        // A stashed span may itself hold a token (`<nowiki>` inside `<pre>`).
        for _ in 0..=self.stash.len() {
            if !RE_STASH.is_match(&text) {
                break;
            }
            text = RE_STASH
                .replace_all(&text, |caps: &regex::Captures| {
                    caps[1]
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| self.stash.get(i))
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned();
        }
        text
    }

    // ── Pre-pass: unsupported extension tags ────────────────────────────────

    fn remove_unsupported_tags(&mut self, input: &str) -> String {
        let mut text = input.to_string();
        for (tag, re) in UNSUPPORTED_TAGS.iter().zip(RE_UNSUPPORTED.iter()) {
            let count = re.find_iter(&text).count();
            if count == 0 {
                continue;
            }
            for _ in 0..count {
                self.warn(WarningKind::UnsupportedTag, format!("<{tag}>"));
            }
            text = re.replace_all(&text, "").into_owned();
        }
        text
    }

    // ── Rules 1 + 2: links and file embeds ──────────────────────────────────

    fn rewrite_brackets(&mut self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("[[") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match find_closing(after, "[[", "]]", true) {
                Some(end) => {
                    let inner = self.rewrite_brackets(&after[..end]);
                    let tail = &after[end + 2..];
                    let (replacement, consumed) = self.classify_brackets(&inner, tail);
                    out.push_str(&replacement);
                    rest = &tail[consumed..];
                }
                None => {
                    let line_end = after.find('\n').unwrap_or(after.len());
                    self.warn(
                        WarningKind::UnbalancedMarkup,
                        format!("[[{}", truncate(&after[..line_end], 40)),
                    );
                    out.push_str("[[");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Replacement for one `[[inner]]` plus how many bytes of `tail` it absorbed.
    fn classify_brackets(&mut self, inner: &str, tail: &str) -> (String, usize) {
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            return (format!("[[{inner}]]"), 0);
        }
        let forced = trimmed.starts_with(':');
        let body = trimmed.trim_start_matches(':');
        let (target, label) = match body.split_once('|') {
            Some((t, l)) => (t.trim(), Some(l.trim())),
            None => (body.trim(), None),
        };

        match split_namespace(target) {
            Some((ns, _)) if ns == "category" && !forced => return (format!("[[{inner}]]"), 0),
            Some((ns, file)) if (ns == "file" || ns == "image") && !forced => {
                let options = body.split_once('|').map(|(_, o)| o).unwrap_or("");
                return (self.image_marker(file, options), 0);
            }
            Some((ns, file)) if ns == "media" => {
                let file = file_name(file);
                let label = label.filter(|l| !l.is_empty()).unwrap_or(file.as_str()).to_string();
                let token = self.markers.push_link(LinkMarker {
                    kind: LinkKind::Media,
                    target: file.clone(),
                    label,
                });
                return (token, 0);
            }
            _ => {}
        }

        let display = match label {
            Some(l) if !l.is_empty() => l.to_string(),
            // `[[/Install/]]` displays as `Install`.
            _ if target.ends_with('/') && is_relative_target(target) => {
                let bare = target
                    .trim_end_matches('/')
                    .trim_start_matches("../")
                    .trim_start_matches('/');
                if bare.is_empty() { target } else { bare }.to_string()
            }
            _ => target.to_string(),
        };
        let target = resolve_relative_target(self.title, target);
        let trail = RE_LINK_TRAIL.find(tail).map(|m| m.as_str()).unwrap_or("");
        let token = self.markers.push_link(LinkMarker {
            kind: LinkKind::Page,
            target,
            label: format!("{display}{trail}"),
        });
        (token, trail.len())
    }

    fn image_marker(&mut self, file: &str, options: &str) -> String {
        let file = file_name(file);
        let mut image = ImageMarker {
            file: file.clone(),
            caption: None,
            alt: None,
            width: None,
        };
        let mut dropped = Vec::new();

        if !options.is_empty() {
            for option in split_top_level(options) {
                let option = option.trim();
                let lower = option.to_ascii_lowercase();
                if option.is_empty() {
                    continue;
                }
                if let Some(caps) = RE_IMAGE_SIZE.captures(&lower) {
                    image.width = caps.get(1).and_then(|w| w.as_str().parse().ok());
                } else if let Some(alt) = option.strip_prefix("alt=") {
                    image.alt = Some(alt.trim().to_string());
                } else if LAYOUT_OPTIONS.contains(&lower.as_str())
                    || LAYOUT_PREFIXES.iter().any(|p| lower.starts_with(p))
                {
                    dropped.push(option.to_string());
                } else {
                    // MediaWiki uses the last unrecognised option as caption.
                    image.caption = Some(option.to_string());
                }
            }
        }

        if !dropped.is_empty() {
            self.warn(
                WarningKind::ImageOptions,
                format!("File:{file}: {}", dropped.join(", ")),
            );
        }
        self.markers.push_image(image)
    }

    // ── Rule 3: templates ───────────────────────────────────────────────────

    fn rewrite_templates(&mut self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match find_closing(after, "{{", "}}", false) {
                Some(end) => {
                    let inner = &after[..end];
                    let mut tail = &after[end + 2..];
                    if inner.starts_with('{') {
                        // `{{{param}}}`: the third closing brace follows.
                        tail = tail.strip_prefix('}').unwrap_or(tail);
                        self.warn(
                            WarningKind::Template,
                            format!("{{{{{{{}}}}}}}", truncate(inner.trim_start_matches('{'), 60)),
                        );
                    } else {
                        let expanded = self.expand_template(inner);
                        out.push_str(&expanded);
                    }
                    rest = tail;
                }
                None => {
                    self.warn(
                        WarningKind::UnbalancedMarkup,
                        format!("{{{{{}", truncate(after.lines().next().unwrap_or(""), 40)),
                    );
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn expand_template(&mut self, inner: &str) -> String {
        let name = inner.split('|').next().unwrap_or("").trim();
        match name {
            "PAGENAME" | "FULLPAGENAME" | "PAGENAMEE" | "FULLPAGENAMEE" => {
                return self.title.to_string()
            }
            "!" => return "|".to_string(),
            "=" => return "=".to_string(),
            _ => {}
        }
        if let Some((func, arg)) = inner.split_once(':') {
            // Case functions ignore case in their name; the page-setting words do not.
            match func.trim().to_ascii_lowercase().as_str() {
                "lc" => return self.rewrite_templates(arg).trim().to_lowercase(),
                "uc" => return self.rewrite_templates(arg).trim().to_uppercase(),
                "lcfirst" => return change_first(self.rewrite_templates(arg).trim(), false),
                "ucfirst" => return change_first(self.rewrite_templates(arg).trim(), true),
                _ => {}
            }
            if matches!(func.trim(), "DISPLAYTITLE" | "DEFAULTSORT" | "DEFAULTSORTKEY") {
                return String::new();
            }
        }
        self.warn(
            WarningKind::Template,
            format!("{{{{{}}}}}", truncate(name, 60)),
        );
        String::new()
    }

    // ── Rule 4: categories ──────────────────────────────────────────────────

    fn strip_categories(&mut self, input: &str) -> String {
        let mut lines = Vec::new();
        for line in input.split('\n') {
            if !RE_CATEGORY.is_match(line) {
                lines.push(line.to_string());
                continue;
            }
            for caps in RE_CATEGORY.captures_iter(line) {
                let name = canonical_title(&caps[1]);
                if !name.is_empty() && !self.categories.contains(&name) {
                    self.categories.push(name);
                }
            }
            let stripped = RE_CATEGORY.replace_all(line, "");
            if !stripped.trim().is_empty() {
                lines.push(stripped.trim_end().to_string());
            }
        }
        lines.join("\n")
    }
}

fn change_first(text: &str, upper: bool) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ── Pre-pass helpers ────────────────────────────────────────────────────────

static RE_VERBATIM: Lazy<Vec<Regex>> = Lazy::new(|| {
    VERBATIM_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}(?:\s[^>]*)?>.*?</{tag}\s*>")).unwrap())
        .collect()
});

static RE_NOWIKI_EMPTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<nowiki\s*/>").unwrap());

static RE_STASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"XWRAW(\d{4,})X").unwrap());

fn stash_token(index: usize) -> String {
    format!("XWRAW{index:04}X")
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Comments run to `-->`, or to the end of the page if never closed.
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").unwrap());

fn strip_comments(input: &str) -> String {
    RE_COMMENT.replace_all(input, "").into_owned()
}

static RE_BEHAVIOUR_SWITCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"__(?:NOTOC|FORCETOC|TOC|NOEDITSECTION|NEWSECTIONLINK|NONEWSECTIONLINK|NOGALLERY|HIDDENCAT|INDEX|NOINDEX|STATICREDIRECT|NOTITLECONVERT|NOCONTENTCONVERT|DISAMBIG)__",
    )
    .unwrap()
});

fn strip_behaviour_switches(input: &str) -> String {
    RE_BEHAVIOUR_SWITCH.replace_all(input, "").into_owned()
}

static RE_UNSUPPORTED: Lazy<Vec<Regex>> = Lazy::new(|| {
    UNSUPPORTED_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(
                r"(?is)<{tag}(?:\s[^>]*)?/>|<{tag}(?:\s[^>]*)?>.*?</{tag}\s*>"
            ))
            .unwrap()
        })
        .collect()
});

static RE_GALLERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<gallery(?:\s[^>]*)?>(.*?)</gallery\s*>").unwrap());

/// Each gallery entry becomes a standalone file embed, handled by rule 2.
fn expand_galleries(input: &str) -> String {
    RE_GALLERY
        .replace_all(input, |caps: &regex::Captures| {
            let embeds: Vec<String> = caps[1]
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|entry| match split_namespace(entry) {
                    Some((ns, _)) if ns == "file" || ns == "image" => format!("[[{entry}]]"),
                    _ => format!("[[File:{entry}]]"),
                })
                .collect();
            format!("\n{}\n", embeds.join("\n\n"))
        })
        .into_owned()
}

static RE_REDIRECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A\s*#REDIRECT\s*:?\s*(\[\[[^\]\n]+\]\])").unwrap());

/// `#REDIRECT [[X]]` would otherwise read as a numbered list item.
fn rewrite_redirect(input: &str) -> String {
    RE_REDIRECT
        .replace(input, "Redirect to ${1}.")
        .into_owned()
}

// ── Rule helpers ────────────────────────────────────────────────────────────

/// MediaWiki's default link trail: lower-case ASCII letters.
static RE_LINK_TRAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[a-z]+").unwrap());

static RE_IMAGE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)?(?:x\d+)?\s*px$").unwrap());

static RE_CATEGORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\[\s*category\s*:\s*([^\]|]*?)\s*(?:\|[^\]]*)?\]\]").unwrap()
});

fn is_relative_target(target: &str) -> bool {
    target.starts_with('/') || target.starts_with("../")
}

/// Resolve a subpage link against the page it appears on.
///
/// On `Guide/Install`, `/Linux` is `Guide/Install/Linux` and `../Usage` is
/// `Guide/Usage`. Climbing above the root leaves the target unchanged.
fn resolve_relative_target(current: &str, target: &str) -> String {
    if !is_relative_target(target) {
        return target.to_string();
    }
    let (page, fragment) = match target.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (target, None),
    };

    let mut segments: Vec<&str> = current.split('/').filter(|s| !s.is_empty()).collect();
    let mut rest = page;
    while let Some(up) = rest.strip_prefix("../") {
        if segments.pop().is_none() {
            return target.to_string();
        }
        rest = up;
    }
    if segments.is_empty() {
        return target.to_string();
    }
    let rest = rest.trim_start_matches('/').trim_end_matches('/');

    let mut resolved = segments.join("/");
    if !rest.is_empty() {
        resolved.push('/');
        resolved.push_str(rest);
    }
    if let Some(f) = fragment {
        resolved.push('#');
        resolved.push_str(f);
    }
    resolved
}

fn file_name(name: &str) -> String {
    canonical_title(name).replace(' ', "_")
}

/// Split image options on `|`, ignoring pipes inside nested `[[…]]`.
fn split_top_level(options: &str) -> Vec<&str> {
    let bytes = options.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"[[") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"]]") {
            depth = (depth - 1).max(0);
            i += 2;
        } else {
            if bytes[i] == b'|' && depth == 0 {
                parts.push(&options[start..i]);
                start = i + 1;
            }
            i += 1;
        }
    }
    parts.push(&options[start..]);
    parts
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

// ── Rule 5: table attributes ────────────────────────────────────────────────

fn strip_table_attributes(input: &str) -> String {
    let mut depth = 0usize;
    let mut out = Vec::new();
    for line in input.split('\n') {
        let kind = TableLine::classify(line);
        let rewritten = match kind {
            TableLine::Start(_) => {
                depth += 1;
                "{|".to_string()
            }
            _ if depth == 0 => line.to_string(),
            TableLine::End => {
                depth -= 1;
                "|}".to_string()
            }
            TableLine::Row(_) => "|-".to_string(),
            TableLine::Caption(rest) => format!("|+ {}", strip_cell_attributes(rest))
                .trim_end()
                .to_string(),
            TableLine::Header(rest) => cells_line("!", " !! ", split_cells(rest, true)),
            TableLine::Data(rest) => cells_line("|", " || ", split_cells(rest, false)),
            TableLine::Text(text) => text.to_string(),
        };
        out.push(rewritten);
    }
    out.join("\n")
}

fn cells_line(prefix: &str, separator: &str, cells: Vec<&str>) -> String {
    let cells: Vec<&str> = cells.into_iter().map(strip_cell_attributes).collect();
    format!("{prefix} {}", cells.join(separator)).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(markup: &str) -> NormalizedDocument {
        normalize(&RawDocument {
            title: "Test Page".into(),
            source_url: "https://wiki.example.org/w/index.php?title=Test_Page&action=raw".into(),
            page_id: None,
            markup: markup.into(),
        })
    }

    fn kinds(doc: &NormalizedDocument) -> Vec<WarningKind> {
        doc.warnings.iter().map(|w| w.kind).collect()
    }

    #[test]
    fn test_link_with_label() {
        let doc = run("See [[Setup|setup guide]] now.");
        assert_eq!(doc.markup, "See XWLINK0000X now.");
        assert_eq!(
            doc.markers.links[0],
            LinkMarker {
                kind: LinkKind::Page,
                target: "Setup".into(),
                label: "setup guide".into(),
            }
        );
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_link_label_defaults_to_target() {
        let doc = run("[[Main Page#History]]");
        assert_eq!(doc.markers.links[0].target, "Main Page#History");
        assert_eq!(doc.markers.links[0].label, "Main Page#History");
    }

    #[test]
    fn test_subpage_links_resolve_against_page() {
        let doc = normalize(&RawDocument {
            title: "Guide/Install".into(),
            source_url: String::new(),
            page_id: None,
            markup: "[[/Linux]], [[../Usage|usage]], [[/Notes/]] and [[../../Home#Top]]".into(),
        });
        let targets: Vec<(&str, &str)> = doc
            .markers
            .links
            .iter()
            .map(|l| (l.target.as_str(), l.label.as_str()))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("Guide/Install/Linux", "/Linux"),
                ("Guide/Usage", "usage"),
                ("Guide/Install/Notes", "Notes"),
                ("../../Home#Top", "../../Home#Top"),
            ]
        );
    }

    #[test]
    fn test_relative_target_above_root_kept() {
        assert_eq!(resolve_relative_target("Guide", "../../X"), "../../X");
        assert_eq!(resolve_relative_target("Guide", "/Install"), "Guide/Install");
        assert_eq!(resolve_relative_target("Guide", "Install"), "Install");
        assert_eq!(resolve_relative_target("A/B/C", "../../Home"), "A/Home");
        assert_eq!(resolve_relative_target("A/B", "../"), "A");
    }

    #[test]
    fn test_link_trail_extends_label() {
        let doc = run("Two [[apple]]s, one [[pear]].");
        assert_eq!(doc.markup, "Two XWLINK0000X, one XWLINK0001X.");
        assert_eq!(doc.markers.links[0].label, "apples");
        assert_eq!(doc.markers.links[1].label, "pear");
    }

    #[test]
    fn test_forced_link_to_category_and_file() {
        let doc = run("[[:Category:Tools]] and [[:File:A.png|the file]]");
        assert!(doc.categories.is_empty());
        assert!(doc.markers.images.is_empty());
        assert_eq!(doc.markers.links.len(), 2);
        assert_eq!(doc.markers.links[0].target, "Category:Tools");
        assert_eq!(doc.markers.links[1].label, "the file");
    }

    #[test]
    fn test_media_link() {
        let doc = run("[[Media:Manual v2.pdf|manual]]");
        assert_eq!(doc.markers.links[0].kind, LinkKind::Media);
        assert_eq!(doc.markers.links[0].target, "Manual_v2.pdf");
        assert_eq!(doc.markers.links[0].label, "manual");
    }

    #[test]
    fn test_image_with_options() {
        let doc = run("[[File:diagram.png|thumb|left|300px|alt=Flow|The data flow]]");
        assert_eq!(doc.markup, "XWIMG0000X");
        let img = &doc.markers.images[0];
        assert_eq!(img.file, "Diagram.png");
        assert_eq!(img.width, Some(300));
        assert_eq!(img.alt.as_deref(), Some("Flow"));
        assert_eq!(img.caption.as_deref(), Some("The data flow"));
        assert_eq!(kinds(&doc), vec![WarningKind::ImageOptions]);
        assert!(doc.warnings[0].detail.contains("thumb, left"));
    }

    #[test]
    fn test_image_caption_with_nested_link() {
        let doc = run("[[Image:Map.jpg|Area near [[Berlin]]]]");
        assert_eq!(doc.markup, "XWIMG0000X");
        assert_eq!(doc.markers.links[0].target, "Berlin");
        assert_eq!(
            doc.markers.images[0].caption.as_deref(),
            Some("Area near XWLINK0000X")
        );
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_unbalanced_brackets_kept() {
        let doc = run("broken [[link here\nnext");
        assert_eq!(doc.markup, "broken [[link here\nnext");
        assert_eq!(kinds(&doc), vec![WarningKind::UnbalancedMarkup]);
    }

    #[test]
    fn test_templates_removed_with_warning() {
        let doc = run("{{Infobox\n| name = X\n| flag = {{Flag|DE}}\n}}\nBody {{Stub}}.");
        assert_eq!(doc.markup, "\nBody .");
        assert_eq!(doc.warnings.len(), 2);
        assert_eq!(doc.warnings[0].detail, "{{Infobox}}");
        assert_eq!(doc.warnings[1].detail, "{{Stub}}");
    }

    #[test]
    fn test_template_parameter_removed() {
        let doc = run("Hello {{{name|world}}}!");
        assert_eq!(doc.markup, "Hello !");
        assert_eq!(kinds(&doc), vec![WarningKind::Template]);
    }

    #[test]
    fn test_magic_words_expand() {
        let doc = run("{{DISPLAYTITLE:x}}On {{PAGENAME}}: a{{!}}b, {{uc:abc}} {{lc:DEF}}");
        assert_eq!(doc.markup, "On Test Page: a|b, ABC def");
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_case_functions_ignore_name_case() {
        let doc = run("{{LC:ABC}} {{Uc: def }} {{ucfirst:ghi}} {{LCFIRST:JKL}}");
        assert_eq!(doc.markup, "abc DEF Ghi jKL");
        assert!(doc.warnings.is_empty());

        // Page-setting words are case-sensitive: a lower-case one is a template.
        let doc = run("{{displaytitle:x}}Body");
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn test_categories_recorded_and_lines_removed() {
        let doc = run("Text.\n[[Category:Tools|sort]]\n[[category:build_system]] [[Category:Tools]]\nMore.");
        assert_eq!(doc.markup, "Text.\nMore.");
        assert_eq!(doc.categories, vec!["Tools", "Build system"]);
    }

    #[test]
    fn test_table_attributes_dropped() {
        let input = "{| class=\"wikitable\" style=\"width:100%\"\n|+ style=\"x\" | Caption\n|- style=\"color:red\"\n! scope=\"col\" | A !! B\n|-\n| style=\"a\" | 1 || 2\n|}";
        let doc = run(input);
        assert_eq!(
            doc.markup,
            "{|\n|+ Caption\n|-\n! A !! B\n|-\n| 1 || 2\n|}"
        );
    }

    #[test]
    fn test_table_cell_with_link_keeps_marker() {
        let doc = run("{|\n| [[A|B]] || c\n|}");
        assert_eq!(doc.markup, "{|\n| XWLINK0000X || c\n|}");
    }

    #[test]
    fn test_pipes_outside_tables_untouched() {
        let doc = run("| not a table || here");
        assert_eq!(doc.markup, "| not a table || here");
    }

    #[test]
    fn test_verbatim_spans_untouched() {
        let input = "<nowiki>[[Not a link]] {{nope}}</nowiki>\n<pre>\n{{x}} [[y]]\n</pre>";
        let doc = run(input);
        assert_eq!(doc.markup, input);
        assert!(doc.markers.is_empty());
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_nested_verbatim_restored() {
        let input = "<pre>a <nowiki>[[b]]</nowiki></pre>";
        assert_eq!(run(input).markup, input);
    }

    #[test]
    fn test_syntaxhighlight_untouched() {
        let input = "<syntaxhighlight lang=\"rust\">\nlet x = [[1]]; // {{a}}\n</syntaxhighlight>";
        assert_eq!(run(input).markup, input);
    }

    #[test]
    fn test_comments_removed() {
        let doc = run("a<!-- hidden [[X]] -->b<!-- unterminated");
        assert_eq!(doc.markup, "ab");
        assert!(doc.markers.is_empty());
    }

    #[test]
    fn test_behaviour_switches_removed() {
        assert_eq!(run("__NOTOC__\nText __NOEDITSECTION__").markup, "\nText ");
    }

    #[test]
    fn test_unsupported_tags_removed() {
        let doc = run("A<timeline>\nPeriod = x\n</timeline>B<inputbox/>C");
        assert_eq!(doc.markup, "ABC");
        assert_eq!(
            kinds(&doc),
            vec![WarningKind::UnsupportedTag, WarningKind::UnsupportedTag]
        );
    }

    #[test]
    fn test_gallery_expands_to_images() {
        let doc = run("<gallery>\nFile:A.png|First\nB.jpg\n</gallery>");
        assert_eq!(doc.markers.images.len(), 2);
        assert_eq!(doc.markers.images[0].caption.as_deref(), Some("First"));
        assert_eq!(doc.markers.images[1].file, "B.jpg");
        assert!(doc.markup.contains("XWIMG0000X\n\nXWIMG0001X"));
    }

    #[test]
    fn test_redirect() {
        let doc = run("#REDIRECT [[Getting started]]");
        assert_eq!(doc.markup, "Redirect to XWLINK0000X.");
        assert_eq!(doc.markers.links[0].target, "Getting started");
    }

    #[test]
    fn test_crlf_normalised() {
        assert_eq!(run("a\r\nb\rc").markup, "a\nb\nc");
    }

    #[test]
    fn test_deterministic() {
        let input = "== H ==\n[[A]] {{T}} [[File:x.png|thumb]] [[Category:C]]";
        assert_eq!(run(input), run(input));
    }
}
