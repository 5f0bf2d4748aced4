//! Post-processing: deterministic cleanup of engine-generated AsciiDoc.
//!
//! Engines produce structurally valid AsciiDoc that is still not a finished
//! document: link and image markers are unresolved, there is no document
//! title, heading levels mirror the wiki's (which starts sections at `==`),
//! and blank-line spacing varies by engine.
//!
//! Every rule is a pure `&str → String` pass and the whole sequence is
//! idempotent: running [`clean_asciidoc`] on its own output changes nothing.
//!
//! ## Rule Order
//!
//! Markers are resolved before heading work because a block image can add
//! lines. Headings are normalised before the header is inserted so the
//! inserted title never counts as a section. Spacing and collapsing run last.

use crate::config::{ConversionConfig, LinkStyle};
use crate::markers::{ImageMarker, LinkKind, LinkMarker, MarkerTable, RE_MARKER};
use crate::output::{ConvertedDocument, FinalDocument};
use crate::pipeline::write::relative_link;
use crate::wikitext::canonical_title;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::{Captures, Regex};

/// Everything the postprocessor needs to know about where a page lives.
#[derive(Debug, Clone)]
pub struct PostprocessContext {
    /// Document title; also locates the page for relative links.
    pub title: String,
    pub link_style: LinkStyle,
    /// Wiki root for [`LinkStyle::Wiki`] links.
    pub wiki_url: Option<String>,
    pub image_dir: String,
    /// `(key, value)` header attributes, in order.
    pub attributes: Vec<(String, String)>,
}

impl PostprocessContext {
    /// Context for `title` under `config`, plus page-specific attributes.
    pub fn from_config(
        title: &str,
        config: &ConversionConfig,
        categories: &[String],
    ) -> Self {
        let mut attributes = config.header_attributes.clone();
        if config.categories_attribute && !categories.is_empty() {
            attributes.push(("page-categories".to_string(), categories.join(", ")));
        }
        Self {
            title: title.to_string(),
            link_style: config.link_style,
            wiki_url: config.wiki_root().map(str::to_string),
            image_dir: config.image_dir.trim_end_matches('/').to_string(),
            attributes,
        }
    }

    /// Bare context with default link settings.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link_style: LinkStyle::default(),
            wiki_url: None,
            image_dir: "images".to_string(),
            attributes: Vec::new(),
        }
    }
}

/// Turn engine output into the final document.
pub fn postprocess(doc: &ConvertedDocument, ctx: &PostprocessContext) -> FinalDocument {
    FinalDocument {
        title: doc.title.clone(),
        asciidoc: clean_asciidoc(&doc.asciidoc, &doc.markers, ctx),
    }
}

/// Apply all post-processing rules.
///
/// Rules (applied in order):
/// 1. Normalise line endings, strip invisible Unicode, trim trailing whitespace
/// 2. Resolve link and image markers
/// 3. Normalise heading levels
/// 4. Ensure the document header (title + attributes)
/// 5. Ensure a blank line before each section heading
/// 6. Collapse runs of blank lines
/// 7. Ensure the file ends with exactly one newline
pub fn clean_asciidoc(input: &str, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = resolve_markers(&s, markers, ctx);
    let s = normalise_headings(&s);
    let s = ensure_header(&s, ctx);
    let s = normalise_heading_spacing(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Line endings, invisible characters, trailing whitespace ─────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 2: Resolve markers ─────────────────────────────────────────────────

fn resolve_markers(input: &str, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    if markers.is_empty() {
        return input.to_string();
    }
    input
        .split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if let Some(image) = standalone_image(trimmed, markers) {
                block_image(image, markers, ctx)
            } else {
                resolve_inline(line, markers, ctx)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn standalone_image<'a>(line: &str, markers: &'a MarkerTable) -> Option<&'a ImageMarker> {
    let caps = RE_MARKER.captures(line)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != line.len() || &caps[1] != "IMG" {
        return None;
    }
    caps[2].parse::<usize>().ok().and_then(|i| markers.images.get(i))
}

fn resolve_inline(text: &str, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    RE_MARKER
        .replace_all(text, |caps: &Captures| {
            let index = caps[2].parse::<usize>().ok();
            let resolved = match &caps[1] {
                "LINK" => index
                    .and_then(|i| markers.links.get(i))
                    .map(|l| link_macro(l, markers, ctx)),
                _ => index
                    .and_then(|i| markers.images.get(i))
                    .map(|img| inline_image(img, markers, ctx)),
            };
            resolved.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn link_macro(link: &LinkMarker, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    let label = escape_label(&resolve_inline(&link.label, markers, ctx));
    match link.kind {
        LinkKind::Media => format!("link:{}[{label}]", file_url(&link.target, ctx)),
        LinkKind::Page => {
            let (page, fragment) = match link.target.split_once('#') {
                Some((p, f)) => (p.trim(), Some(f.trim())),
                None => (link.target.trim(), None),
            };
            if page.is_empty() {
                let id = section_id(fragment.unwrap_or(""));
                return format!("<<{id},{label}>>");
            }
            match (ctx.link_style, ctx.wiki_url.as_deref()) {
                (LinkStyle::Wiki, Some(wiki)) => {
                    let anchor = fragment
                        .map(|f| format!("#{}", url_escape(&f.replace(' ', "_"))))
                        .unwrap_or_default();
                    format!(
                        "link:{wiki}/wiki/{}{anchor}[{label}]",
                        url_escape(&canonical_title(page).replace(' ', "_"))
                    )
                }
                _ => {
                    let anchor = fragment
                        .map(|f| format!("#{}", section_id(f)))
                        .unwrap_or_default();
                    format!(
                        "xref:{}.adoc{anchor}[{label}]",
                        relative_link(&ctx.title, page)
                    )
                }
            }
        }
    }
}

fn block_image(image: &ImageMarker, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    let mut lines = vec![String::new()];
    if let Some(caption) = image.caption.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(format!(".{}", resolve_inline(caption.trim(), markers, ctx)));
    }
    lines.push(format!(
        "image::{}[{}]",
        file_url(&image.file, ctx),
        image_attributes(image, markers, ctx)
    ));
    lines.push(String::new());
    lines.join("\n")
}

fn inline_image(image: &ImageMarker, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    format!(
        "image:{}[{}]",
        file_url(&image.file, ctx),
        image_attributes(image, markers, ctx)
    )
}

/// Positional `alt,width` attribute list.
fn image_attributes(image: &ImageMarker, markers: &MarkerTable, ctx: &PostprocessContext) -> String {
    let alt = image
        .alt
        .as_deref()
        .or(image.caption.as_deref())
        .map(|a| strip_markers(&resolve_inline(a, markers, ctx)))
        .unwrap_or_default();
    let alt = if alt.contains([',', '"', ']']) {
        format!("\"{}\"", alt.replace('"', "'").replace(']', "\\]"))
    } else {
        alt
    };
    match image.width {
        Some(width) => format!("{alt},{width}"),
        None => alt,
    }
}

/// Plain text of a resolved label: macro syntax reduced to its label.
fn strip_markers(text: &str) -> String {
    static RE_MACRO: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:xref|link|image):[^\[\s]*\[([^\]]*)\]|<<[^,>]*,([^>]*)>>").unwrap()
    });
    RE_MACRO
        .replace_all(text, |caps: &Captures| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

fn file_url(file: &str, ctx: &PostprocessContext) -> String {
    let file = url_escape(file);
    match (ctx.link_style, ctx.wiki_url.as_deref()) {
        (LinkStyle::Wiki, Some(wiki)) => format!("{wiki}/wiki/Special:FilePath/{file}"),
        _ if ctx.image_dir.is_empty() => file,
        _ => format!("{}/{file}", ctx.image_dir),
    }
}

fn escape_label(label: &str) -> String {
    label.replace(']', "\\]")
}

/// Bytes escaped in macro targets: anything that would end or confuse the
/// target, plus non-ASCII.
const MACRO_TARGET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`');

/// Percent-encode a link or image target for use inside a macro.
fn url_escape(target: &str) -> String {
    utf8_percent_encode(target, MACRO_TARGET).to_string()
}

/// Auto-generated AsciiDoc section id: `_` prefix, lower case, `_` separators.
pub fn section_id(title: &str) -> String {
    let mut id = String::from("_");
    let mut last_sep = true;
    for c in title.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            id.push(c);
            last_sep = false;
        } else if !last_sep {
            id.push('_');
            last_sep = true;
        }
    }
    if id.len() > 1 && id.ends_with('_') {
        id.pop();
    }
    id
}

// ── Delimited-block tracking ────────────────────────────────────────────────

static RE_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:-{4,}|\.{4,}|\+{4,}|/{4,}|={4,}|\*{4,}|_{4,}|[|!]={3,})$").unwrap());

/// Tracks whether a line sits inside a delimited block whose content must
/// not be read as section structure.
#[derive(Default)]
struct BlockTracker {
    open: Option<String>,
}

impl BlockTracker {
    /// Feed one line; returns true if it is a delimiter or inside a block.
    fn step(&mut self, line: &str) -> bool {
        let trimmed = line.trim_end();
        match &self.open {
            Some(fence) => {
                if trimmed == fence {
                    self.open = None;
                }
                true
            }
            None if RE_DELIMITER.is_match(trimmed) => {
                self.open = Some(trimmed.to_string());
                true
            }
            None => false,
        }
    }
}

// ── Rule 3: Normalise heading levels ────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(={1,6}) +(\S.*)$").unwrap());

fn heading_level(line: &str) -> Option<(usize, &str)> {
    RE_HEADING.captures(line).map(|caps| {
        let level = caps.get(1).map_or(0, |m| m.len()) - 1;
        let text = caps.get(2).map_or("", |m| m.as_str());
        (level, text)
    })
}

fn normalise_headings(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();

    // (index, level, text) of every heading outside delimited blocks.
    let mut headings = Vec::new();
    let mut tracker = BlockTracker::default();
    for (i, line) in lines.iter().enumerate() {
        if tracker.step(line) {
            continue;
        }
        if let Some((level, text)) = heading_level(line) {
            headings.push((i, level, text));
        }
    }

    let first_content = lines.iter().position(|l| !l.trim().is_empty());
    let title_index = headings
        .first()
        .filter(|(i, level, _)| *level == 0 && Some(*i) == first_content)
        .map(|(i, _, _)| *i);

    let sections: Vec<(usize, usize, &str)> = headings
        .into_iter()
        .filter(|(i, _, _)| Some(*i) != title_index)
        .map(|(i, level, text)| (i, level.max(1), text))
        .collect();

    let shift = sections.iter().map(|(_, l, _)| *l).min().unwrap_or(1) - 1;
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let mut previous = 0;
    for (i, level, text) in sections {
        let level = (level - shift).min(previous + 1).min(5);
        out[i] = format!("{} {text}", "=".repeat(level + 1));
        previous = level;
    }
    out.join("\n")
}

// ── Rule 4: Document header ─────────────────────────────────────────────────

static RE_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:!?([\w-]+)!?:").unwrap());

fn ensure_header(input: &str, ctx: &PostprocessContext) -> String {
    let mut lines: Vec<String> = input
        .split('\n')
        .skip_while(|l| l.trim().is_empty())
        .map(str::to_string)
        .collect();

    let has_title = lines
        .first()
        .and_then(|l| heading_level(l))
        .is_some_and(|(level, _)| level == 0);
    if !has_title {
        let title = canonical_title(&ctx.title);
        let title = if title.is_empty() { "Untitled".to_string() } else { title };
        lines.insert(0, format!("= {title}"));
    }

    let mut header_end = 1;
    while header_end < lines.len() && RE_ATTRIBUTE.is_match(&lines[header_end]) {
        header_end += 1;
    }
    let present: Vec<String> = lines[1..header_end]
        .iter()
        .filter_map(|l| RE_ATTRIBUTE.captures(l).map(|c| c[1].to_string()))
        .collect();

    let missing: Vec<String> = ctx
        .attributes
        .iter()
        .filter(|(key, _)| !present.iter().any(|p| p == key))
        .map(|(key, value)| format!(":{key}: {value}").trim_end().to_string())
        .collect();
    for line in missing {
        lines.insert(header_end, line);
        header_end += 1;
    }

    if header_end < lines.len() && !lines[header_end].trim().is_empty() {
        lines.insert(header_end, String::new());
    }
    lines.join("\n")
}

// ── Rule 5: Blank line before section headings ──────────────────────────────

static RE_BLOCK_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[.*\]|\[\[.*\]\]|\..*\S)$").unwrap());

fn normalise_heading_spacing(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut tracker = BlockTracker::default();
    for (i, line) in input.split('\n').enumerate() {
        let in_block = tracker.step(line);
        if i > 0 && !in_block && heading_level(line).is_some() {
            // Attribute and anchor lines stay attached to their heading.
            let mut insert_at = out.len();
            while insert_at > 0
                && RE_BLOCK_ATTRIBUTE.is_match(&out[insert_at - 1])
                && !RE_DELIMITER.is_match(&out[insert_at - 1])
            {
                insert_at -= 1;
            }
            if insert_at > 0 && !out[insert_at - 1].trim().is_empty() {
                out.insert(insert_at, String::new());
            }
        }
        out.push(line.to_string());
    }
    out.join("\n")
}

// ── Rule 6: Collapse blank lines ────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut tracker = BlockTracker::default();
    for line in input.split('\n') {
        let in_block = tracker.step(line);
        let blank = line.trim().is_empty();
        if blank && !in_block && out.last().is_some_and(|l| l.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

// ── Rule 7: Single trailing newline ─────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx(title: &str) -> PostprocessContext {
        PostprocessContext::new(title)
    }

    fn clean(input: &str) -> String {
        clean_asciidoc(input, &MarkerTable::default(), &ctx("Intro"))
    }

    fn table_with_link(target: &str, label: &str) -> MarkerTable {
        let mut t = MarkerTable::default();
        t.push_link(LinkMarker {
            kind: LinkKind::Page,
            target: target.into(),
            label: label.into(),
        });
        t
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c\u{00AD}d"), "abcd");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("a  \nb\t\n"), "a\nb\n");
    }

    #[test]
    fn test_relative_xref() {
        let markers = table_with_link("Setup", "setup guide");
        let out = resolve_markers("See XWLINK0000X.", &markers, &ctx("Intro"));
        assert_eq!(out, "See xref:Setup.adoc[setup guide].");
    }

    #[test]
    fn test_xref_from_subpage_with_fragment() {
        let markers = table_with_link("Setup#Linux install", "Linux");
        let out = resolve_markers("XWLINK0000X", &markers, &ctx("Guide/Intro"));
        assert_eq!(out, "xref:../Setup.adoc#_linux_install[Linux]");
    }

    #[test]
    fn test_same_page_anchor() {
        let markers = table_with_link("#Build steps", "below");
        let out = resolve_markers("XWLINK0000X", &markers, &ctx("Intro"));
        assert_eq!(out, "<<_build_steps,below>>");
    }

    #[test]
    fn test_wiki_style_link() {
        let markers = table_with_link("getting started#Step 2", "start");
        let mut c = ctx("Intro");
        c.link_style = LinkStyle::Wiki;
        c.wiki_url = Some("https://wiki.example.org".into());
        let out = resolve_markers("XWLINK0000X", &markers, &c);
        assert_eq!(
            out,
            "link:https://wiki.example.org/wiki/Getting_started#Step_2[start]"
        );
    }

    #[test]
    fn test_url_escape_targets() {
        assert_eq!(url_escape("Getting_started"), "Getting_started");
        assert_eq!(url_escape("Café [1]?"), "Caf%C3%A9%20%5B1%5D%3F");
        assert_eq!(url_escape("a\"b<c>`"), "a%22b%3Cc%3E%60");
    }

    #[test]
    fn test_label_brackets_escaped() {
        let markers = table_with_link("A", "x [1]");
        assert_eq!(
            resolve_markers("XWLINK0000X", &markers, &ctx("Intro")),
            "xref:A.adoc[x [1\\]]"
        );
    }

    #[test]
    fn test_media_link() {
        let mut markers = MarkerTable::default();
        markers.push_link(LinkMarker {
            kind: LinkKind::Media,
            target: "Manual.pdf".into(),
            label: "manual".into(),
        });
        assert_eq!(
            resolve_markers("XWLINK0000X", &markers, &ctx("Intro")),
            "link:images/Manual.pdf[manual]"
        );
    }

    #[test]
    fn test_block_and_inline_images() {
        let mut markers = MarkerTable::default();
        markers.push_image(ImageMarker {
            file: "Flow.png".into(),
            caption: Some("The flow".into()),
            alt: None,
            width: Some(300),
        });
        markers.push_image(ImageMarker {
            file: "Icon.png".into(),
            caption: None,
            alt: Some("icon".into()),
            width: None,
        });
        let out = resolve_markers("Intro\nXWIMG0000X\nPress XWIMG0001X.", &markers, &ctx("Intro"));
        assert_eq!(
            out,
            "Intro\n\n.The flow\nimage::images/Flow.png[The flow,300]\n\nPress image:images/Icon.png[icon]."
        );
    }

    #[test]
    fn test_caption_link_resolved() {
        let mut markers = table_with_link("Berlin", "Berlin");
        markers.push_image(ImageMarker {
            file: "Map.jpg".into(),
            caption: Some("Near XWLINK0000X".into()),
            alt: None,
            width: None,
        });
        let out = resolve_markers("XWIMG0000X", &markers, &ctx("Intro"));
        assert_eq!(
            out,
            "\n.Near xref:Berlin.adoc[Berlin]\nimage::images/Map.jpg[Near Berlin]\n"
        );
    }

    #[test]
    fn test_unknown_marker_kept() {
        let markers = table_with_link("A", "a");
        assert_eq!(
            resolve_markers("XWLINK0007X", &markers, &ctx("Intro")),
            "XWLINK0007X"
        );
    }

    #[test]
    fn test_section_id() {
        assert_eq!(section_id("Install Guide"), "_install_guide");
        assert_eq!(section_id("  What's new?  "), "_what_s_new");
        assert_eq!(section_id(""), "_");
    }

    #[test]
    fn test_headings_shifted_and_clamped() {
        let input = "=== A\ntext\n===== B\n=== C";
        assert_eq!(normalise_headings(input), "== A\ntext\n=== B\n== C");
    }

    #[test]
    fn test_title_kept_and_later_level0_demoted() {
        let input = "= Title\n\n= Other\n=== Deep";
        assert_eq!(normalise_headings(input), "= Title\n\n== Other\n=== Deep");
    }

    #[test]
    fn test_headings_in_listing_untouched() {
        let input = "----\n= not a heading\n----\n==== Real";
        assert_eq!(
            normalise_headings(input),
            "----\n= not a heading\n----\n== Real"
        );
    }

    #[test]
    fn test_headings_in_example_sidebar_quote_untouched() {
        for fence in ["====", "****", "____"] {
            let input = format!("{fence}\n= kept as written\n{fence}\n==== Real");
            assert_eq!(
                normalise_headings(&input),
                format!("{fence}\n= kept as written\n{fence}\n== Real"),
                "fence {fence}"
            );
        }
    }

    #[test]
    fn test_header_inserted_with_attributes() {
        let mut c = ctx("getting_started");
        c.attributes = vec![("toc".into(), "".into()), ("author".into(), "Wiki".into())];
        let out = ensure_header("Body", &c);
        assert_eq!(out, "= Getting started\n:toc:\n:author: Wiki\n\nBody");
    }

    #[test]
    fn test_existing_header_attributes_respected() {
        let mut c = ctx("X");
        c.attributes = vec![("toc".into(), "left".into())];
        let out = ensure_header("= Existing\n:toc: right\nBody", &c);
        assert_eq!(out, "= Existing\n:toc: right\n\nBody");
    }

    #[test]
    fn test_heading_spacing_keeps_attributes_attached() {
        let out = normalise_heading_spacing("= T\ntext\n[#custom]\n== H\nmore\n== I");
        assert_eq!(out, "= T\ntext\n\n[#custom]\n== H\nmore\n\n== I");
    }

    #[test]
    fn test_collapse_blank_lines_outside_blocks() {
        let out = collapse_blank_lines("a\n\n\n\nb\n....\nx\n\n\ny\n....");
        assert_eq!(out, "a\n\nb\n....\nx\n\n\ny\n....");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("a\n\n\n"), "a\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_full_pipeline_intro() {
        let markers = table_with_link("Setup", "setup guide");
        let out = clean_asciidoc(
            "=== Intro\n\nSee XWLINK0000X and _emphasis_.\n",
            &markers,
            &ctx("Intro"),
        );
        assert_eq!(
            out,
            "= Intro\n\n== Intro\n\nSee xref:Setup.adoc[setup guide] and _emphasis_.\n"
        );
    }

    #[test]
    fn test_idempotent_on_example() {
        let markers = table_with_link("Setup", "setup");
        let mut c = ctx("Guide/Intro");
        c.attributes = vec![("toc".into(), "".into())];
        let once = clean_asciidoc(
            "\n\n==== A\ntext XWLINK0000X\n\n\n\n[source]\n----\n== code\n\n\n----\n= B\n",
            &markers,
            &c,
        );
        let twice = clean_asciidoc(&once, &markers, &c);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input_gets_title() {
        assert_eq!(clean(""), "= Intro\n");
    }

    /// Lines mixing markers, headings and every delimited block kind.
    const PIECES: &[&str] = &[
        "",
        "Plain text.",
        "= Title",
        "== Section",
        "=== Sub",
        "==== Deep",
        "See XWLINK0000X and XWLINK0001X.",
        "XWLINK0002X",
        "XWIMG0000X",
        "XWIMG0001X",
        "Press XWIMG0001X now.",
        "XWIMG0002X",
        "[source,rust]",
        ".Listing title",
        "----",
        "....",
        "====",
        "****",
        "____",
        "|===",
        "|a |b",
    ];

    fn populated_markers() -> MarkerTable {
        let mut t = table_with_link("Setup", "setup guide");
        t.push_link(LinkMarker {
            kind: LinkKind::Page,
            target: "#Top".into(),
            label: "top".into(),
        });
        t.push_link(LinkMarker {
            kind: LinkKind::Media,
            target: "Manual.pdf".into(),
            label: "manual".into(),
        });
        t.push_image(ImageMarker {
            file: "Flow.png".into(),
            caption: Some("The flow".into()),
            alt: None,
            width: Some(300),
        });
        t.push_image(ImageMarker {
            file: "Icon.png".into(),
            caption: None,
            alt: Some("icon".into()),
            width: None,
        });
        t.push_image(ImageMarker {
            file: "Map.jpg".into(),
            caption: Some("Near XWLINK0000X".into()),
            alt: None,
            width: None,
        });
        t
    }

    proptest! {
        #[test]
        fn prop_clean_is_idempotent_with_markers_and_blocks(
            pieces in prop::collection::vec(prop::sample::select(PIECES), 0..40)
        ) {
            let markers = populated_markers();
            let c = ctx("Guide/Intro");
            let once = clean_asciidoc(&pieces.join("\n"), &markers, &c);
            prop_assert!(!once.contains("XWLINK") && !once.contains("XWIMG"), "{}", once);
            let twice = clean_asciidoc(&once, &markers, &c);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_clean_is_idempotent(input in r"[=a-z .:\[\]\-\n]{0,200}") {
            let once = clean(&input);
            let twice = clean(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_output_ends_with_single_newline(input in r"[=a-z \n]{0,120}") {
            let out = clean(&input);
            prop_assert!(out.ends_with('\n'));
            prop_assert!(!out.ends_with("\n\n"));
        }
    }
}
