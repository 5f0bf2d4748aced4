//! Built-in MediaWiki → AsciiDoc converter.
//!
//! Covers the core syntax a typical wiki page uses: headings, emphasis,
//! lists, rules, preformatted and source blocks, inline code, references,
//! external links and tables (one level of nesting). Anything else passes
//! through as text.
//!
//! The conversion runs in three passes:
//!
//! 1. Verbatim regions (`<pre>`, `<syntaxhighlight>`, `<nowiki>`, `<code>`,
//!    `<math>`, `<ref>`) are rendered up front and replaced by tokens so the
//!    later passes cannot touch them.
//! 2. Lines are grouped into blocks (headings, lists, tables, paragraphs)
//!    and inline markup is rewritten.
//! 3. The tokens are swapped back.

use super::{ConversionEngine, Dialect, EngineError};
use crate::error::{ConversionEngineError, EngineUnavailable};
use crate::wikitext::{split_cells, strip_cell_attributes, TableLine};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const ENGINE_NAME: &str = "native";

/// Stands in for `<br>` until emphasis is resolved, so a break never reads
/// as a word character next to a quote.
const HARD_BREAK: char = '\u{E000}';

/// In-process converter; always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversionEngine for NativeEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn probe(&self) -> Result<(), EngineUnavailable> {
        Ok(())
    }

    async fn convert(
        &self,
        input: &str,
        from: Dialect,
        to: Dialect,
    ) -> Result<String, EngineError> {
        if (from, to) != (Dialect::MediaWiki, Dialect::AsciiDoc) {
            return Err(EngineError::Failed(ConversionEngineError {
                engine: ENGINE_NAME.to_string(),
                detail: format!("unsupported conversion {from} -> {to}"),
            }));
        }
        Ok(mediawiki_to_asciidoc(input))
    }
}

/// Convert MediaWiki markup to AsciiDoc.
pub fn mediawiki_to_asciidoc(input: &str) -> String {
    let mut conv = Converter::default();
    let text = input.replace("\r\n", "\n");
    let text = conv.extract_blocks(&text);
    let text = conv.extract_inline(&text);
    let body = conv.convert_blocks(&text, 0);
    let body = conv.restore(&body);
    let body = body.trim_matches('\n');
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

#[derive(Default)]
struct Converter {
    stash: Vec<String>,
}

// ── Pass 1: verbatim regions ────────────────────────────────────────────────

static RE_PRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<pre(?:\s[^>]*)?>(.*?)</pre\s*>").unwrap());
static RE_HIGHLIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:syntaxhighlight|source)(\s[^>]*)?>(.*?)</(?:syntaxhighlight|source)\s*>")
        .unwrap()
});
static RE_LANG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\blang\s*=\s*["']?([A-Za-z0-9_+#.-]+)"#).unwrap());
static RE_INLINE_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\binline\b").unwrap());
static RE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<code(?:\s[^>]*)?>(.*?)</code\s*>").unwrap());
static RE_TT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tt(?:\s[^>]*)?>(.*?)</tt\s*>").unwrap());
static RE_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<math(?:\s[^>]*)?>(.*?)</math\s*>").unwrap());
static RE_NOWIKI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<nowiki\s*>(.*?)</nowiki\s*>").unwrap());
static RE_NOWIKI_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?nowiki\s*/?>").unwrap());
static RE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<ref(?:\s[^>/]*)?>(.*?)</ref\s*>").unwrap());
static RE_REF_EMPTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<ref(?:\s[^>]*)?/>").unwrap());
static RE_REFERENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<references(?:\s[^>]*)?/>|<references(?:\s[^>]*)?>.*?</references\s*>")
        .unwrap()
});
static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"XW(?:BLK|INL)(\d{4,})X").unwrap());
static RE_BLOCK_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^XWBLK\d{4,}X$").unwrap());

impl Converter {
    fn push_block(&mut self, rendered: String) -> String {
        self.stash.push(rendered);
        format!("\nXWBLK{:04}X\n", self.stash.len() - 1)
    }

    fn push_inline(&mut self, rendered: String) -> String {
        self.stash.push(rendered);
        format!("XWINL{:04}X", self.stash.len() - 1)
    }

    fn extract_blocks(&mut self, input: &str) -> String {
        let text = RE_PRE
            .replace_all(input, |caps: &Captures| {
                let body = RE_NOWIKI_TAG.replace_all(&caps[1], "");
                let body = decode_entities(body.trim_matches('\n'));
                self.push_block(delimited_block("....", &body, None))
            })
            .into_owned();
        RE_HIGHLIGHT
            .replace_all(&text, |caps: &Captures| {
                let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let body = caps[2].trim_matches('\n');
                let lang = RE_LANG.captures(attrs).map(|c| c[1].to_ascii_lowercase());
                if RE_INLINE_ATTR.is_match(attrs) {
                    return self.push_inline(literal_monospace(body.trim(), true));
                }
                let style = match lang {
                    Some(lang) => format!("[source,{lang}]"),
                    None => "[source]".to_string(),
                };
                self.push_block(delimited_block("----", body, Some(&style)))
            })
            .into_owned()
    }

    fn extract_inline(&mut self, input: &str) -> String {
        let text = RE_REFERENCES.replace_all(input, "").into_owned();
        let text = replace_in_context(&RE_CODE, &text, |caps, adjacent| {
            let body = RE_NOWIKI_TAG.replace_all(&caps[1], "");
            self.push_inline(literal_monospace(&decode_entities(&body), adjacent))
        });
        let text = replace_in_context(&RE_TT, &text, |caps, adjacent| {
            self.push_inline(literal_monospace(&decode_entities(&caps[1]), adjacent))
        });
        let text = RE_MATH
            .replace_all(&text, |caps: &Captures| {
                self.push_inline(format!("stem:[{}]", escape_brackets(caps[1].trim())))
            })
            .into_owned();
        let text = RE_NOWIKI
            .replace_all(&text, |caps: &Captures| {
                let body = decode_entities(&caps[1]);
                if body.is_empty() {
                    String::new()
                } else {
                    self.push_inline(passthrough(&body))
                }
            })
            .into_owned();
        let text = RE_REF_EMPTY.replace_all(&text, "").into_owned();
        RE_REF
            .replace_all(&text, |caps: &Captures| {
                let note = self.inline(caps[1].trim());
                self.push_inline(format!("footnote:[{}]", escape_brackets(&note)))
            })
            .into_owned()
    }

    fn restore(&self, input: &str) -> String {
        let mut text = input.to_string();
        for _ in 0..=self.stash.len() {
            if !RE_TOKEN.is_match(&text) {
                break;
            }
            text = RE_TOKEN
                .replace_all(&text, |caps: &Captures| {
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
}

/// Wrap `body` in a delimited block whose fence never occurs inside it.
fn delimited_block(fence: &str, body: &str, style: Option<&str>) -> String {
    let mut fence = fence.to_string();
    let ch = fence.chars().next().unwrap_or('-');
    while body.lines().any(|l| l.trim_end() == fence) {
        fence.push(ch);
    }
    let mut out = String::new();
    if let Some(style) = style {
        out.push_str(style);
        out.push('\n');
    }
    out.push_str(&fence);
    out.push('\n');
    out.push_str(body);
    out.push('\n');
    out.push_str(&fence);
    out
}

/// Literal monospace; `adjacent` selects the unconstrained form.
fn literal_monospace(code: &str, adjacent: bool) -> String {
    let fence = if adjacent { "``" } else { "`" };
    if code.contains('+') || code.contains('`') || code.contains('\n') {
        format!("{fence}pass:c[{}]{fence}", escape_brackets(code))
    } else if adjacent {
        format!("``++{code}++``")
    } else {
        format!("`+{code}+`")
    }
}

fn passthrough(text: &str) -> String {
    if text.contains("++") || text.contains('\n') {
        format!("pass:c[{}]", escape_brackets(text))
    } else {
        format!("++{text}++")
    }
}

fn escape_brackets(text: &str) -> String {
    text.replace(']', "\\]")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// `replace_all` whose callback also learns whether the match touches a
/// word character on either side.
fn replace_in_context(
    re: &Regex,
    text: &str,
    mut f: impl FnMut(&Captures, bool) -> String,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        let adjacent = before.is_some_and(is_word) || after.is_some_and(is_word);
        out.push_str(&text[last..m.start()]);
        out.push_str(&f(&caps, adjacent));
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ── Pass 2: blocks ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Blank,
    Para,
    List,
    Block,
}

struct Out {
    lines: Vec<String>,
    last: Kind,
    /// First marker character of the current top-level list.
    list_root: Option<char>,
}

impl Out {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            last: Kind::Blank,
            list_root: None,
        }
    }

    fn blank(&mut self) {
        if self.last != Kind::Blank && !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.last = Kind::Blank;
        self.list_root = None;
    }

    fn block(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.blank();
        self.lines.extend(text.lines().map(str::to_string));
        self.last = Kind::Block;
    }

    fn para(&mut self, line: String) {
        if matches!(self.last, Kind::Block | Kind::List) {
            self.blank();
        }
        self.lines.push(line);
        self.last = Kind::Para;
    }

    fn list_item(&mut self, root: char, line: String) {
        match self.last {
            Kind::Block | Kind::Para => self.blank(),
            Kind::List if self.list_root.is_some_and(|r| r != root) => {
                // Adjacent lists of different types must not merge.
                self.lines.push(String::new());
                self.lines.push("//-".to_string());
                self.lines.push(String::new());
            }
            _ => {}
        }
        self.list_root = Some(root);
        self.lines.push(line);
        self.last = Kind::List;
    }

    /// A line that continues the previous list item.
    fn list_continuation(&mut self, line: String) {
        self.lines.push(line);
        self.last = Kind::List;
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(={1,6})(.*?[^=].*?)(={1,6})\s*$").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-{4,}\s*$").unwrap());
static RE_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([*#:;]+)\s*(.*)$").unwrap());

impl Converter {
    /// Convert a run of lines. `depth` is the table nesting level the text
    /// sits in: 0 at top level, 1 inside a table cell.
    fn convert_blocks(&mut self, text: &str, depth: usize) -> String {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut out = Out::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if matches!(TableLine::classify(line), TableLine::Start(_)) {
                let end = table_end(&lines, i);
                let table = parse_table(&lines[i..end]);
                let rendered = self.render_table(&table, depth);
                out.block(&rendered);
                i = end;
                continue;
            }

            if line.trim().is_empty() {
                out.blank();
                i += 1;
                continue;
            }

            if RE_BLOCK_TOKEN.is_match(line.trim()) {
                out.block(line.trim());
                i += 1;
                continue;
            }

            if line.starts_with(' ') {
                let start = i;
                while i < lines.len() && lines[i].starts_with(' ') && !lines[i].trim().is_empty()
                {
                    i += 1;
                }
                let body: Vec<&str> = lines[start..i].iter().map(|l| &l[1..]).collect();
                let body = decode_entities(&body.join("\n"));
                out.block(&delimited_block("....", &body, None));
                continue;
            }

            if let Some(caps) = RE_HEADING.captures(line) {
                let level = caps[1].len().min(caps[3].len());
                let heading = self.inline(caps[2].trim());
                let marks = "=".repeat((level + 1).min(6));
                out.block(&format!("{marks} {heading}"));
                i += 1;
                continue;
            }

            if RE_RULE.is_match(line) {
                out.block("'''");
                i += 1;
                continue;
            }

            if let Some(caps) = RE_LIST.captures(line) {
                let prefix = &caps[1];
                let body = caps[2].trim();
                self.list_line(&mut out, prefix, body);
                i += 1;
                continue;
            }

            out.para(escape_line_start(&self.inline(line)));
            i += 1;
        }

        out.finish().trim_matches('\n').to_string()
    }

    fn list_line(&mut self, out: &mut Out, prefix: &str, body: &str) {
        let depth = prefix.len();
        let root = prefix.chars().next().unwrap_or('*');
        match prefix.chars().last().unwrap_or('*') {
            '*' | '#' => {
                if body.is_empty() {
                    return;
                }
                let marker: String = if prefix.ends_with('*') {
                    "*".repeat(depth)
                } else {
                    ".".repeat(depth)
                };
                let text = self.inline(body);
                out.list_item(root, format!("{marker} {text}"));
            }
            ';' => {
                let (term, definition) = split_definition(body);
                let marker = ":".repeat(depth + 1);
                let term = escape_line_start(&self.inline(term));
                let line = match definition {
                    Some(d) if !d.is_empty() => format!("{term}{marker} {}", self.inline(d)),
                    _ => format!("{term}{marker}"),
                };
                out.list_item(';', line);
            }
            _ => {
                if body.is_empty() {
                    return;
                }
                let text = self.inline(body);
                if out.last == Kind::List {
                    out.list_continuation(text);
                } else {
                    // Bare indentation: its own paragraph.
                    out.block(&escape_line_start(&text));
                }
            }
        }
    }
}

/// Split `term : definition` at the first colon outside brackets.
fn split_definition(body: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    for (i, c) in body.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ':' if depth <= 0 => return (body[..i].trim(), Some(body[i + 1..].trim())),
            _ => {}
        }
    }
    (body.trim(), None)
}

static RE_LIST_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[*.\-]+|\d+\.|[a-zA-Z]\.|<\d+>)\s").unwrap());
static RE_BLOCK_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\.[^.\s]|=+\s|//|<<<|:[\w-]+!?:(?:\s|$)|(?:NOTE|TIP|IMPORTANT|WARNING|CAUTION):\s)")
        .unwrap()
});

/// Prefix `{empty}` to a paragraph line AsciiDoc would read as block syntax.
fn escape_line_start(line: &str) -> String {
    let trimmed = line.trim_end();
    let delimiter = trimmed.len() >= 4
        && trimmed
            .chars()
            .next()
            .is_some_and(|c| "-=*_+./".contains(c) && trimmed.chars().all(|d| d == c));
    let attribute_line = trimmed.starts_with('[') && trimmed.ends_with(']');
    if delimiter || attribute_line || RE_LIST_LIKE.is_match(line) || RE_BLOCK_LIKE.is_match(line) {
        format!("{{empty}}{line}")
    } else {
        line.to_string()
    }
}

// ── Tables ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Cell {
    header: bool,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
struct Table {
    caption: Option<String>,
    rows: Vec<Vec<Cell>>,
}

/// Index one past the `|}` closing the table opened at `start`.
fn table_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0usize;
    for (i, line) in lines.iter().enumerate().skip(start) {
        match TableLine::classify(line) {
            TableLine::Start(_) => depth += 1,
            TableLine::End => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    lines.len()
}

fn parse_table(lines: &[&str]) -> Table {
    let mut table = Table::default();
    let mut row: Vec<Cell> = Vec::new();
    let mut i = 1;

    while i < lines.len() {
        let line = lines[i];
        match TableLine::classify(line) {
            TableLine::Start(_) => {
                let end = table_end(lines, i);
                if row.is_empty() {
                    row.push(Cell::default());
                }
                if let Some(cell) = row.last_mut() {
                    cell.lines.extend(lines[i..end].iter().map(|l| l.to_string()));
                }
                i = end;
                continue;
            }
            TableLine::End => break,
            TableLine::Row(_) => {
                if !row.is_empty() {
                    table.rows.push(std::mem::take(&mut row));
                }
            }
            TableLine::Caption(rest) => {
                let caption = strip_cell_attributes(rest);
                if !caption.is_empty() {
                    table.caption = Some(caption.to_string());
                }
            }
            TableLine::Header(rest) => {
                for segment in split_cells(rest, true) {
                    row.push(Cell {
                        header: true,
                        lines: vec![strip_cell_attributes(segment).to_string()],
                    });
                }
            }
            TableLine::Data(rest) => {
                for segment in split_cells(rest, false) {
                    row.push(Cell {
                        header: false,
                        lines: vec![strip_cell_attributes(segment).to_string()],
                    });
                }
            }
            TableLine::Text(text) => {
                if row.is_empty() {
                    row.push(Cell::default());
                }
                if let Some(cell) = row.last_mut() {
                    cell.lines.push(text.to_string());
                }
            }
        }
        i += 1;
    }
    if !row.is_empty() {
        table.rows.push(row);
    }
    table
}

impl Converter {
    fn render_table(&mut self, table: &Table, depth: usize) -> String {
        let cols = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        if cols == 0 {
            return String::new();
        }
        if depth >= 2 {
            return self.flatten_table(table);
        }

        let sep = if depth == 0 { '|' } else { '!' };
        let header_row = table.rows[0].iter().all(|c| c.header);
        let mut lines = Vec::new();

        if let Some(caption) = &table.caption {
            lines.push(format!(".{}", self.inline(caption)));
        }
        if header_row {
            lines.push(format!("[%header,cols=\"{cols}*\"]"));
        } else {
            lines.push(format!("[cols=\"{cols}*\"]"));
        }
        lines.push(format!("{sep}==="));

        for (ri, row) in table.rows.iter().enumerate() {
            if ri > 0 {
                lines.push(String::new());
            }
            for cell in row {
                let implicit_header = ri == 0 && header_row;
                lines.push(self.render_cell(cell, implicit_header, sep, depth));
            }
            for _ in row.len()..cols {
                lines.push(sep.to_string());
            }
        }

        lines.push(format!("{sep}==="));
        lines.join("\n")
    }

    fn render_cell(&mut self, cell: &Cell, implicit_header: bool, sep: char, depth: usize) -> String {
        let escaped_sep = format!("\\{sep}");
        if is_complex_cell(cell) {
            let content = cell.lines.join("\n");
            let body = self.convert_blocks(content.trim_matches('\n'), depth + 1);
            let body = self.restore(&body).replace(sep, &escaped_sep);
            return format!("a{sep}{body}");
        }

        let body = cell
            .lines
            .iter()
            .map(|l| self.inline(l.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        // Tokens may hide a separator; resolve them before escaping.
        let body = self.restore(&body).replace(sep, &escaped_sep);
        let style = if cell.header && !implicit_header { "h" } else { "" };
        format!("{style}{sep}{body}").trim_end().to_string()
    }

    /// Tables nested deeper than AsciiDoc allows become plain lines.
    fn flatten_table(&mut self, table: &Table) -> String {
        table
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| self.inline(c.lines.join(" ").trim()))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .collect::<Vec<_>>()
            .join(" +\n")
    }
}

fn is_complex_cell(cell: &Cell) -> bool {
    cell.lines.len() > 1
        && cell.lines.iter().any(|l| {
            let t = l.trim();
            t.is_empty()
                || t.starts_with("{|")
                || t.starts_with(['*', '#', ';', ':'])
                || RE_HEADING.is_match(t)
                || RE_BLOCK_TOKEN.is_match(t)
        })
}

// ── Inline markup ───────────────────────────────────────────────────────────

static RE_BOLD_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:b|strong)(?:\s[^>]*)?>(.*?)</(?:b|strong)\s*>").unwrap()
});
static RE_ITALIC_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:i|em)(?:\s[^>]*)?>(.*?)</(?:i|em)\s*>").unwrap());
static RE_STRIKE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:s|del|strike)(?:\s[^>]*)?>(.*?)</(?:s|del|strike)\s*>").unwrap()
});
static RE_UNDERLINE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:u|ins)(?:\s[^>]*)?>(.*?)</(?:u|ins)\s*>").unwrap());
static RE_SUP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<sup(?:\s[^>]*)?>(.*?)</sup\s*>").unwrap());
static RE_SUB_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<sub(?:\s[^>]*)?>(.*?)</sub\s*>").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</br\s*>").unwrap());
static RE_PRESENTATION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(?:span|div|font|small|big|center|abbr|cite|blockquote|p)(?:\s[^>]*)?>")
        .unwrap()
});
static RE_EXTERNAL_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[((?:https?|ftp)://[^\s\]]+|mailto:[^\s\]]+)(?:\s+([^\]]*))?\]").unwrap()
});

impl Converter {
    fn inline(&mut self, text: &str) -> String {
        let s = RE_BOLD_TAG.replace_all(text, "'''$1'''");
        let s = RE_ITALIC_TAG.replace_all(&s, "''$1''");
        let s = RE_BR.replace_all(&s, HARD_BREAK.to_string().as_str());
        let s = RE_STRIKE_TAG.replace_all(&s, "[.line-through]#$1#");
        let s = RE_UNDERLINE_TAG.replace_all(&s, "[.underline]#$1#");
        let s = RE_SUP_TAG.replace_all(&s, |caps: &Captures| script(&caps[1], '^'));
        let s = RE_SUB_TAG.replace_all(&s, |caps: &Captures| script(&caps[1], '~'));
        let s = RE_PRESENTATION_TAG.replace_all(&s, "");
        let s = RE_EXTERNAL_LINK
            .replace_all(&s, |caps: &Captures| {
                let url = &caps[1];
                let label = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                let link = format!("{url}[{}]", escape_brackets(label));
                self.push_inline(link)
            })
            .into_owned();
        let s = s
            .replace("&nbsp;", "{nbsp}")
            .replace("&ndash;", "\u{2013}")
            .replace("&mdash;", "\u{2014}")
            .replace("&hellip;", "\u{2026}");
        let s = s
            .split('\n')
            .map(emphasis)
            .collect::<Vec<_>>()
            .join("\n");
        s.replace(HARD_BREAK, " +\n")
    }
}

fn script(text: &str, mark: char) -> String {
    if text.is_empty() || text.contains(char::is_whitespace) {
        text.to_string()
    } else {
        format!("{mark}{text}{mark}")
    }
}

/// Rewrite `'''''`, `'''` and `''` pairs on one line.
fn emphasis(line: &str) -> String {
    let s = replace_quote_pairs(line, "'''''", ("*_", "_*"), ("**__", "__**"));
    let s = replace_quote_pairs(&s, "'''", ("*", "*"), ("**", "**"));
    replace_quote_pairs(&s, "''", ("_", "_"), ("__", "__"))
}

/// Replace each `quote … quote` pair, choosing constrained markers unless a
/// word character touches the span from outside.
fn replace_quote_pairs(
    line: &str,
    quote: &str,
    constrained: (&str, &str),
    unconstrained: (&str, &str),
) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find(quote) {
        let after_open = &rest[open + quote.len()..];
        let Some(close) = after_open.find(quote) else {
            break;
        };
        let inner = &after_open[..close];
        let tail = &after_open[close + quote.len()..];

        if inner.trim().is_empty() {
            out.push_str(&rest[..open + quote.len() * 2 + close]);
            rest = tail;
            continue;
        }

        let prefix = &rest[..open];
        let before = prefix.chars().next_back().or_else(|| out.chars().next_back());
        let after = tail.chars().next();
        let touches = before.is_some_and(is_word) || after.is_some_and(is_word);
        let (l, r) = if touches { unconstrained } else { constrained };

        let lead = &inner[..inner.len() - inner.trim_start().len()];
        let trail = &inner[inner.trim_end().len()..];
        out.push_str(prefix);
        out.push_str(lead);
        out.push_str(l);
        out.push_str(inner.trim());
        out.push_str(r);
        out.push_str(trail);
        rest = tail;
    }
    out.push_str(rest);
    out
}
