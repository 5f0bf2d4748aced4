//! Small MediaWiki syntax helpers shared by the normaliser and the native
//! engine.

/// Canonical display form of a page title.
///
/// Underscores become spaces, runs of whitespace collapse, and the first
/// character is upper-cased the way MediaWiki does for most namespaces.
/// A leading `:` is stripped.
pub fn canonical_title(title: &str) -> String {
    let spaced = title.trim().trim_start_matches(':').replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Title as it appears in a request URL: spaces become underscores.
pub fn wire_title(title: &str) -> String {
    canonical_title(title).replace(' ', "_")
}

/// Split a `name:rest` title into a lower-cased namespace and the remainder.
pub fn split_namespace(title: &str) -> Option<(String, &str)> {
    let (ns, rest) = title.split_once(':')?;
    let ns = ns.trim();
    if ns.is_empty() || ns.contains(['[', ']', '{', '}', '|']) {
        return None;
    }
    Some((ns.to_ascii_lowercase(), rest.trim()))
}

/// Byte offset of the `close` that balances an already-consumed `open`.
///
/// Nested `open`/`close` pairs are skipped. With `single_line`, a newline
/// before the closing delimiter means there is no match.
pub fn find_closing(text: &str, open: &str, close: &str, single_line: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if single_line && bytes[i] == b'\n' {
            return None;
        }
        if text[i..].starts_with(open) {
            depth += 1;
            i += open.len();
        } else if text[i..].starts_with(close) {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
            i += close.len();
        } else {
            i += 1;
            while i < bytes.len() && !text.is_char_boundary(i) {
                i += 1;
            }
        }
    }
    None
}

// ── Tables ──────────────────────────────────────────────────────────────────

/// One line of a wiki table, classified by its leading token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLine<'a> {
    /// `{| attrs`
    Start(&'a str),
    /// `|}`
    End,
    /// `|- attrs`
    Row(&'a str),
    /// `|+ caption`
    Caption(&'a str),
    /// `! a !! b`
    Header(&'a str),
    /// `| a || b`
    Data(&'a str),
    /// Anything else: continuation of the previous cell.
    Text(&'a str),
}

impl<'a> TableLine<'a> {
    pub fn classify(line: &'a str) -> Self {
        let t = line.trim_start();
        if let Some(rest) = t.strip_prefix("{|") {
            TableLine::Start(rest)
        } else if t.starts_with("|}") {
            TableLine::End
        } else if let Some(rest) = t.strip_prefix("|-") {
            TableLine::Row(rest)
        } else if let Some(rest) = t.strip_prefix("|+") {
            TableLine::Caption(rest)
        } else if let Some(rest) = t.strip_prefix('!') {
            TableLine::Header(rest)
        } else if let Some(rest) = t.strip_prefix('|') {
            TableLine::Data(rest)
        } else {
            TableLine::Text(line)
        }
    }
}

/// Split the remainder of a cell line into cell segments.
///
/// Data lines separate cells with `||`; header lines accept `!!` as well.
/// `||` inside a nested `[[…]]` or `{{…}}` does not split.
pub fn split_cells(rest: &str, header: bool) -> Vec<&str> {
    let bytes = rest.as_bytes();
    let mut cells = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let pair = &bytes[i..(i + 2).min(bytes.len())];
        match pair {
            b"[[" | b"{{" => {
                depth += 1;
                i += 2;
            }
            b"]]" | b"}}" => {
                depth = (depth - 1).max(0);
                i += 2;
            }
            b"||" if depth == 0 => {
                cells.push(&rest[start..i]);
                i += 2;
                start = i;
            }
            b"!!" if header && depth == 0 => {
                cells.push(&rest[start..i]);
                i += 2;
                start = i;
            }
            _ => i += 1,
        }
    }
    cells.push(&rest[start..]);
    cells
}

/// Drop a leading `attrs |` from one cell segment, returning trimmed content.
pub fn strip_cell_attributes(segment: &str) -> &str {
    let bytes = segment.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        let pair = &bytes[i..(i + 2).min(bytes.len())];
        match pair {
            b"[[" | b"{{" => {
                depth += 1;
                i += 2;
                continue;
            }
            b"]]" | b"}}" => {
                depth = (depth - 1).max(0);
                i += 2;
                continue;
            }
            _ => {}
        }
        if bytes[i] == b'|' && depth == 0 {
            return segment[i + 1..].trim();
        }
        i += 1;
    }
    segment.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_titles() {
        assert_eq!(canonical_title("main_page"), "Main page");
        assert_eq!(canonical_title("  Foo   Bar "), "Foo Bar");
        assert_eq!(canonical_title(":Category:X"), "Category:X");
        assert_eq!(canonical_title(""), "");
        assert_eq!(wire_title("main page"), "Main_page");
    }

    #[test]
    fn namespaces() {
        assert_eq!(
            split_namespace("File:Logo.png"),
            Some(("file".to_string(), "Logo.png"))
        );
        assert_eq!(split_namespace("Plain"), None);
        assert_eq!(split_namespace(":x"), None);
    }

    #[test]
    fn closing_skips_nested_pairs() {
        let s = "File:a.png|see [[B]]]] tail";
        assert_eq!(find_closing(s, "[[", "]]", true), Some(20));
        assert_eq!(find_closing("a\nb]]", "[[", "]]", true), None);
        assert_eq!(find_closing("a\nb]]", "[[", "]]", false), Some(3));
        assert_eq!(find_closing("héllo}}", "{{", "}}", false), Some(6));
    }

    #[test]
    fn classify_table_lines() {
        assert_eq!(TableLine::classify("{| class=\"x\""), TableLine::Start(" class=\"x\""));
        assert_eq!(TableLine::classify("  |}"), TableLine::End);
        assert_eq!(TableLine::classify("|- style=\"a\""), TableLine::Row(" style=\"a\""));
        assert_eq!(TableLine::classify("|+ Cap"), TableLine::Caption(" Cap"));
        assert_eq!(TableLine::classify("! H"), TableLine::Header(" H"));
        assert_eq!(TableLine::classify("| a"), TableLine::Data(" a"));
        assert_eq!(TableLine::classify("more"), TableLine::Text("more"));
    }

    #[test]
    fn cells_split_and_strip() {
        assert_eq!(split_cells(" a || b ||c", false), vec![" a ", " b ", "c"]);
        assert_eq!(split_cells(" a !! b || c", true), vec![" a ", " b ", " c"]);
        assert_eq!(split_cells(" a !! b", false), vec![" a !! b"]);
        assert_eq!(split_cells(" [[A|B]] || c", false), vec![" [[A|B]] ", " c"]);
        assert_eq!(strip_cell_attributes(" style=\"x\" | text "), "text");
        assert_eq!(strip_cell_attributes(" [[A|B]] "), "[[A|B]]");
        assert_eq!(strip_cell_attributes(" plain "), "plain");
    }
}
