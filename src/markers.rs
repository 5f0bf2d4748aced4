//! Intermediate link/image markers.
//!
//! The normaliser swaps every internal link and image embed for an opaque
//! token such as `XWLINK0003X` and records what it stood for in a
//! [`MarkerTable`]. Tokens are purely alphanumeric, so any engine passes
//! them through as ordinary words; the postprocessor then swaps them for
//! AsciiDoc macros once page paths are known.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches any marker token. Group 1 is the kind, group 2 the index.
pub static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"XW(LINK|IMG)(\d{4,})X").unwrap());

/// What an internal link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Another wiki page (possibly with a `#fragment`).
    Page,
    /// The raw file behind a `Media:` link.
    Media,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMarker {
    pub kind: LinkKind,
    /// Target title, `#fragment` included, namespace kept.
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMarker {
    /// File name without the `File:` prefix.
    pub file: String,
    pub caption: Option<String>,
    pub alt: Option<String>,
    /// Width in pixels, from `200px` or `200x100px`.
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerTable {
    pub links: Vec<LinkMarker>,
    pub images: Vec<ImageMarker>,
}

impl MarkerTable {
    /// Record a link and return the token standing in for it.
    pub fn push_link(&mut self, link: LinkMarker) -> String {
        self.links.push(link);
        link_token(self.links.len() - 1)
    }

    /// Record an image and return the token standing in for it.
    pub fn push_image(&mut self, image: ImageMarker) -> String {
        self.images.push(image);
        image_token(self.images.len() - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.images.is_empty()
    }
}

pub fn link_token(index: usize) -> String {
    format!("XWLINK{index:04}X")
}

pub fn image_token(index: usize) -> String {
    format!("XWIMG{index:04}X")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_regex() {
        let mut table = MarkerTable::default();
        let link = table.push_link(LinkMarker {
            kind: LinkKind::Page,
            target: "Setup".into(),
            label: "setup guide".into(),
        });
        let image = table.push_image(ImageMarker {
            file: "Logo.png".into(),
            caption: None,
            alt: None,
            width: None,
        });
        assert_eq!(link, "XWLINK0000X");
        assert_eq!(image, "XWIMG0000X");

        let text = format!("see {link}, then {image}");
        let found: Vec<(String, usize)> = RE_MARKER
            .captures_iter(&text)
            .map(|c| (c[1].to_string(), c[2].parse().unwrap()))
            .collect();
        assert_eq!(found, vec![("LINK".into(), 0), ("IMG".into(), 0)]);
    }

    #[test]
    fn tokens_are_alphanumeric() {
        assert!(link_token(12345).chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(RE_MARKER.is_match(&link_token(12345)));
    }
}
