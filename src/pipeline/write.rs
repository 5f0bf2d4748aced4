//! Output writer: one `.adoc` file per converted page.
//!
//! Page titles map to relative paths through [`page_components`]. The same
//! mapping is used by the postprocessor to build cross-references, so a link
//! to `Setup/Linux` always points at the file the writer produces for it.
//!
//! Sanitising can map distinct titles to one path (`A:B` and `A B`). A
//! [`PathRegistry`] shared by a run hands the second title a numbered name.

use crate::config::FileNaming;
use crate::error::WriteError;
use crate::output::FinalDocument;
use crate::wikitext::canonical_title;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Characters that are unsafe in file names on at least one platform.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\'];

pub const EXTENSION: &str = "adoc";

/// Sanitise one path component of a title.
pub fn sanitize_component(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    let mut last_underscore = false;
    for c in component.trim().chars() {
        let c = if FORBIDDEN.contains(&c) || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        out.push(c);
    }
    match out.as_str() {
        "" => "untitled".to_string(),
        "." | ".." => out.replace('.', "_"),
        _ => out,
    }
}

/// Sanitised path components for a title; subpages become directories.
pub fn page_components(title: &str) -> Vec<String> {
    let canonical = canonical_title(title);
    let parts: Vec<String> = canonical
        .split('/')
        .filter(|p| !p.trim().is_empty())
        .map(sanitize_component)
        .collect();
    if parts.is_empty() {
        vec!["untitled".to_string()]
    } else {
        parts
    }
}

/// Path of a page's file relative to the output directory.
pub fn page_path(title: &str) -> PathBuf {
    let components = page_components(title);
    let mut path = PathBuf::new();
    for (i, part) in components.iter().enumerate() {
        if i + 1 == components.len() {
            path.push(format!("{part}.{EXTENSION}"));
        } else {
            path.push(part);
        }
    }
    path
}

/// Output path under `naming`; a page without an id keeps its title path.
pub fn document_path(naming: FileNaming, title: &str, page_id: Option<u64>) -> PathBuf {
    match (naming, page_id) {
        (FileNaming::PageId, Some(id)) => PathBuf::from(format!("{id}.{EXTENSION}")),
        _ => page_path(title),
    }
}

/// `Guide/A_B.adoc` → `Guide/A_B_2.adoc` for `n = 2`.
fn numbered_path(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_{n}.{EXTENSION}"))
}

/// Output paths handed out in one run, keyed case-insensitively so the
/// result also holds on case-folding file systems.
#[derive(Debug, Default)]
pub struct PathRegistry {
    owners: Mutex<HashMap<String, String>>,
}

impl PathRegistry {
    fn key(path: &Path) -> String {
        path.to_string_lossy().to_lowercase()
    }

    /// Hold `path` for `title` unless another title already holds it.
    pub fn reserve(&self, path: &Path, title: &str) {
        let mut owners = self.lock();
        owners
            .entry(Self::key(path))
            .or_insert_with(|| title.to_string());
    }

    /// The path `title` writes to: `path` itself when free or already held
    /// by `title`, otherwise the first free numbered variant.
    pub fn claim(&self, path: &Path, title: &str) -> PathBuf {
        let mut owners = self.lock();
        let mut candidate = path.to_path_buf();
        let mut n = 1;
        loop {
            match owners.get(&Self::key(&candidate)) {
                Some(owner) if owner != title => {
                    n += 1;
                    candidate = numbered_path(path, n);
                }
                Some(_) => return candidate,
                None => {
                    owners.insert(Self::key(&candidate), title.to_string());
                    return candidate;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.owners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Forward-slash path from the page `from` to the page `to`, without extension.
///
/// Both sides go through [`page_components`], so the result is valid inside
/// the tree the writer produces.
pub fn relative_link(from: &str, to: &str) -> String {
    let from = page_components(from);
    let to = page_components(to);
    let from_dirs = &from[..from.len() - 1];
    let common = from_dirs
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(to.len() - 1);

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat("..").take(from_dirs.len() - common));
    parts.extend(to[common..].iter().map(String::as_str));
    parts.join("/")
}

/// Write `doc` to `relative` under `out_dir`, replacing any previous file
/// atomically.
///
/// The text goes to a temporary file in the target directory which is then
/// renamed over the destination, so readers never see a partial document.
pub async fn write_document(
    out_dir: &Path,
    relative: &Path,
    doc: &FinalDocument,
) -> Result<PathBuf, WriteError> {
    let path = out_dir.join(relative);
    let fail = |reason: String| WriteError {
        path: path.clone(),
        reason,
    };

    let parent = path.parent().unwrap_or(out_dir).to_path_buf();
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| fail(format!("cannot create directory: {e}")))?;

    let target = path.clone();
    let contents = doc.asciidoc.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| fail(format!("writer task failed: {e}")))?
    .map_err(|e| fail(e.to_string()))?;

    debug!(path = %path.display(), bytes = doc.asciidoc.len(), "written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Getting Started"), "Getting_Started");
        assert_eq!(sanitize_component("C++ <fast>?"), "C++_fast_");
        assert_eq!(sanitize_component("a  \t b"), "a_b");
        assert_eq!(sanitize_component("Help:Contents"), "Help_Contents");
        assert_eq!(sanitize_component(".."), "__");
        assert_eq!(sanitize_component(""), "untitled");
        assert_eq!(sanitize_component("x\u{7}y"), "x_y");
    }

    #[test]
    fn test_page_path_subpages() {
        assert_eq!(page_path("Intro"), PathBuf::from("Intro.adoc"));
        assert_eq!(
            page_path("Guide/Install notes"),
            PathBuf::from("Guide").join("Install_notes.adoc")
        );
        assert_eq!(page_path("main_page"), PathBuf::from("Main_page.adoc"));
        assert_eq!(page_path("/"), PathBuf::from("untitled.adoc"));
    }

    #[test]
    fn test_document_path_naming() {
        assert_eq!(
            document_path(FileNaming::Title, "Guide/Install", Some(7)),
            PathBuf::from("Guide").join("Install.adoc")
        );
        assert_eq!(
            document_path(FileNaming::PageId, "Guide/Install", Some(7)),
            PathBuf::from("7.adoc")
        );
        assert_eq!(
            document_path(FileNaming::PageId, "Intro", None),
            PathBuf::from("Intro.adoc")
        );
    }

    #[test]
    fn test_colliding_titles_get_numbered_paths() {
        let registry = PathRegistry::default();
        let shared = page_path("A:B");
        assert_eq!(shared, page_path("A B"));

        registry.reserve(&shared, "A:B");
        // The reserving title keeps the plain name, however often it asks.
        assert_eq!(registry.claim(&shared, "A:B"), shared);
        assert_eq!(registry.claim(&shared, "A:B"), shared);
        assert_eq!(registry.claim(&shared, "A B"), PathBuf::from("A_B_2.adoc"));
        assert_eq!(registry.claim(&shared, "A B"), PathBuf::from("A_B_2.adoc"));
        assert_eq!(registry.claim(&shared, "A?B"), PathBuf::from("A_B_3.adoc"));

        // Case-folding file systems see these as one file.
        let nested = page_path("Guide/ab");
        registry.reserve(&nested, "Guide/ab");
        assert_eq!(
            registry.claim(&page_path("Guide/AB"), "Guide/AB"),
            PathBuf::from("Guide").join("AB_2.adoc")
        );
    }

    #[test]
    fn test_relative_link() {
        assert_eq!(relative_link("Intro", "Setup"), "Setup");
        assert_eq!(relative_link("Guide/Install", "Guide/Usage"), "Usage");
        assert_eq!(relative_link("Guide/Install", "Setup"), "../Setup");
        assert_eq!(relative_link("Intro", "Guide/Usage"), "Guide/Usage");
        assert_eq!(relative_link("A/B/C", "A/D"), "../D");
        assert_eq!(relative_link("Guide", "Guide/Usage"), "Guide/Usage");
    }

    #[tokio::test]
    async fn test_write_creates_dirs_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let doc = FinalDocument {
            title: "Guide/Install".into(),
            asciidoc: "= Install\n".into(),
        };
        let path = write_document(dir.path(), &page_path(&doc.title), &doc)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("Guide").join("Install.adoc"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "= Install\n");

        let doc = FinalDocument {
            asciidoc: "= Install\n\nv2\n".into(),
            ..doc
        };
        write_document(dir.path(), &page_path(&doc.title), &doc)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "= Install\n\nv2\n");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("Guide"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the subpage directory should go.
        std::fs::write(dir.path().join("Guide"), "x").unwrap();
        let doc = FinalDocument {
            title: "Guide/Install".into(),
            asciidoc: "= Install\n".into(),
        };
        let err = write_document(dir.path(), &page_path(&doc.title), &doc)
            .await
            .unwrap_err();
        assert_eq!(err.path, dir.path().join("Guide").join("Install.adoc"));
    }
}
