//! Pipeline stages for wiki-to-AsciiDoc conversion.
//!
//! Each submodule implements exactly one transformation step and is
//! independently testable. Only [`fetch`], [`adapter`] and [`write`] touch
//! the outside world; [`normalize`] and [`postprocess`] are pure.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ normalize ──▶ adapter ──▶ postprocess ──▶ write
//! (HTTP)     (wikitext)    (engine)    (cleanup)      (.adoc)
//! ```
//!
//! 1. [`fetch`]      : resolve a title or URL and retrieve raw markup
//! 2. [`normalize`]  : rewrite constructs the engine mishandles into
//!    core syntax plus opaque link/image markers
//! 3. [`adapter`]    : run the conversion engine with timeout and retry
//! 4. [`postprocess`]: resolve markers, insert the header, fix headings
//!    and spacing
//! 5. [`write`]      : persist one file per page, atomically

pub mod adapter;
pub mod fetch;
pub mod normalize;
pub mod postprocess;
pub mod write;
