//! # taskbridge-codec
//!
//! Text codec for the section-structured TODO document format:
//!
//! ```text
//! ---
//! project: groceries
//! autosync: true
//! ---
//!
//! ## 🔥 Urgent
//!
//! - [ ] Buy milk #errand (due: 2026-03-01)
//! - [~] Call the plumber !high
//! - [x] File taxes (completed: 2026-02-14)
//! ```
//!
//! [`parse`] is tolerant: malformed lines are ignored, never an error.
//! [`serialize`] is deterministic: same task set, same bytes.

pub mod error;
pub mod frontmatter;
pub mod parser;
pub mod serializer;

pub use error::CodecError;
pub use frontmatter::FrontMatter;
pub use parser::{parse, ParsedDocument, ParsedTask, SectionSpan};
pub use serializer::{
    insert_task, remove_line, render_task_line, replace_line, serialize,
    serialize_with_front_matter, validate_rendered, DEFAULT_SECTION,
};
