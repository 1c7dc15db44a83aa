//! Open documents, their versions and everything compiled from them.
//!
//! Every document gets a slot of [`MAX_DOC`] positions in a global position space shared by
//! the whole cache, so a single `usize` identifies a location in any open document. Positions
//! inside a slot are `base + byte_offset + 1`; `base` itself is never a valid position.

mod compile;
mod document;
pub mod position;
mod store;
mod version;
pub mod yaml;

pub use document::{Document, Language, Query, YamlDoc};
pub use position::LineIndex;
pub use store::DocumentCache;
pub use version::VersionContext;

/// Largest accepted document, in bytes.
pub const MAX_DOC: usize = 1_000_000;
