//! Core playground types: the in-memory file store, editor focus, and
//! dirty-aware highlights.

/// Error type shared by the primitive collections.
pub mod error;
/// Insertion-ordered file collection with dirty tracking.
pub mod file;
/// Active file/line tracking.
pub mod focus;
/// Positional highlights derived from the file store.
pub mod highlight;

pub use error::{Error, Result};
pub use file::{File, FileStore};
pub use focus::Focus;
pub use highlight::{Annotation, Highlight, HighlightSet, Position};
