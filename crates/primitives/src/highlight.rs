//! Positional highlights over playground files.
//!
//! Highlights address text by line and column, so they only stay meaningful
//! while their file is unchanged. [`HighlightSet`] keeps the raw list supplied by
//! the caller and derives the visible subset from the current [`FileStore`]:
//! anything pointing at a dirty file is dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, FileStore, Result};

/// Line/column position. Lines are one-based; a missing column spans the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
	/// One-based line.
	pub line: u32,
	/// Column. `None` spans the whole line.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ch: Option<u32>,
}

impl Position {
	/// Whole-line position.
	pub const fn line(line: u32) -> Self {
		Self { line, ch: None }
	}

	/// Exact line/column position.
	pub const fn at(line: u32, ch: u32) -> Self {
		Self { line, ch: Some(ch) }
	}
}

/// Tooltip attached to a highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
	pub content: String,
	/// CSS-like `key: value` pairs forwarded to the editor collaborator.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub style: BTreeMap<String, String>,
}

/// A colored range in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
	pub file_path: String,
	pub start: Position,
	pub end: Position,
	pub color: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub annotation: Option<Annotation>,
}

impl Highlight {
	/// Highlights whole lines `start..=end`.
	pub fn lines(path: impl Into<String>, start: u32, end: u32, color: impl Into<String>) -> Self {
		Self {
			file_path: path.into(),
			start: Position::line(start),
			end: Position::line(end),
			color: color.into(),
			annotation: None,
		}
	}

	/// Attaches a tooltip.
	pub fn with_annotation(mut self, content: impl Into<String>) -> Self {
		self.annotation = Some(Annotation {
			content: content.into(),
			style: BTreeMap::new(),
		});
		self
	}

	/// Checks the target file exists and the range is well formed.
	pub fn validate(&self, files: &FileStore) -> Result<()> {
		if !files.contains(&self.file_path) {
			return Err(Error::UnknownFile(self.file_path.clone()));
		}
		let invalid = |reason: &str| Error::InvalidHighlight {
			path: self.file_path.clone(),
			reason: reason.to_string(),
		};
		if self.start.line == 0 || self.end.line == 0 {
			return Err(invalid("lines are one-based"));
		}
		if (self.start.line, self.start.ch.unwrap_or(0)) > (self.end.line, self.end.ch.unwrap_or(u32::MAX)) {
			return Err(invalid("range ends before it starts"));
		}
		Ok(())
	}
}

/// Raw highlight list with a dirty-aware derived view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightSet {
	raw: Vec<Highlight>,
}

impl HighlightSet {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Raw highlights as last stored, including ones currently hidden.
	pub fn raw(&self) -> &[Highlight] {
		&self.raw
	}

	/// Replaces the list after validating every entry against `files`.
	///
	/// Entries on dirty files are dropped on the way in. On error the set is
	/// left unchanged.
	pub fn replace(&mut self, highlights: Vec<Highlight>, files: &FileStore) -> Result<()> {
		for highlight in &highlights {
			highlight.validate(files)?;
		}
		self.raw = highlights
			.into_iter()
			.filter(|h| !files.is_dirty(&h.file_path))
			.collect();
		Ok(())
	}

	/// Forgets every highlight on `path`.
	pub fn invalidate(&mut self, path: &str) {
		self.raw.retain(|h| h.file_path != path);
	}

	/// Highlights that can be shown against the current file contents.
	pub fn visible(&self, files: &FileStore) -> Vec<Highlight> {
		self.raw
			.iter()
			.filter(|h| {
				if !files.contains(&h.file_path) {
					warn!(path = %h.file_path, "highlight references a missing file");
					return false;
				}
				!files.is_dirty(&h.file_path)
			})
			.cloned()
			.collect()
	}
}
