use serde::{Deserialize, Serialize};

use crate::{Error, FileStore, Result};

/// The file (and optionally line) the editor should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Focus {
	/// Focused file path.
	pub file_path: String,
	/// One-based line to scroll to.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_line: Option<u32>,
}

impl Focus {
	/// Focuses the top of a file.
	pub fn file(path: impl Into<String>) -> Self {
		Self {
			file_path: path.into(),
			start_line: None,
		}
	}

	/// Focuses a specific line of a file.
	pub fn line(path: impl Into<String>, line: u32) -> Self {
		Self {
			file_path: path.into(),
			start_line: Some(line),
		}
	}

	/// Focus on the first file of the store, if any.
	pub fn first_of(files: &FileStore) -> Option<Self> {
		files.first_path().map(Self::file)
	}

	/// Checks that the focused file exists.
	pub fn validate(&self, files: &FileStore) -> Result<()> {
		if files.contains(&self.file_path) {
			Ok(())
		} else {
			Err(Error::UnknownFile(self.file_path.clone()))
		}
	}
}
