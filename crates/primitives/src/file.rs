use indexmap::IndexMap;

use crate::{Error, Result};

/// One editable source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
	path: String,
	content: String,
	dirty: bool,
	editable: bool,
}

impl File {
	/// Creates a clean, editable file.
	pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			content: content.into(),
			dirty: false,
			editable: true,
		}
	}

	/// Creates a clean file that rejects edits.
	pub fn read_only(path: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			editable: false,
			..Self::new(path, content)
		}
	}

	/// Path within the playground.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Current text.
	pub fn content(&self) -> &str {
		&self.content
	}

	/// Returns true once the file was edited after its last commit.
	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Returns false for files the editor must not change.
	pub fn is_editable(&self) -> bool {
		self.editable
	}
}

/// Path-keyed file collection. Iteration follows insertion order, which is
/// also the display order of editor tabs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStore {
	files: IndexMap<String, File>,
}

impl FileStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of files.
	pub fn len(&self) -> usize {
		self.files.len()
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	/// Looks up one file.
	pub fn get(&self, path: &str) -> Option<&File> {
		self.files.get(path)
	}

	pub fn contains(&self, path: &str) -> bool {
		self.files.contains_key(path)
	}

	/// Iterates files in display order.
	pub fn iter(&self) -> impl Iterator<Item = &File> {
		self.files.values()
	}

	/// Iterates paths in display order.
	pub fn paths(&self) -> impl Iterator<Item = &str> {
		self.files.keys().map(String::as_str)
	}

	/// First path in display order.
	pub fn first_path(&self) -> Option<&str> {
		self.files.keys().next().map(String::as_str)
	}

	/// Inserts or replaces a file, keeping its original position if it existed.
	pub fn insert(&mut self, file: File) {
		self.files.insert(file.path.clone(), file);
	}

	/// Applies an edit. Unknown paths are appended as new dirty files.
	pub fn update(&mut self, path: &str, content: impl Into<String>) -> Result<()> {
		match self.files.get_mut(path) {
			Some(file) if !file.editable => Err(Error::ReadOnly(path.to_string())),
			Some(file) => {
				file.content = content.into();
				file.dirty = true;
				Ok(())
			}
			None => {
				let mut file = File::new(path, content);
				file.dirty = true;
				self.insert(file);
				Ok(())
			}
		}
	}

	/// Removes a file. The last remaining file cannot be removed.
	pub fn remove(&mut self, path: &str) -> Result<File> {
		if !self.files.contains_key(path) {
			return Err(Error::UnknownFile(path.to_string()));
		}
		if self.files.len() == 1 {
			return Err(Error::LastFile(path.to_string()));
		}
		self.files
			.shift_remove(path)
			.ok_or_else(|| Error::UnknownFile(path.to_string()))
	}

	/// Returns true when `path` exists and carries uncommitted edits.
	pub fn is_dirty(&self, path: &str) -> bool {
		self.files.get(path).is_some_and(File::is_dirty)
	}

	/// Paths with uncommitted edits, in display order.
	pub fn dirty_paths(&self) -> impl Iterator<Item = &str> {
		self.files.values().filter(|f| f.dirty).map(|f| f.path.as_str())
	}

	/// Plain `path -> content` view, as sent over the wire and stored in snapshots.
	pub fn contents(&self) -> IndexMap<String, String> {
		self.files
			.values()
			.map(|f| (f.path.clone(), f.content.clone()))
			.collect()
	}

	/// Like [`Self::contents`], restricted to dirty files.
	pub fn dirty_contents(&self) -> IndexMap<String, String> {
		self.files
			.values()
			.filter(|f| f.dirty)
			.map(|f| (f.path.clone(), f.content.clone()))
			.collect()
	}

	/// Clears the dirty flag of every file whose content still matches what was
	/// committed. Files edited again since the commit stay dirty.
	pub fn mark_committed(&mut self, committed: &IndexMap<String, String>) -> usize {
		let mut cleared = 0;
		for (path, content) in committed {
			if let Some(file) = self.files.get_mut(path)
				&& file.dirty
				&& file.content == *content
			{
				file.dirty = false;
				cleared += 1;
			}
		}
		cleared
	}
}

impl<P, C> FromIterator<(P, C)> for FileStore
where
	P: Into<String>,
	C: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
		let mut store = Self::new();
		for (path, content) in iter {
			store.insert(File::new(path, content));
		}
		store
	}
}
