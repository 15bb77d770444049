//! Serializable session snapshots.

use cannon_primitives::{FileStore, Focus};
use cannon_runner::LanguageDescriptor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors decoding a snapshot document.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
	/// The text is not JSON.
	#[error("snapshot is not valid JSON: {0}")]
	Json(#[source] serde_json::Error),
	/// The document is not a JSON object.
	#[error("snapshot must be a JSON object")]
	NotAnObject,
	/// A required field is absent.
	#[error("snapshot is missing `{0}`")]
	Missing(&'static str),
	/// A field that must be an object is something else.
	#[error("snapshot field `{0}` must be an object")]
	NotObject(&'static str),
	/// `files` is an empty object.
	#[error("snapshot has no files")]
	NoFiles,
	/// The fields are present but do not decode.
	#[error("invalid snapshot: {0}")]
	Invalid(#[source] serde_json::Error),
}

/// Everything needed to recreate a session: descriptor, files, focus and
/// output. Dirty flags and backend handles are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
	/// Language descriptor.
	pub language_props: LanguageDescriptor,
	/// `path -> content`, in display order.
	pub files: IndexMap<String, String>,
	/// Active file and line.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub focus: Option<Focus>,
	/// Output buffer.
	#[serde(default)]
	pub output: String,
}

impl Snapshot {
	/// Decodes a snapshot, checking its shape before decoding the fields so
	/// that errors name what is wrong.
	pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
		let value: Value = serde_json::from_str(text).map_err(SnapshotError::Json)?;
		let object = value.as_object().ok_or(SnapshotError::NotAnObject)?;
		for field in ["languageProps", "files"] {
			match object.get(field) {
				None | Some(Value::Null) => return Err(SnapshotError::Missing(field)),
				Some(Value::Object(_)) => {}
				Some(_) => return Err(SnapshotError::NotObject(field)),
			}
		}
		let snapshot: Self = serde_json::from_value(value).map_err(SnapshotError::Invalid)?;
		if snapshot.files.is_empty() {
			return Err(SnapshotError::NoFiles);
		}
		Ok(snapshot)
	}

	/// Pretty-printed JSON.
	pub fn to_json(&self) -> Result<String, SnapshotError> {
		serde_json::to_string_pretty(self).map_err(SnapshotError::Invalid)
	}

	/// Files as a clean store.
	pub fn file_store(&self) -> FileStore {
		self.files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect()
	}
}
