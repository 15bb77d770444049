/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Invariant violations raised by the file, focus, and highlight collections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A path was referenced that is not part of the file store.
	#[error("no file named `{0}`")]
	UnknownFile(String),
	/// An edit targeted a file marked as not editable.
	#[error("file `{0}` is read-only")]
	ReadOnly(String),
	/// The only remaining file cannot be deleted.
	#[error("cannot delete `{0}`: a playground needs at least one file")]
	LastFile(String),
	/// A playground was given an empty file set.
	#[error("a playground needs at least one file")]
	NoFiles,
	/// A highlight range is malformed.
	#[error("invalid highlight on `{path}`: {reason}")]
	InvalidHighlight {
		/// File the highlight points at.
		path: String,
		/// What is wrong with it.
		reason: String,
	},
}
