//! Playground session runtime.
//!
//! A [`Session`] owns the files, focus and highlights of one playground, boots
//! the language backend selected by its descriptor, and runs the files on it.
//! Output is accumulated into a buffer and republished on an [`EventBus`] that
//! viewers such as [`TerminalView`] subscribe to.
#![warn(missing_docs)]

pub mod config;
mod events;
mod session;
mod snapshot;
mod status;
pub mod templates;
mod terminal;

pub use config::{ConfigError, PlaygroundConfig};
pub use events::{EventBus, EventKind, SessionEvent, Subscriber, Subscription};
pub use session::{ResetRequest, Session, SessionInit};
pub use snapshot::{Snapshot, SnapshotError};
pub use status::SessionStatus;
pub use terminal::{TerminalOptions, TerminalView, render_output};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by session commands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A file, focus or highlight invariant was violated.
	#[error(transparent)]
	Files(#[from] cannon_primitives::Error),
	/// The backend rejected the configuration or failed.
	#[error(transparent)]
	Backend(#[from] cannon_runner::Error),
	/// `run` was called while a run is in flight.
	#[error("already running")]
	AlreadyRunning,
	/// The command needs a booted backend.
	#[error("session is not ready (status: {0})")]
	NotReady(SessionStatus),
	/// No backend handle is live.
	#[error("no active backend handle")]
	NoActiveHandle,
}
