//! Language backend adapters for the Cannon playground runtime.
//!
//! Every execution engine sits behind the same two traits:
//! - [`Backend`]: boots an engine for a [`LanguageDescriptor`] and returns a live handle.
//! - [`BackendHandle`]: executes the current file set and streams output, then tears down.
//!
//! Four adapters are provided:
//! - [`remote::RemoteBackend`]: POSTs files to a sandboxed compile/run service and
//!   streams the response body.
//! - [`bundler::BundlerBackend`]: drives a JS bundler sandbox client.
//! - [`container::ContainerBackend`]: mounts files into a Node-like process container
//!   shared between sessions.
//! - [`interpreter::InterpreterBackend`]: runs a single source file on a shared,
//!   lazily-loaded Python interpreter.
//!
//! The engines themselves are consumed through host traits ([`bundler::SandboxHost`],
//! [`container::ContainerHost`], [`interpreter::InterpreterLoader`],
//! [`remote::RunnerTransport`]), so embedders plug in whatever actually runs the code.
#![warn(missing_docs)]

mod backend;
mod decode;
mod descriptor;
mod shared;

pub mod bundler;
pub mod container;
pub mod interpreter;
pub mod remote;

pub use backend::{Backend, BackendHandle, Backends, BootContext, Execution, OutputSink, OutputStream};
pub use decode::Utf8StreamDecoder;
pub use descriptor::{
	BackendKind, BundlerConfig, ContainerConfig, ImageBuilder, InterpreterConfig, Language, LanguageDescriptor,
	RemoteConfig, RemoteOptions,
};
pub use shared::{Retention, SharedLease, SharedRuntime};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible adapter errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The language descriptor is missing or has invalid fields.
	#[error("invalid configuration: {0}")]
	Config(String),
	/// No adapter was registered for the descriptor's backend kind.
	#[error("no backend registered for {0}")]
	BackendUnavailable(BackendKind),
	/// The backend only runs a single source file.
	#[error("only one file supported, got {0}")]
	UnsupportedFileCount(usize),
	/// The engine failed to come up.
	#[error("boot failed: {0}")]
	Boot(String),
	/// Network-level failure talking to a remote runner.
	#[error("transport error: {0}")]
	Transport(String),
	/// The remote runner answered with a non-success status.
	#[error("runner responded with status {status}: {body}")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, possibly empty.
		body: String,
	},
	/// A process inside the engine exited unsuccessfully.
	#[error("`{command}` exited with code {code}")]
	ExitCode {
		/// Command line that was run.
		command: String,
		/// Process exit code.
		code: i32,
	},
	/// The engine reported an error while running user code.
	#[error("{0}")]
	Runtime(String),
	/// The engine went away mid-run.
	#[error("backend stopped")]
	Stopped,
	/// Request encoding failed.
	#[error("serialization failed: {0}")]
	Serialize(#[from] serde_json::Error),
}

impl Error {
	/// Returns true for failures that belong in the output channel, after which
	/// the session may simply run again. Everything else is a configuration or
	/// usage error that must be surfaced to the caller.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			Self::Transport(_) | Self::Status { .. } | Self::ExitCode { .. } | Self::Runtime(_) | Self::Stopped
		)
	}
}

