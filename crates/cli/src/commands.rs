//! Subcommand implementations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cannon_primitives::Focus;
use cannon_runner::remote::RemoteBackend;
use cannon_runner::{Backends, BundlerConfig, ContainerConfig, InterpreterConfig, Language, LanguageDescriptor};
use cannon_session::{PlaygroundConfig, Session, SessionInit, Snapshot, SnapshotError, TerminalOptions, TerminalView};
use parking_lot::Mutex;
use tracing::debug;

/// Surface name used by starter snapshots of browser-hosted languages.
const DEFAULT_SURFACE: &str = "preview";

/// Errors surfaced by the command line.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
	/// Error reading or writing a snapshot file.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// File that failed.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
	/// Snapshot decode or encode failure.
	#[error(transparent)]
	Snapshot(#[from] SnapshotError),
	/// Invalid descriptor or unavailable backend.
	#[error(transparent)]
	Runner(#[from] cannon_runner::Error),
	/// The session rejected a command or failed to boot.
	#[error(transparent)]
	Session(#[from] cannon_session::Error),
}

type Printer = Arc<dyn Fn(&str) + Send + Sync>;

/// Starter snapshot for `language`.
pub fn template_snapshot(language: Language, runner_url: Option<String>) -> Result<Snapshot, CliError> {
	let template = cannon_session::templates::template(language)?;
	let language_props = match language {
		Language::Rust | Language::Go | Language::MaelstromGo => {
			LanguageDescriptor::remote(language, runner_url.unwrap_or_default())?
		}
		Language::Javascript => LanguageDescriptor::Javascript(BundlerConfig {
			surface: DEFAULT_SURFACE.into(),
			..Default::default()
		}),
		Language::JavascriptWebcontainer => LanguageDescriptor::JavascriptWebcontainer(ContainerConfig {
			surface: DEFAULT_SURFACE.into(),
			..Default::default()
		}),
		Language::Python => LanguageDescriptor::Python(InterpreterConfig::default()),
	};
	let focus = Focus::first_of(&template.file_store());
	Ok(Snapshot {
		language_props,
		files: template.files,
		focus,
		output: template.output.unwrap_or_default(),
	})
}

/// Reads and decodes a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, CliError> {
	let text = std::fs::read_to_string(path).map_err(|error| CliError::Io {
		path: path.to_path_buf(),
		error,
	})?;
	Ok(Snapshot::from_json(&text)?)
}

/// Writes `snapshot` as pretty JSON.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), CliError> {
	std::fs::write(path, snapshot.to_json()?).map_err(|error| CliError::Io {
		path: path.to_path_buf(),
		error,
	})
}

/// Applies the endpoint override and configuration defaults to a remote
/// descriptor. Languages needing a browser host are refused.
pub fn prepare_descriptor(
	descriptor: &mut LanguageDescriptor,
	config: &PlaygroundConfig,
	runner_url: Option<String>,
) -> Result<(), cannon_runner::Error> {
	let language = descriptor.language();
	let Some(remote) = descriptor.as_remote_mut() else {
		return Err(cannon_runner::Error::Config(format!(
			"{language} needs a browser host and cannot run from the command line"
		)));
	};
	if let Some(url) = runner_url {
		remote.runner_url = url;
	}
	config.apply(descriptor);
	descriptor.validate()
}

/// Backends available outside a browser host.
pub fn remote_backends() -> Result<Backends, cannon_runner::Error> {
	Ok(Backends::new().with(Arc::new(RemoteBackend::http()?)))
}

/// Prints rendered output to stdout as it arrives.
pub fn stdout_printer() -> impl Fn(&str) + Send + Sync + 'static {
	|text: &str| {
		let mut out = std::io::stdout().lock();
		// A closed stdout only loses display text.
		let _ = out.write_all(text.as_bytes());
		let _ = out.flush();
	}
}

/// Boots a session from `snapshot`, runs it once and returns the updated
/// snapshot.
///
/// Rendered output is handed to `print` a complete line at a time while the
/// run streams, and any trailing partial line once it ends.
pub async fn run_snapshot(
	backends: Backends,
	snapshot: Snapshot,
	hide_stderr: bool,
	print: impl Fn(&str) + Send + Sync + 'static,
) -> Result<Snapshot, CliError> {
	let session = Session::start(backends, SessionInit::from_snapshot(snapshot)).await?;
	let print: Printer = Arc::new(print);
	let printed = Arc::new(Mutex::new(0usize));

	let view = TerminalView::attach(
		session.events(),
		TerminalOptions::default().hide_stderr(hide_stderr).on_update({
			let print = print.clone();
			let printed = printed.clone();
			move |text| emit(&printed, text, &print, false)
		}),
	);

	let result = session.run().await;
	view.detach();
	emit(&printed, &view.rendered(), &print, true);
	debug!(status = %session.status(), "cli.run_finished");

	let outcome = result.map_err(CliError::from).and_then(|()| Ok(session.serialize()?));
	session.shutdown().await;
	outcome
}

/// Prints the part of `text` past what was already printed. Without `flush`
/// only whole lines are printed, since a partial line may still gain a
/// stream marker.
fn emit(printed: &Mutex<usize>, text: &str, print: &Printer, flush: bool) {
	let mut printed = printed.lock();
	if text.len() < *printed || !text.is_char_boundary(*printed) {
		*printed = 0;
	}
	let end = if flush {
		text.len()
	} else {
		text.rfind('\n').map_or(0, |i| i + 1)
	};
	if end > *printed {
		print(&text[*printed..end]);
		*printed = end;
	}
}
