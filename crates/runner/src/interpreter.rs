//! Python interpreter adapter.
//!
//! The interpreter is loaded once per process and stays loaded after the last
//! session lets go of it. Every run executes a single source file.

use std::sync::Arc;

use async_trait::async_trait;
use cannon_primitives::FileStore;
use futures::StreamExt;
use futures::stream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
	Backend, BackendHandle, BackendKind, BootContext, Error, Execution, LanguageDescriptor, OutputStream, Result,
	Retention, SharedLease, SharedRuntime,
};

/// Prefix marking error-stream lines in output.
pub const STDERR_PREFIX: &str = "stderr: ";

/// Path fragments identifying frames that belong to the interpreter runtime
/// rather than user code.
const INTERNAL_FRAMES: [&str; 2] = ["/lib/python", "_pyodide"];

/// Name the interpreter gives to code evaluated from a string.
const EXEC_FRAME: &str = "<exec>";

/// Native traceback of an uncaught exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traceback(pub String);

/// Write ends of a run's standard streams.
#[derive(Debug, Clone)]
pub struct StdStreams {
	tx: mpsc::UnboundedSender<String>,
}

impl StdStreams {
	/// Writes to standard output.
	pub fn stdout(&self, text: impl Into<String>) {
		let _ = self.tx.send(text.into());
	}

	/// Writes to standard error. Every line is marked with [`STDERR_PREFIX`].
	pub fn stderr(&self, text: impl AsRef<str>) {
		let text = text.as_ref();
		if text.is_empty() {
			return;
		}
		let _ = self.tx.send(prefix_lines(text.lines()));
	}
}

/// A loaded interpreter.
#[async_trait]
pub trait Interpreter: Send + Sync {
	/// Runs `source` as the module `filename`.
	async fn run(&self, filename: &str, source: &str, streams: StdStreams) -> Result<(), Traceback>;
}

/// Loads the interpreter distribution.
#[async_trait]
pub trait InterpreterLoader: Send + Sync {
	/// Loads from `index_url`, or the loader's default location.
	async fn load(&self, index_url: Option<&str>) -> Result<Arc<dyn Interpreter>>;
}

/// Adapter for the Python interpreter.
pub struct InterpreterBackend {
	loader: Arc<dyn InterpreterLoader>,
	runtime: Arc<SharedRuntime<dyn Interpreter>>,
}

impl InterpreterBackend {
	/// Creates an adapter with its own interpreter slot.
	pub fn new(loader: Arc<dyn InterpreterLoader>) -> Self {
		Self::with_runtime(loader, SharedRuntime::new("interpreter", Retention::KeepLoaded))
	}

	/// Creates an adapter sharing an existing interpreter slot.
	pub fn with_runtime(loader: Arc<dyn InterpreterLoader>, runtime: Arc<SharedRuntime<dyn Interpreter>>) -> Self {
		Self { loader, runtime }
	}

	/// The interpreter slot.
	pub fn runtime(&self) -> &Arc<SharedRuntime<dyn Interpreter>> {
		&self.runtime
	}
}

#[async_trait]
impl Backend for InterpreterBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Interpreter
	}

	async fn boot(&self, ctx: BootContext<'_>) -> Result<Arc<dyn BackendHandle>> {
		ctx.descriptor.validate()?;
		let LanguageDescriptor::Python(config) = ctx.descriptor else {
			return Err(Error::Config(format!(
				"{} does not run in the interpreter",
				ctx.descriptor.language()
			)));
		};
		let loader = self.loader.clone();
		let index_url = config.index_url.clone();
		let lease = self
			.runtime
			.acquire(|| async move { loader.load(index_url.as_deref()).await })
			.await?;
		info!(index_url = config.index_url.as_deref().unwrap_or("default"), "interpreter.boot");
		Ok(Arc::new(InterpreterHandle { lease }))
	}
}

struct InterpreterHandle {
	lease: SharedLease<dyn Interpreter>,
}

#[async_trait]
impl BackendHandle for InterpreterHandle {
	async fn execute(&self, files: &FileStore) -> Result<Execution> {
		if files.len() != 1 {
			return Err(Error::UnsupportedFileCount(files.len()));
		}
		let Some(file) = files.iter().next() else {
			return Err(Error::UnsupportedFileCount(0));
		};
		let filename = file.path().to_string();
		let source = file.content().to_string();
		debug!(%filename, "interpreter.execute");

		let (tx, rx) = mpsc::unbounded_channel();
		let interpreter = self.lease.runtime().clone();
		tokio::spawn(async move {
			let streams = StdStreams { tx: tx.clone() };
			if let Err(Traceback(traceback)) = interpreter.run(&filename, &source, streams).await {
				let _ = tx.send(format_traceback(&traceback, &filename));
			}
		});
		Ok(Execution::streaming(receive(rx)))
	}

	async fn teardown(&self) {
		debug!("interpreter.teardown");
		// Retained slots never hand the interpreter back.
		let _ = self.lease.release().await;
	}
}

fn receive(rx: mpsc::UnboundedReceiver<String>) -> OutputStream {
	stream::unfold(rx, |mut rx| async move {
		let chunk = rx.recv().await?;
		Some((Ok(chunk), rx))
	})
	.boxed()
}

fn prefix_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
	lines.map(|line| format!("{STDERR_PREFIX}{line}\n")).collect()
}

/// Rewrites a native traceback for display: frames from the interpreter
/// runtime are removed along with their source lines, evaluated-code frames
/// are attributed to `filename`, and every line is marked as error output.
pub fn format_traceback(traceback: &str, filename: &str) -> String {
	let exec_frame = format!("\"{EXEC_FRAME}\"");
	let user_frame = format!("\"{filename}\"");
	let mut skipping = false;
	let mut kept = Vec::new();
	for line in traceback.lines() {
		let trimmed = line.trim_start();
		if trimmed.starts_with("File \"") {
			skipping = INTERNAL_FRAMES.iter().any(|frame| trimmed.contains(frame));
			if skipping {
				continue;
			}
			kept.push(line.replace(&exec_frame, &user_frame));
			continue;
		}
		// Source excerpts sit deeper than their frame line.
		if skipping && line.starts_with("    ") {
			continue;
		}
		skipping = false;
		kept.push(line.to_string());
	}
	prefix_lines(kept.iter().map(String::as_str))
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pretty_assertions::assert_eq;

	use super::*;
	use crate::{InterpreterConfig, OutputSink};

	const TRACEBACK: &str = "Traceback (most recent call last):
  File \"/lib/python311.zip/_pyodide/_base.py\", line 499, in eval_code
    .run(globals, locals)
     ^^^^^^^^^^^^^^^^^^^^
  File \"/lib/python311.zip/_pyodide/_base.py\", line 340, in run
    coroutine = eval(self.code, globals, locals)
                ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
  File \"<exec>\", line 2, in <module>
ZeroDivisionError: division by zero";

	/// Echoes `print` lines to stdout and fails on `1/0`.
	struct EchoInterpreter;

	#[async_trait]
	impl Interpreter for EchoInterpreter {
		async fn run(&self, _filename: &str, source: &str, streams: StdStreams) -> Result<(), Traceback> {
			for line in source.lines() {
				if let Some(text) = line.strip_prefix("print ") {
					streams.stdout(format!("{text}\n"));
				} else if line == "warn" {
					streams.stderr("careful\n");
				} else if line == "1/0" {
					return Err(Traceback(TRACEBACK.into()));
				}
			}
			Ok(())
		}
	}

	#[derive(Default)]
	struct CountingLoader {
		loads: AtomicUsize,
	}

	#[async_trait]
	impl InterpreterLoader for CountingLoader {
		async fn load(&self, _index_url: Option<&str>) -> Result<Arc<dyn Interpreter>> {
			self.loads.fetch_add(1, Ordering::SeqCst);
			Ok(Arc::new(EchoInterpreter))
		}
	}

	async fn boot(backend: &InterpreterBackend, files: &FileStore) -> Arc<dyn BackendHandle> {
		let descriptor = LanguageDescriptor::Python(InterpreterConfig::default());
		backend
			.boot(BootContext {
				files,
				descriptor: &descriptor,
				output: OutputSink::discard(),
			})
			.await
			.unwrap()
	}

	async fn run(handle: &Arc<dyn BackendHandle>, files: &FileStore) -> String {
		handle
			.execute(files)
			.await
			.unwrap()
			.output
			.map(|chunk| chunk.unwrap())
			.collect::<Vec<_>>()
			.await
			.concat()
	}

	#[tokio::test]
	async fn streams_stdout_and_prefixed_stderr() {
		let backend = InterpreterBackend::new(Arc::new(CountingLoader::default()));
		let files = FileStore::from_iter([("main.py", "print hi\nwarn\nprint bye")]);
		let handle = boot(&backend, &files).await;

		assert_eq!(run(&handle, &files).await, "hi\nstderr: careful\nbye\n");
	}

	#[tokio::test]
	async fn more_than_one_file_fails_fast() {
		let backend = InterpreterBackend::new(Arc::new(CountingLoader::default()));
		let files = FileStore::from_iter([("main.py", ""), ("util.py", "")]);
		let handle = boot(&backend, &files).await;

		let err = handle.execute(&files).await.err().unwrap();
		assert!(matches!(err, Error::UnsupportedFileCount(2)));
		assert_eq!(err.to_string(), "only one file supported, got 2");
		assert!(!err.is_recoverable());
	}

	#[tokio::test]
	async fn exceptions_become_filtered_stderr() {
		let backend = InterpreterBackend::new(Arc::new(CountingLoader::default()));
		let files = FileStore::from_iter([("main.py", "print before\n1/0")]);
		let handle = boot(&backend, &files).await;

		assert_eq!(
			run(&handle, &files).await,
			"before\n\
			 stderr: Traceback (most recent call last):\n\
			 stderr:   File \"main.py\", line 2, in <module>\n\
			 stderr: ZeroDivisionError: division by zero\n"
		);
	}

	#[tokio::test]
	async fn interpreter_loads_once_and_stays_loaded() {
		let loader = Arc::new(CountingLoader::default());
		let backend = InterpreterBackend::new(loader.clone());
		let files = FileStore::from_iter([("main.py", "")]);

		let first = boot(&backend, &files).await;
		let second = boot(&backend, &files).await;
		assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

		first.teardown().await;
		second.teardown().await;
		assert_eq!(backend.runtime().leases().await, 0);
		assert!(backend.runtime().is_loaded().await);

		let _third = boot(&backend, &files).await;
		assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
	}
}
