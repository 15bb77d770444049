//! Uniform adapter interface over execution engines.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cannon_primitives::FileStore;
use futures::stream::BoxStream;
use indexmap::IndexMap;

use crate::{BackendKind, Error, LanguageDescriptor, Result};

/// Ordered stream of output text produced by one execution.
pub type OutputStream = BoxStream<'static, Result<String>>;

/// Destination for output produced outside of an [`Execution`] stream, such as
/// install logs during boot or a dev server writing between runs.
#[derive(Clone)]
pub struct OutputSink {
	write: Arc<dyn Fn(String) + Send + Sync>,
}

impl OutputSink {
	/// Wraps a callback.
	pub fn new(write: impl Fn(String) + Send + Sync + 'static) -> Self {
		Self { write: Arc::new(write) }
	}

	/// A sink that drops everything.
	pub fn discard() -> Self {
		Self::new(|_| {})
	}

	/// Forwards one chunk. Empty chunks are skipped.
	pub fn write(&self, data: impl Into<String>) {
		let data = data.into();
		if !data.is_empty() {
			(self.write)(data);
		}
	}
}

impl std::fmt::Debug for OutputSink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OutputSink").finish_non_exhaustive()
	}
}

/// Everything an adapter needs to boot.
#[derive(Debug)]
pub struct BootContext<'a> {
	/// Files at boot time.
	pub files: &'a FileStore,
	/// Descriptor the session was created with.
	pub descriptor: &'a LanguageDescriptor,
	/// Out-of-band output.
	pub output: OutputSink,
}

/// Result of starting an execution.
pub struct Execution {
	/// Output chunks in arrival order. The run is over when the stream ends.
	pub output: OutputStream,
	/// Contents the engine now holds. When present and the stream finishes
	/// without error, the session clears the dirty flag of every file still
	/// matching these contents.
	pub committed: Option<IndexMap<String, String>>,
}

impl Execution {
	/// Streamed output that commits nothing.
	pub fn streaming(output: OutputStream) -> Self {
		Self { output, committed: None }
	}
}

impl std::fmt::Debug for Execution {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Execution")
			.field("committed", &self.committed)
			.finish_non_exhaustive()
	}
}

/// Boots an execution engine for a descriptor.
#[async_trait]
pub trait Backend: Send + Sync {
	/// Engine kind this adapter serves.
	fn kind(&self) -> BackendKind;

	/// Establishes whatever is needed to run code.
	///
	/// Repeated boots for the same descriptor reuse shared engines instead of
	/// loading them again. A failed boot leaves no shared resources acquired.
	async fn boot(&self, ctx: BootContext<'_>) -> Result<Arc<dyn BackendHandle>>;
}

/// A booted engine owned by exactly one session.
#[async_trait]
pub trait BackendHandle: Send + Sync {
	/// Runs the current file set.
	///
	/// Errors returned here happen before any output was produced. Errors
	/// yielded by the stream happen mid-run.
	async fn execute(&self, files: &FileStore) -> Result<Execution>;

	/// Releases adapter-owned resources. Shared engines are released, not destroyed.
	async fn teardown(&self);
}

/// Adapter registry. Sessions select an adapter once per boot by backend kind
/// and only talk to the trait afterwards.
#[derive(Clone, Default)]
pub struct Backends {
	adapters: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl Backends {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an adapter, replacing any previous one of the same kind.
	pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
		self.register(backend);
		self
	}

	/// Registers an adapter in place.
	pub fn register(&mut self, backend: Arc<dyn Backend>) {
		self.adapters.insert(backend.kind(), backend);
	}

	/// Adapter for a backend kind.
	pub fn select(&self, kind: BackendKind) -> Result<Arc<dyn Backend>> {
		self.adapters
			.get(&kind)
			.cloned()
			.ok_or(Error::BackendUnavailable(kind))
	}

	/// Registered kinds.
	pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
		self.adapters.keys().copied()
	}
}

impl std::fmt::Debug for Backends {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Backends")
			.field("kinds", &self.adapters.keys().collect::<Vec<_>>())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use super::*;

	struct NullBackend(BackendKind);

	#[async_trait]
	impl Backend for NullBackend {
		fn kind(&self) -> BackendKind {
			self.0
		}

		async fn boot(&self, _ctx: BootContext<'_>) -> Result<Arc<dyn BackendHandle>> {
			Err(Error::Boot("null".into()))
		}
	}

	#[test]
	fn select_by_kind() {
		let backends = Backends::new()
			.with(Arc::new(NullBackend(BackendKind::Remote)))
			.with(Arc::new(NullBackend(BackendKind::Interpreter)));

		assert_eq!(backends.select(BackendKind::Remote).unwrap().kind(), BackendKind::Remote);
		assert!(matches!(
			backends.select(BackendKind::Bundler),
			Err(Error::BackendUnavailable(BackendKind::Bundler))
		));
		assert_eq!(backends.kinds().count(), 2);
	}

	#[test]
	fn sink_skips_empty_chunks() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = OutputSink::new({
			let seen = seen.clone();
			move |data| seen.lock().unwrap().push(data)
		});
		sink.write("");
		sink.write("a");
		assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);
	}
}
