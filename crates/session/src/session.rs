//! Session/runner state machine.
//!
//! A session moves `Uninitialized -> Ready -> Running -> Ready`, with `Failed`
//! when a boot does not succeed. Every boot belongs to a generation; resets bump
//! the generation so that a boot or output callback from an older one is
//! recognized and dropped.

use std::sync::Arc;

use cannon_primitives::{File, FileStore, Focus, Highlight, HighlightSet};
use cannon_runner::{BackendHandle, Backends, BootContext, LanguageDescriptor, OutputSink};
use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{Error, EventBus, Result, SessionEvent, SessionStatus, Snapshot};

/// What a session starts with. [`ResetRequest::Initial`] returns to it.
#[derive(Debug, Clone)]
pub struct SessionInit {
	/// Language and backend configuration.
	pub descriptor: LanguageDescriptor,
	/// Initial files.
	pub files: FileStore,
	/// Initial focus. Defaults to the first file.
	pub focus: Option<Focus>,
	/// Initial highlights.
	pub highlights: Vec<Highlight>,
	/// Output shown before the first run.
	pub output: String,
}

impl SessionInit {
	/// Starts from a descriptor and files.
	pub fn new(descriptor: LanguageDescriptor, files: FileStore) -> Self {
		Self {
			descriptor,
			files,
			focus: None,
			highlights: Vec::new(),
			output: String::new(),
		}
	}

	/// Recreates the state captured by a snapshot.
	pub fn from_snapshot(snapshot: Snapshot) -> Self {
		let files = snapshot.file_store();
		Self {
			descriptor: snapshot.language_props,
			files,
			focus: snapshot.focus,
			highlights: Vec::new(),
			output: snapshot.output,
		}
	}

	/// Sets the initial focus.
	pub fn with_focus(mut self, focus: Focus) -> Self {
		self.focus = Some(focus);
		self
	}

	/// Sets the initial highlights.
	pub fn with_highlights(mut self, highlights: Vec<Highlight>) -> Self {
		self.highlights = highlights;
		self
	}

	/// Sets the output shown before the first run.
	pub fn with_output(mut self, output: impl Into<String>) -> Self {
		self.output = output.into();
		self
	}
}

/// What a reset replaces the session contents with.
#[derive(Debug, Clone)]
pub enum ResetRequest {
	/// The construction-time contents.
	Initial,
	/// Another language with new files.
	Language {
		/// New descriptor.
		descriptor: LanguageDescriptor,
		/// New files.
		files: FileStore,
	},
	/// An uploaded snapshot.
	Snapshot(Snapshot),
}

/// Validated session contents.
struct Contents {
	descriptor: LanguageDescriptor,
	files: FileStore,
	focus: Option<Focus>,
	highlights: HighlightSet,
	output: String,
}

impl Contents {
	fn prepare(init: SessionInit) -> Result<Self> {
		init.descriptor.validate()?;
		if init.files.is_empty() {
			return Err(cannon_primitives::Error::NoFiles.into());
		}
		let focus = match init.focus {
			Some(focus) => {
				focus.validate(&init.files)?;
				Some(focus)
			}
			None => Focus::first_of(&init.files),
		};
		let mut highlights = HighlightSet::new();
		highlights.replace(init.highlights, &init.files)?;
		Ok(Self {
			descriptor: init.descriptor,
			files: init.files,
			focus,
			highlights,
			output: init.output,
		})
	}
}

struct State {
	generation: u64,
	status: SessionStatus,
	descriptor: LanguageDescriptor,
	files: FileStore,
	focus: Option<Focus>,
	highlights: HighlightSet,
	output: String,
	handle: Option<Arc<dyn BackendHandle>>,
}

struct Shared {
	backends: Backends,
	events: EventBus,
	initial: SessionInit,
	state: Mutex<State>,
	/// Held from a state change through publishing its events, so subscribers
	/// see events in the order the buffer changed. Taken before `state`.
	publish_order: ReentrantMutex<()>,
	/// Serializes teardown and boot so only one handle is ever live.
	boot_lock: tokio::sync::Mutex<()>,
	status_tx: watch::Sender<SessionStatus>,
}

/// A playground session. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
	shared: Arc<Shared>,
}

impl Session {
	/// Creates an unbooted session. Invalid descriptors, focus or highlights
	/// are rejected up front.
	pub fn new(backends: Backends, init: SessionInit) -> Result<Self> {
		let contents = Contents::prepare(init.clone())?;
		let (status_tx, _) = watch::channel(SessionStatus::Uninitialized);
		Ok(Self {
			shared: Arc::new(Shared {
				backends,
				events: EventBus::new(),
				initial: init,
				state: Mutex::new(State {
					generation: 0,
					status: SessionStatus::Uninitialized,
					descriptor: contents.descriptor,
					files: contents.files,
					focus: contents.focus,
					highlights: contents.highlights,
					output: contents.output,
					handle: None,
				}),
				publish_order: ReentrantMutex::new(()),
				boot_lock: tokio::sync::Mutex::new(()),
				status_tx,
			}),
		})
	}

	/// Creates a session and boots it.
	pub async fn start(backends: Backends, init: SessionInit) -> Result<Self> {
		let session = Self::new(backends, init)?;
		session.boot().await?;
		Ok(session)
	}

	/// Event bus carrying this session's output and reset events.
	pub fn events(&self) -> &EventBus {
		&self.shared.events
	}

	/// Current status.
	pub fn status(&self) -> SessionStatus {
		self.shared.state.lock().status
	}

	/// Watches status changes.
	pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
		self.shared.status_tx.subscribe()
	}

	/// Boot generation. Bumped by every boot, reset and shutdown.
	pub fn generation(&self) -> u64 {
		self.shared.state.lock().generation
	}

	/// Current descriptor.
	pub fn descriptor(&self) -> LanguageDescriptor {
		self.shared.state.lock().descriptor.clone()
	}

	/// Copy of the file store.
	pub fn files(&self) -> FileStore {
		self.shared.state.lock().files.clone()
	}

	/// One file.
	pub fn file(&self, path: &str) -> Option<File> {
		self.shared.state.lock().files.get(path).cloned()
	}

	/// Active focus.
	pub fn focus(&self) -> Option<Focus> {
		self.shared.state.lock().focus.clone()
	}

	/// Highlights displayable against the current files.
	pub fn highlights(&self) -> Vec<Highlight> {
		let st = self.shared.state.lock();
		st.highlights.visible(&st.files)
	}

	/// Accumulated output of the current run.
	pub fn output(&self) -> String {
		self.shared.state.lock().output.clone()
	}

	/// Boots the backend for the current descriptor, tearing down any live handle first.
	///
	/// A failed boot leaves the session `Failed` with the error written to output.
	pub async fn boot(&self) -> Result<()> {
		let (generation, previous) = {
			let mut st = self.shared.state.lock();
			let previous = self.begin_generation(&mut st);
			(st.generation, previous)
		};
		self.boot_generation(generation, previous).await
	}

	/// Replaces an edited file's content. Unknown paths are added.
	pub fn update_file(&self, path: &str, content: impl Into<String>) -> Result<()> {
		let mut st = self.shared.state.lock();
		st.files.update(path, content)?;
		st.highlights.invalidate(path);
		debug!(path, "session.update_file");
		Ok(())
	}

	/// Moves focus. The file must exist.
	pub fn change_focus(&self, focus: Focus) -> Result<()> {
		let mut st = self.shared.state.lock();
		focus.validate(&st.files)?;
		debug!(path = %focus.file_path, line = ?focus.start_line, "session.change_focus");
		st.focus = Some(focus);
		Ok(())
	}

	/// Replaces the highlight list with `update(current)`. Entries are
	/// validated against the files; on error nothing changes.
	///
	/// `update` runs without the session locked and may read from the session.
	pub fn set_highlights(&self, update: impl FnOnce(&[Highlight]) -> Vec<Highlight>) -> Result<()> {
		let current = self.shared.state.lock().highlights.raw().to_vec();
		let next = update(&current);
		let mut st = self.shared.state.lock();
		let state = &mut *st;
		state.highlights.replace(next, &state.files)?;
		Ok(())
	}

	/// Deletes a file. Focus on it moves to the first remaining file. The last
	/// file cannot be deleted.
	pub fn delete_file(&self, path: &str) -> Result<()> {
		let mut st = self.shared.state.lock();
		let state = &mut *st;
		state.files.remove(path)?;
		state.highlights.invalidate(path);
		if state.focus.as_ref().is_some_and(|f| f.file_path == path) {
			state.focus = Focus::first_of(&state.files);
		}
		debug!(path, focus = ?state.focus.as_ref().map(|f| &f.file_path), "session.delete_file");
		Ok(())
	}

	/// Runs the current files.
	///
	/// Output is cleared first. Transport and runtime failures are written to
	/// output and the session returns to `Ready`; the call still succeeds.
	/// Failures caused by the files or configuration are written to output
	/// and also returned.
	pub async fn run(&self) -> Result<()> {
		let started = self.update_and_publish(|st| match (st.status, st.handle.clone()) {
			(SessionStatus::Ready, Some(handle)) => {
				self.transition(st, SessionStatus::Running);
				st.output.clear();
				(Ok((st.generation, handle, st.files.clone())), vec![SessionEvent::clear()])
			}
			(SessionStatus::Ready, None) => (Err(Error::NoActiveHandle), Vec::new()),
			(SessionStatus::Running, _) => (Err(Error::AlreadyRunning), Vec::new()),
			(other, _) => (Err(Error::NotReady(other)), Vec::new()),
		});
		let (generation, handle, files) = started?;
		info!(generation, files = files.len(), "session.run");

		let execution = match handle.execute(&files).await {
			Ok(execution) => execution,
			Err(err) => {
				warn!(generation, error = %err, "session.execute_failed");
				self.append(generation, format!("{err}\n"));
				self.finish_run(generation, None);
				return if err.is_recoverable() { Ok(()) } else { Err(err.into()) };
			}
		};

		let mut output = execution.output;
		let mut failed = false;
		while let Some(chunk) = output.next().await {
			match chunk {
				Ok(data) => {
					if !self.append(generation, data) {
						break;
					}
				}
				Err(err) => {
					warn!(generation, error = %err, "session.stream_failed");
					self.append(generation, format!("{err}\n"));
					failed = true;
					break;
				}
			}
		}
		self.finish_run(generation, if failed { None } else { execution.committed });
		Ok(())
	}

	/// Replaces the session contents and boots again.
	///
	/// The request is validated before anything changes. Output is cleared and
	/// a reset event is published before the new boot starts.
	pub async fn reset(&self, request: ResetRequest) -> Result<()> {
		let init = match request {
			ResetRequest::Initial => self.shared.initial.clone(),
			ResetRequest::Language { descriptor, files } => SessionInit::new(descriptor, files),
			ResetRequest::Snapshot(snapshot) => SessionInit::from_snapshot(snapshot),
		};
		let contents = Contents::prepare(init)?;

		let (generation, previous) = self.update_and_publish(|st| {
			let previous = self.begin_generation(st);
			let mut events = vec![SessionEvent::Reset, SessionEvent::clear()];
			if !contents.output.is_empty() {
				events.push(SessionEvent::output(contents.output.clone()));
			}
			st.descriptor = contents.descriptor;
			st.files = contents.files;
			st.focus = contents.focus;
			st.highlights = contents.highlights;
			st.output = contents.output;
			((st.generation, previous), events)
		});
		info!(generation, "session.reset");

		self.boot_generation(generation, previous).await
	}

	/// Replaces the session with an uploaded snapshot.
	pub async fn upload(&self, snapshot: Snapshot) -> Result<()> {
		self.reset(ResetRequest::Snapshot(snapshot)).await
	}

	/// Captures descriptor, files, focus and output. Requires a booted backend.
	pub fn serialize(&self) -> Result<Snapshot> {
		let st = self.shared.state.lock();
		if st.handle.is_none() {
			return Err(Error::NoActiveHandle);
		}
		Ok(Snapshot {
			language_props: st.descriptor.clone(),
			files: st.files.contents(),
			focus: st.focus.clone(),
			output: st.output.clone(),
		})
	}

	/// Tears down the live handle. The session can be booted again afterwards.
	pub async fn shutdown(&self) {
		let _boot = self.shared.boot_lock.lock().await;
		let previous = {
			let mut st = self.shared.state.lock();
			self.begin_generation(&mut st)
		};
		if let Some(handle) = previous {
			handle.teardown().await;
		}
		info!("session.shutdown");
	}

	fn transition(&self, st: &mut State, to: SessionStatus) {
		if st.status != to {
			debug!(generation = st.generation, from = %st.status, to = %to, "session.status");
		}
		st.status = to;
		self.shared.status_tx.send_replace(to);
	}

	/// Starts a new generation and detaches the live handle for teardown.
	fn begin_generation(&self, st: &mut State) -> Option<Arc<dyn BackendHandle>> {
		st.generation += 1;
		self.transition(st, SessionStatus::Uninitialized);
		st.handle.take()
	}

	async fn boot_generation(&self, generation: u64, previous: Option<Arc<dyn BackendHandle>>) -> Result<()> {
		let _boot = self.shared.boot_lock.lock().await;
		if let Some(previous) = previous {
			previous.teardown().await;
		}

		let (descriptor, files) = {
			let st = self.shared.state.lock();
			if st.generation != generation {
				debug!(generation, current = st.generation, "session.boot_superseded");
				return Ok(());
			}
			(st.descriptor.clone(), st.files.clone())
		};
		info!(generation, language = %descriptor.language(), "session.boot");

		let booted = match self.shared.backends.select(descriptor.backend_kind()) {
			Ok(backend) => {
				backend
					.boot(BootContext {
						files: &files,
						descriptor: &descriptor,
						output: self.sink(generation),
					})
					.await
			}
			Err(err) => Err(err),
		};

		match booted {
			Ok(handle) => {
				let current = {
					let mut st = self.shared.state.lock();
					let current = st.generation == generation;
					if current {
						st.handle = Some(handle.clone());
						self.transition(&mut st, SessionStatus::Ready);
					}
					current
				};
				if !current {
					debug!(generation, "session.boot_discarded");
					handle.teardown().await;
				}
				Ok(())
			}
			Err(err) => {
				warn!(generation, error = %err, "session.boot_failed");
				let message = format!("{err}\n");
				let current = self.update_and_publish(|st| {
					if st.generation != generation {
						return (false, Vec::new());
					}
					self.transition(st, SessionStatus::Failed);
					st.output.push_str(&message);
					(true, vec![SessionEvent::output(message)])
				});
				if current { Err(err.into()) } else { Ok(()) }
			}
		}
	}

	/// Output destination for a backend booted in `generation`.
	fn sink(&self, generation: u64) -> OutputSink {
		let shared = Arc::downgrade(&self.shared);
		OutputSink::new(move |data| {
			if let Some(shared) = shared.upgrade() {
				Session { shared }.append(generation, data);
			}
		})
	}

	/// Appends output if `generation` is still current. Returns false when it is stale.
	fn append(&self, generation: u64, data: String) -> bool {
		self.update_and_publish(|st| {
			if st.generation != generation {
				debug!(generation, current = st.generation, "session.stale_output");
				return (false, Vec::new());
			}
			if data.is_empty() {
				return (true, Vec::new());
			}
			st.output.push_str(&data);
			(true, vec![SessionEvent::output(data)])
		})
	}

	/// Applies `update` to the state and publishes the events it returns
	/// before any other change can publish. Listeners run with the state
	/// unlocked and may call back into the session.
	fn update_and_publish<T>(&self, update: impl FnOnce(&mut State) -> (T, Vec<SessionEvent>)) -> T {
		let _order = self.shared.publish_order.lock();
		let (value, events) = {
			let mut st = self.shared.state.lock();
			update(&mut st)
		};
		if !events.is_empty() {
			self.shared.events.publish_batch(&events);
		}
		value
	}

	fn finish_run(&self, generation: u64, committed: Option<indexmap::IndexMap<String, String>>) {
		let mut st = self.shared.state.lock();
		if st.generation != generation {
			return;
		}
		if let Some(committed) = committed {
			let cleared = st.files.mark_committed(&committed);
			debug!(generation, cleared, "session.committed");
		}
		if st.status == SessionStatus::Running {
			self.transition(&mut st, SessionStatus::Ready);
		}
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let st = self.shared.state.lock();
		f.debug_struct("Session")
			.field("generation", &st.generation)
			.field("status", &st.status)
			.field("language", &st.descriptor.language())
			.field("files", &st.files.len())
			.finish_non_exhaustive()
	}
}
