//! JS bundler sandbox adapter.
//!
//! The sandbox client renders into a surface owned by the host. Each run pushes
//! the whole file set and collects console output until the client reports the
//! bundle finished. Console output outside a run, such as the initial
//! evaluation or logs from interacting with the preview, goes to the boot sink.

use std::sync::Arc;

use async_trait::async_trait;
use cannon_primitives::FileStore;
use futures::StreamExt;
use futures::stream;
use indexmap::IndexMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
	Backend, BackendHandle, BackendKind, BootContext, Error, Execution, OutputSink, OutputStream, Result,
};

/// Entry point used when the descriptor does not name one.
pub const DEFAULT_ENTRY: &str = "/index.js";

/// Files and entry point handed to the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSetup {
	/// Bundle entry point.
	pub entry: String,
	/// Every file, `path -> code`.
	pub files: IndexMap<String, String>,
}

/// Client construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOptions {
	/// Surface the client attaches to.
	pub surface: String,
	/// Resources injected into the sandbox page.
	pub external_resources: Vec<String>,
	/// Self-hosted bundler location.
	pub bundler_url: Option<String>,
}

/// Messages a sandbox client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxMessage {
	/// One `console.*` call; each value is logged on its own line.
	Console(Vec<String>),
	/// The bundle finished evaluating.
	Done,
	/// Compilation or evaluation failed.
	Error(String),
}

/// A live sandbox client.
#[async_trait]
pub trait SandboxClient: Send + Sync {
	/// Replaces the sandbox contents and re-evaluates.
	async fn update(&self, setup: SandboxSetup) -> Result<()>;

	/// Detaches from the surface.
	async fn destroy(&self);
}

/// Creates sandbox clients.
#[async_trait]
pub trait SandboxHost: Send + Sync {
	/// Loads a client with the initial files. Messages arrive on the returned receiver.
	async fn load(
		&self,
		setup: SandboxSetup,
		options: SandboxOptions,
	) -> Result<(Arc<dyn SandboxClient>, mpsc::UnboundedReceiver<SandboxMessage>)>;
}

/// Adapter for the bundler sandbox.
pub struct BundlerBackend {
	host: Arc<dyn SandboxHost>,
}

impl BundlerBackend {
	/// Creates an adapter loading clients from `host`.
	pub fn new(host: Arc<dyn SandboxHost>) -> Self {
		Self { host }
	}
}

#[async_trait]
impl Backend for BundlerBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Bundler
	}

	async fn boot(&self, ctx: BootContext<'_>) -> Result<Arc<dyn BackendHandle>> {
		ctx.descriptor.validate()?;
		let crate::LanguageDescriptor::Javascript(config) = ctx.descriptor else {
			return Err(Error::Config(format!(
				"{} does not run in the bundler sandbox",
				ctx.descriptor.language()
			)));
		};
		let entry = config.entry.clone().unwrap_or_else(|| DEFAULT_ENTRY.to_string());
		let options = SandboxOptions {
			surface: config.surface.clone(),
			external_resources: config.external_resources.clone(),
			bundler_url: config.bundler_url.clone(),
		};
		info!(surface = %options.surface, entry = %entry, "bundler.boot");

		let setup = SandboxSetup {
			entry: entry.clone(),
			files: ctx.files.contents(),
		};
		let (client, messages) = self.host.load(setup, options).await?;
		let (runs, attach) = mpsc::unbounded_channel();
		let router = tokio::spawn(route(messages, attach, ctx.output));
		Ok(Arc::new(BundlerHandle {
			client,
			entry,
			runs,
			router,
		}))
	}
}

struct BundlerHandle {
	client: Arc<dyn SandboxClient>,
	entry: String,
	runs: mpsc::UnboundedSender<Attach>,
	router: JoinHandle<()>,
}

/// Claims client messages for one run.
struct Attach {
	output: mpsc::UnboundedSender<SandboxMessage>,
	/// Signalled once earlier messages have gone to the sink.
	ready: oneshot::Sender<()>,
}

/// Hands client messages to the attached run until it finishes, and console
/// output arriving between runs to `sink`.
async fn route(
	mut messages: mpsc::UnboundedReceiver<SandboxMessage>,
	mut attach: mpsc::UnboundedReceiver<Attach>,
	sink: OutputSink,
) {
	let mut run: Option<mpsc::UnboundedSender<SandboxMessage>> = None;
	loop {
		tokio::select! {
			request = attach.recv() => {
				let Some(request) = request else { break };
				while let Ok(message) = messages.try_recv() {
					to_sink(&sink, message);
				}
				run = Some(request.output);
				let _ = request.ready.send(());
			}
			message = messages.recv() => {
				let Some(message) = message else { break };
				let finished = !matches!(message, SandboxMessage::Console(_));
				match run.as_ref() {
					Some(output) => {
						if let Err(mpsc::error::SendError(message)) = output.send(message) {
							run = None;
							to_sink(&sink, message);
						} else if finished {
							run = None;
						}
					}
					None => to_sink(&sink, message),
				}
			}
		}
	}
	debug!("bundler.router_closed");
}

fn to_sink(sink: &OutputSink, message: SandboxMessage) {
	match message {
		SandboxMessage::Console(values) => sink.write(console_text(&values)),
		SandboxMessage::Error(message) => sink.write(format!("{message}\n")),
		SandboxMessage::Done => {}
	}
}

fn console_text(values: &[String]) -> String {
	values.iter().map(|value| format!("{value}\n")).collect()
}

#[async_trait]
impl BackendHandle for BundlerHandle {
	async fn execute(&self, files: &FileStore) -> Result<Execution> {
		let (output, messages) = mpsc::unbounded_channel();
		let (ready, attached) = oneshot::channel();
		self.runs
			.send(Attach { output, ready })
			.map_err(|_| Error::Stopped)?;
		attached.await.map_err(|_| Error::Stopped)?;

		self.client
			.update(SandboxSetup {
				entry: self.entry.clone(),
				files: files.contents(),
			})
			.await?;
		debug!(files = files.len(), "bundler.execute");
		Ok(Execution::streaming(console_output(messages)))
	}

	async fn teardown(&self) {
		debug!("bundler.teardown");
		self.client.destroy().await;
		self.router.abort();
	}
}

/// Console lines until the client reports completion.
fn console_output(messages: mpsc::UnboundedReceiver<SandboxMessage>) -> OutputStream {
	stream::unfold(Some(messages), |state| async move {
		let mut messages = state?;
		loop {
			match messages.recv().await {
				Some(SandboxMessage::Console(values)) => {
					if values.is_empty() {
						continue;
					}
					return Some((Ok(console_text(&values)), Some(messages)));
				}
				Some(SandboxMessage::Done) => return None,
				Some(SandboxMessage::Error(message)) => {
					warn!(%message, "bundler.error");
					return Some((Err(Error::Runtime(message)), None));
				}
				None => return Some((Err(Error::Stopped), None)),
			}
		}
	})
	.boxed()
}
