//! Node-like process container adapter.
//!
//! One container is shared by every session using this backend. Booting mounts
//! the files, installs dependencies and starts a dev server whose output is
//! forwarded between runs. Running writes the dirty files and reloads the
//! surface showing the server.

use std::sync::Arc;

use async_trait::async_trait;
use cannon_primitives::FileStore;
use futures::StreamExt;
use futures::stream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
	Backend, BackendHandle, BackendKind, BootContext, Error, Execution, LanguageDescriptor, OutputSink, Result,
	Retention, SharedLease, SharedRuntime,
};

/// Install command used when the descriptor does not override it.
pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";
/// Start command used when the descriptor does not override it.
pub const DEFAULT_RUN_COMMAND: &str = "npm start";

/// One entry of a mounted file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsNode {
	/// A regular file.
	File {
		/// File text.
		contents: String,
	},
	/// A nested directory.
	Directory(FileTree),
}

/// Nested directory structure mounted into the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
	entries: IndexMap<String, FsNode>,
}

impl FileTree {
	/// Splits every path on `/` into nested directories. Empty segments are
	/// ignored, so `/src/index.js` and `src/index.js` land in the same place.
	pub fn from_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
		let mut root = Self::default();
		for (path, contents) in files {
			let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
			let Some((name, dirs)) = segments.split_last() else {
				return Err(Error::Config(format!("`{path}` is not a file path")));
			};

			let mut level = &mut root;
			for dir in dirs {
				let node = level
					.entries
					.entry((*dir).to_string())
					.or_insert_with(|| FsNode::Directory(Self::default()));
				level = match node {
					FsNode::Directory(tree) => tree,
					FsNode::File { .. } => {
						return Err(Error::Config(format!("`{path}` nests under file `{dir}`")));
					}
				};
			}
			if let Some(FsNode::Directory(_)) = level.entries.get(*name) {
				return Err(Error::Config(format!("`{path}` collides with a directory")));
			}
			level.entries.insert(
				(*name).to_string(),
				FsNode::File {
					contents: contents.to_string(),
				},
			);
		}
		Ok(root)
	}

	/// Entry by name at this level.
	pub fn get(&self, name: &str) -> Option<&FsNode> {
		self.entries.get(name)
	}

	/// Number of entries at this level.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true when nothing is mounted at this level.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Path as written into the container: empty segments dropped, no leading slash.
pub fn container_path(path: &str) -> String {
	path.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/")
}

/// Where the dev server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
	/// Listening port.
	pub port: u16,
	/// URL the surface should load.
	pub url: String,
}

/// A process spawned inside the container.
#[async_trait]
pub trait ContainerProcess: Send + Sync {
	/// Takes the combined output channel. Returns `None` after the first call.
	fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<String>>;

	/// Waits for exit and returns the exit code.
	async fn wait(&mut self) -> Result<i32>;

	/// Terminates the process.
	async fn kill(&mut self);
}

/// A running container.
#[async_trait]
pub trait Container: Send + Sync {
	/// Mounts a file tree at the working directory root.
	async fn mount(&self, tree: &FileTree) -> Result<()>;

	/// Writes one file, creating it if needed.
	async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

	/// Starts `program` with `args`.
	async fn spawn(&self, program: &str, args: &[String]) -> Result<Box<dyn ContainerProcess>>;

	/// Resolves once a server inside the container accepts connections.
	async fn server_ready(&self) -> Result<ServerReady>;

	/// Shuts the container down.
	async fn teardown(&self);
}

/// Boots containers and drives the surfaces showing them.
#[async_trait]
pub trait ContainerHost: Send + Sync {
	/// Boots a fresh container.
	async fn boot(&self) -> Result<Arc<dyn Container>>;

	/// Points `surface` at `url`.
	async fn show(&self, surface: &str, url: &str) -> Result<()>;

	/// Reloads whatever `surface` currently shows.
	async fn reload(&self, surface: &str) -> Result<()>;
}

/// Adapter for the process container.
pub struct ContainerBackend {
	host: Arc<dyn ContainerHost>,
	runtime: Arc<SharedRuntime<dyn Container>>,
}

impl ContainerBackend {
	/// Creates an adapter with its own container slot.
	pub fn new(host: Arc<dyn ContainerHost>) -> Self {
		Self::with_runtime(host, SharedRuntime::new("container", Retention::DropWhenUnused))
	}

	/// Creates an adapter sharing an existing container slot.
	pub fn with_runtime(host: Arc<dyn ContainerHost>, runtime: Arc<SharedRuntime<dyn Container>>) -> Self {
		Self { host, runtime }
	}

	/// The container slot.
	pub fn runtime(&self) -> &Arc<SharedRuntime<dyn Container>> {
		&self.runtime
	}

	async fn start(
		&self,
		container: &Arc<dyn Container>,
		files: &FileStore,
		surface: &str,
		install: &str,
		run: &str,
		output: &OutputSink,
	) -> Result<(Box<dyn ContainerProcess>, JoinHandle<()>)> {
		let contents = files.contents();
		let tree = FileTree::from_files(contents.iter().map(|(p, c)| (p.as_str(), c.as_str())))?;
		container.mount(&tree).await?;
		debug!(entries = tree.len(), "container.mount");

		let mut installer = spawn(container, install).await?;
		let forwarding = installer.take_output().map(|rx| forward(rx, output.clone()));
		let code = installer.wait().await?;
		if let Some(task) = forwarding {
			let _ = task.await;
		}
		if code != 0 {
			return Err(Error::ExitCode {
				command: install.to_string(),
				code,
			});
		}
		info!(command = install, "container.installed");

		let mut server = spawn(container, run).await?;
		let forwarding = match server.take_output() {
			Some(rx) => forward(rx, output.clone()),
			None => tokio::spawn(async {}),
		};
		let ready = async {
			let ready = container.server_ready().await?;
			info!(port = ready.port, url = %ready.url, "container.server_ready");
			self.host.show(surface, &ready.url).await
		};
		if let Err(err) = ready.await {
			server.kill().await;
			forwarding.abort();
			return Err(err);
		}
		Ok((server, forwarding))
	}
}

async fn spawn(container: &Arc<dyn Container>, command: &str) -> Result<Box<dyn ContainerProcess>> {
	let mut parts = command.split_whitespace().map(str::to_string);
	let program = parts
		.next()
		.ok_or_else(|| Error::Config("empty container command".into()))?;
	let args: Vec<String> = parts.collect();
	debug!(%program, ?args, "container.spawn");
	container.spawn(&program, &args).await
}

fn forward(mut rx: mpsc::UnboundedReceiver<String>, output: OutputSink) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(chunk) = rx.recv().await {
			output.write(chunk);
		}
	})
}

async fn release(lease: &SharedLease<dyn Container>) {
	if let Some(container) = lease.release().await {
		info!("container.shutdown");
		container.teardown().await;
	}
}

#[async_trait]
impl Backend for ContainerBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Container
	}

	async fn boot(&self, ctx: BootContext<'_>) -> Result<Arc<dyn BackendHandle>> {
		ctx.descriptor.validate()?;
		let LanguageDescriptor::JavascriptWebcontainer(config) = ctx.descriptor else {
			return Err(Error::Config(format!(
				"{} does not run in the process container",
				ctx.descriptor.language()
			)));
		};
		let install = config.install_command.as_deref().unwrap_or(DEFAULT_INSTALL_COMMAND);
		let run = config.run_command.as_deref().unwrap_or(DEFAULT_RUN_COMMAND);

		let host = self.host.clone();
		let lease = self.runtime.acquire(|| async move { host.boot().await }).await?;
		match self
			.start(lease.runtime(), ctx.files, &config.surface, install, run, &ctx.output)
			.await
		{
			Ok((server, forwarding)) => Ok(Arc::new(ContainerHandle {
				host: self.host.clone(),
				surface: config.surface.clone(),
				lease,
				server: Mutex::new(server),
				forwarding,
			})),
			Err(err) => {
				warn!(error = %err, "container.boot_failed");
				release(&lease).await;
				Err(err)
			}
		}
	}
}

struct ContainerHandle {
	host: Arc<dyn ContainerHost>,
	surface: String,
	lease: SharedLease<dyn Container>,
	server: Mutex<Box<dyn ContainerProcess>>,
	forwarding: JoinHandle<()>,
}

#[async_trait]
impl BackendHandle for ContainerHandle {
	async fn execute(&self, files: &FileStore) -> Result<Execution> {
		let dirty = files.dirty_contents();
		let container = self.lease.runtime();
		for (path, contents) in &dirty {
			container.write_file(&container_path(path), contents).await?;
		}
		self.host.reload(&self.surface).await?;
		debug!(written = dirty.len(), "container.execute");
		Ok(Execution {
			output: stream::empty().boxed(),
			committed: Some(dirty),
		})
	}

	async fn teardown(&self) {
		debug!("container.teardown");
		self.server.lock().await.kill().await;
		self.forwarding.abort();
		release(&self.lease).await;
	}
}
