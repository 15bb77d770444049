//! End-to-end session scenarios over the real adapters with fake engines.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cannon_primitives::{FileStore, Focus};
use cannon_runner::container::{Container, ContainerBackend, ContainerHost, ContainerProcess, FileTree, ServerReady};
use cannon_runner::interpreter::{Interpreter, InterpreterBackend, InterpreterLoader, StdStreams, Traceback};
use cannon_runner::remote::{ByteStream, RemoteBackend, RunRequest, RunnerTransport};
use cannon_runner::{Backends, ContainerConfig, InterpreterConfig, Language, LanguageDescriptor};
use cannon_session::{
	Error, PlaygroundConfig, ResetRequest, Session, SessionEvent, SessionInit, SessionStatus, TerminalOptions,
	TerminalView,
};
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use {indexmap as _, serde as _, serde_json as _, thiserror as _, toml as _, tracing as _};

struct EchoTransport {
	body: &'static str,
	requests: Mutex<Vec<RunRequest>>,
}

#[async_trait]
impl RunnerTransport for EchoTransport {
	async fn post(&self, _url: &str, request: &RunRequest, _disable_cache: bool) -> cannon_runner::Result<ByteStream> {
		self.requests.lock().push(request.clone());
		let chunks: Vec<cannon_runner::Result<Bytes>> = vec![Ok(Bytes::from_static(self.body.as_bytes()))];
		Ok(stream::iter(chunks).boxed())
	}
}

struct PrintInterpreter;

#[async_trait]
impl Interpreter for PrintInterpreter {
	async fn run(&self, _filename: &str, source: &str, streams: StdStreams) -> Result<(), Traceback> {
		streams.stdout(format!("{source}\n"));
		Ok(())
	}
}

struct Loader;

#[async_trait]
impl InterpreterLoader for Loader {
	async fn load(&self, _index_url: Option<&str>) -> cannon_runner::Result<Arc<dyn Interpreter>> {
		Ok(Arc::new(PrintInterpreter))
	}
}

struct FakeServer {
	output: Option<mpsc::UnboundedReceiver<String>>,
}

#[async_trait]
impl ContainerProcess for FakeServer {
	fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
		self.output.take()
	}

	async fn wait(&mut self) -> cannon_runner::Result<i32> {
		Ok(0)
	}

	async fn kill(&mut self) {}
}

#[derive(Default)]
struct FakeContainer {
	writes: Mutex<Vec<String>>,
}

#[async_trait]
impl Container for FakeContainer {
	async fn mount(&self, _tree: &FileTree) -> cannon_runner::Result<()> {
		Ok(())
	}

	async fn write_file(&self, path: &str, _contents: &str) -> cannon_runner::Result<()> {
		self.writes.lock().push(path.to_string());
		Ok(())
	}

	async fn spawn(&self, _program: &str, _args: &[String]) -> cannon_runner::Result<Box<dyn ContainerProcess>> {
		let (_tx, rx) = mpsc::unbounded_channel();
		Ok(Box::new(FakeServer { output: Some(rx) }))
	}

	async fn server_ready(&self) -> cannon_runner::Result<ServerReady> {
		Ok(ServerReady {
			port: 3000,
			url: "http://localhost:3000".into(),
		})
	}

	async fn teardown(&self) {}
}

struct FakeHost {
	container: Arc<FakeContainer>,
}

#[async_trait]
impl ContainerHost for FakeHost {
	async fn boot(&self) -> cannon_runner::Result<Arc<dyn Container>> {
		Ok(self.container.clone())
	}

	async fn show(&self, _surface: &str, _url: &str) -> cannon_runner::Result<()> {
		Ok(())
	}

	async fn reload(&self, _surface: &str) -> cannon_runner::Result<()> {
		Ok(())
	}
}

fn remote_backends(body: &'static str) -> (Backends, Arc<EchoTransport>) {
	let transport = Arc::new(EchoTransport {
		body,
		requests: Mutex::new(Vec::new()),
	});
	let backends = Backends::new()
		.with(Arc::new(RemoteBackend::new(transport.clone())))
		.with(Arc::new(InterpreterBackend::new(Arc::new(Loader))));
	(backends, transport)
}

#[tokio::test]
async fn remote_run_streams_into_buffer_and_events() {
	let (backends, transport) = remote_backends("hi\n");
	let descriptor = LanguageDescriptor::remote(Language::Rust, "https://runner.example/run").unwrap();
	let session = Session::start(
		backends,
		SessionInit::new(descriptor, FileStore::from_iter([("main", "print hi")])),
	)
	.await
	.unwrap();
	let mut events = session.events().subscribe();

	session.run().await.unwrap();

	assert_eq!(session.output(), "hi\n");
	let outputs: Vec<SessionEvent> = events
		.drain()
		.into_iter()
		.filter(|e| matches!(e, SessionEvent::Output { clear: false, .. }))
		.collect();
	assert_eq!(outputs, vec![SessionEvent::output("hi\n")]);
	assert_eq!(session.status(), SessionStatus::Ready);

	let request = transport.requests.lock()[0].clone();
	assert_eq!(request.language, Language::Rust);
	assert_eq!(request.files.get("main").map(String::as_str), Some("print hi"));
}

#[tokio::test]
async fn interpreter_rejects_multiple_files() {
	let (backends, _) = remote_backends("");
	let session = Session::start(
		backends,
		SessionInit::new(
			LanguageDescriptor::Python(InterpreterConfig::default()),
			FileStore::from_iter([("main.py", "print(1)"), ("util.py", "")]),
		),
	)
	.await
	.unwrap();

	let err = session.run().await.unwrap_err();
	assert!(err.to_string().contains("only one file supported"));
	assert_eq!(session.status(), SessionStatus::Ready);

	session.delete_file("util.py").unwrap();
	session.run().await.unwrap();
	assert_eq!(session.output(), "print(1)\n");
}

#[tokio::test]
async fn deleting_files_keeps_focus_valid() {
	let (backends, _) = remote_backends("");
	let descriptor = LanguageDescriptor::remote(Language::Go, "https://runner.example").unwrap();
	let session = Session::start(
		backends,
		SessionInit::new(descriptor, FileStore::from_iter([("a.go", ""), ("b.go", ""), ("c.go", "")]))
			.with_focus(Focus::file("b.go")),
	)
	.await
	.unwrap();

	session.delete_file("b.go").unwrap();
	assert_eq!(session.focus(), Some(Focus::file("a.go")));
	session.delete_file("a.go").unwrap();
	assert_eq!(session.focus(), Some(Focus::file("c.go")));
	assert!(matches!(session.delete_file("c.go"), Err(Error::Files(_))));
}

#[tokio::test]
async fn container_runs_commit_dirty_files() {
	let container = Arc::new(FakeContainer::default());
	let backends = Backends::new().with(Arc::new(ContainerBackend::new(Arc::new(FakeHost {
		container: container.clone(),
	}))));
	let descriptor = LanguageDescriptor::JavascriptWebcontainer(ContainerConfig {
		surface: "preview".into(),
		..Default::default()
	});
	let session = Session::start(
		backends,
		SessionInit::new(descriptor, FileStore::from_iter([("/index.js", "a"), ("/package.json", "{}")])),
	)
	.await
	.unwrap();

	session.update_file("/index.js", "b").unwrap();
	assert!(session.file("/index.js").unwrap().is_dirty());
	session.run().await.unwrap();

	assert!(!session.file("/index.js").unwrap().is_dirty());
	assert_eq!(*container.writes.lock(), vec!["index.js"]);

	session.run().await.unwrap();
	assert_eq!(container.writes.lock().len(), 1, "clean files are not rewritten");
}

#[tokio::test]
async fn terminal_view_tracks_runs_and_resets() {
	let (backends, _) = remote_backends("stdout: hello\nstderr: warning\n");
	let descriptor = LanguageDescriptor::remote(Language::Go, "https://runner.example").unwrap();
	let session = Session::start(
		backends,
		SessionInit::new(descriptor, FileStore::from_iter([("main.go", "package main")])),
	)
	.await
	.unwrap();
	let view = TerminalView::attach(session.events(), TerminalOptions::default().hide_stderr(true));

	session.run().await.unwrap();
	assert_eq!(view.rendered(), "hello\n");
	session.run().await.unwrap();
	assert_eq!(view.rendered(), "hello\n", "output is cleared between runs");

	session.reset(ResetRequest::Initial).await.unwrap();
	assert_eq!(view.raw(), "");
}

#[tokio::test]
async fn config_defaults_fill_the_descriptor() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("cannon.toml");
	std::fs::write(&path, "[runner]\nurl = \"https://runner.example/run\"\ncommand = \"go run .\"\n").unwrap();
	let config = PlaygroundConfig::load(&path).unwrap();

	let mut descriptor = LanguageDescriptor::remote(Language::Go, "").unwrap();
	config.apply(&mut descriptor);
	let (backends, transport) = remote_backends("ok\n");
	let session = Session::start(
		backends,
		SessionInit::new(descriptor, FileStore::from_iter([("main.go", "package main")])),
	)
	.await
	.unwrap();
	session.run().await.unwrap();

	assert_eq!(transport.requests.lock()[0].command.as_deref(), Some("go run ."));
}
