//! Remote compile/run service adapter.
//!
//! Booting only records configuration; every run is one POST whose streamed
//! body becomes the output.

mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use cannon_primitives::FileStore;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info};

pub use transport::{ByteStream, HttpTransport, RunRequest, RunnerTransport};

use crate::{
	Backend, BackendHandle, BackendKind, BootContext, Error, Execution, Language, OutputStream, RemoteConfig, Result,
	Utf8StreamDecoder,
};

/// Adapter for the remote runner.
pub struct RemoteBackend {
	transport: Arc<dyn RunnerTransport>,
}

impl RemoteBackend {
	/// Creates an adapter sending requests through `transport`.
	pub fn new(transport: Arc<dyn RunnerTransport>) -> Self {
		Self { transport }
	}

	/// Creates an adapter using [`HttpTransport`].
	pub fn http() -> Result<Self> {
		Ok(Self::new(Arc::new(HttpTransport::new()?)))
	}
}

#[async_trait]
impl Backend for RemoteBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Remote
	}

	async fn boot(&self, ctx: BootContext<'_>) -> Result<Arc<dyn BackendHandle>> {
		ctx.descriptor.validate()?;
		let config = ctx
			.descriptor
			.as_remote()
			.ok_or_else(|| Error::Config(format!("{} is not a remote language", ctx.descriptor.language())))?;
		info!(language = %ctx.descriptor.language(), url = %config.runner_url, "remote.boot");
		Ok(Arc::new(RemoteHandle {
			transport: self.transport.clone(),
			language: ctx.descriptor.language(),
			config: config.clone(),
		}))
	}
}

struct RemoteHandle {
	transport: Arc<dyn RunnerTransport>,
	language: Language,
	config: RemoteConfig,
}

impl RemoteHandle {
	fn request(&self, files: &FileStore) -> RunRequest {
		RunRequest {
			files: files.contents(),
			command: self.config.command.clone(),
			language: self.language,
			image_build_args: self.config.options.image_builder.clone(),
		}
	}
}

#[async_trait]
impl BackendHandle for RemoteHandle {
	async fn execute(&self, files: &FileStore) -> Result<Execution> {
		let request = self.request(files);
		debug!(files = request.files.len(), language = %self.language, "remote.execute");
		let body = self
			.transport
			.post(&self.config.runner_url, &request, self.config.options.disable_cache)
			.await?;
		Ok(Execution::streaming(decode_body(body)))
	}

	async fn teardown(&self) {
		debug!(language = %self.language, "remote.teardown");
	}
}

/// Turns body bytes into text chunks, one per non-empty decoded read.
fn decode_body(body: ByteStream) -> OutputStream {
	stream::unfold(Some((body, Utf8StreamDecoder::new())), |state| async move {
		let (mut body, mut decoder) = state?;
		loop {
			match body.next().await {
				Some(Ok(bytes)) => {
					let text = decoder.push(&bytes);
					if !text.is_empty() {
						return Some((Ok(text), Some((body, decoder))));
					}
				}
				Some(Err(err)) => return Some((Err(err), None)),
				None => {
					let tail = decoder.finish();
					return (!tail.is_empty()).then_some((Ok(tail), None));
				}
			}
		}
	})
	.boxed()
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::LanguageDescriptor;

	#[derive(Default)]
	struct RecordingTransport {
		requests: Mutex<Vec<(String, RunRequest, bool)>>,
		chunks: Vec<&'static [u8]>,
	}

	#[async_trait]
	impl RunnerTransport for RecordingTransport {
		async fn post(&self, url: &str, request: &RunRequest, disable_cache: bool) -> Result<ByteStream> {
			self.requests
				.lock()
				.push((url.to_string(), request.clone(), disable_cache));
			let chunks: Vec<Result<bytes::Bytes>> = self
				.chunks
				.iter()
				.map(|c| Ok(bytes::Bytes::from_static(c)))
				.collect();
			Ok(stream::iter(chunks).boxed())
		}
	}

	async fn run(transport: Arc<RecordingTransport>, descriptor: LanguageDescriptor, files: &FileStore) -> Vec<String> {
		let backend = RemoteBackend::new(transport);
		let handle = backend
			.boot(BootContext {
				files,
				descriptor: &descriptor,
				output: crate::OutputSink::discard(),
			})
			.await
			.unwrap();
		let execution = handle.execute(files).await.unwrap();
		assert!(execution.committed.is_none());
		execution
			.output
			.map(|chunk| chunk.unwrap())
			.collect()
			.await
	}

	#[tokio::test]
	async fn posts_files_command_and_language() {
		let transport = Arc::new(RecordingTransport {
			chunks: vec![b"stdout: hi\n"],
			..Default::default()
		});
		let mut descriptor = LanguageDescriptor::remote(Language::Go, "https://runner.example/run").unwrap();
		let config = descriptor.as_remote_mut().unwrap();
		config.command = Some("go run .".into());
		config.options.disable_cache = true;
		config.options.image_builder = Some(crate::ImageBuilder {
			files: [("Dockerfile".to_string(), "FROM golang".to_string())].into_iter().collect(),
			command: None,
		});
		let files = FileStore::from_iter([("main.go", "package main")]);

		let output = run(transport.clone(), descriptor, &files).await;
		assert_eq!(output, vec!["stdout: hi\n"]);

		let requests = transport.requests.lock();
		let (url, request, disable_cache) = &requests[0];
		assert_eq!(url, "https://runner.example/run");
		assert!(*disable_cache);
		let body = serde_json::to_value(request).unwrap();
		assert_eq!(
			body,
			serde_json::json!({
				"files": { "main.go": "package main" },
				"command": "go run .",
				"language": "go",
				"image_build_args": { "files": { "Dockerfile": "FROM golang" } },
			})
		);
	}

	#[tokio::test]
	async fn optional_fields_are_omitted() {
		let transport = Arc::new(RecordingTransport::default());
		let descriptor = LanguageDescriptor::remote(Language::Rust, "https://runner.example").unwrap();
		let files = FileStore::from_iter([("src/main.rs", "fn main() {}")]);

		assert!(run(transport.clone(), descriptor, &files).await.is_empty());
		let body = serde_json::to_value(&transport.requests.lock()[0].1).unwrap();
		assert_eq!(body, serde_json::json!({ "files": { "src/main.rs": "fn main() {}" }, "language": "rust" }));
	}

	#[tokio::test]
	async fn multibyte_characters_survive_chunk_splits() {
		let transport = Arc::new(RecordingTransport {
			chunks: vec![b"caf\xc3", b"\xa9\n"],
			..Default::default()
		});
		let descriptor = LanguageDescriptor::remote(Language::Rust, "https://runner.example").unwrap();
		let files = FileStore::from_iter([("src/main.rs", "")]);

		assert_eq!(run(transport, descriptor, &files).await, vec!["caf", "é\n"]);
	}

	#[tokio::test]
	async fn boot_rejects_non_remote_descriptors() {
		let backend = RemoteBackend::new(Arc::new(RecordingTransport::default()));
		let descriptor = LanguageDescriptor::Python(Default::default());
		let files = FileStore::from_iter([("main.py", "")]);
		let err = backend
			.boot(BootContext {
				files: &files,
				descriptor: &descriptor,
				output: crate::OutputSink::discard(),
			})
			.await
			.err()
			.unwrap();
		assert!(matches!(err, Error::Config(_)));
	}
}
