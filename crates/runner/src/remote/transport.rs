//! HTTP transport for the remote runner protocol.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use indexmap::IndexMap;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use serde::Serialize;
use tracing::debug;

use crate::{Error, ImageBuilder, Language, Result};

/// Raw response body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// JSON body of a run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
	/// Every file in the session, `path -> content`.
	pub files: IndexMap<String, String>,
	/// Command override.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
	/// Wire name of the language.
	pub language: Language,
	/// Custom image build inputs.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image_build_args: Option<ImageBuilder>,
}

/// Sends run requests and hands back the streamed body.
#[async_trait]
pub trait RunnerTransport: Send + Sync {
	/// POSTs `request` to `url`. Non-success statuses are errors.
	async fn post(&self, url: &str, request: &RunRequest, disable_cache: bool) -> Result<ByteStream>;
}

/// [`RunnerTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: reqwest::Client,
}

impl HttpTransport {
	/// Connect timeout for run requests. The body itself may stream for as long
	/// as the program runs.
	pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

	/// Builds a transport with a fresh client.
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.connect_timeout(Self::CONNECT_TIMEOUT)
			.build()
			.map_err(|e| Error::Transport(e.to_string()))?;
		Ok(Self { client })
	}

	/// Uses an existing client.
	pub fn with_client(client: reqwest::Client) -> Self {
		Self { client }
	}
}

#[async_trait]
impl RunnerTransport for HttpTransport {
	async fn post(&self, url: &str, request: &RunRequest, disable_cache: bool) -> Result<ByteStream> {
		let mut builder = self
			.client
			.post(url)
			.header(ACCEPT, "application/json")
			.header(CONTENT_TYPE, "application/json")
			.body(serde_json::to_vec(request)?);
		if disable_cache {
			builder = builder.header(CACHE_CONTROL, "no-cache");
		}

		let response = builder.send().await.map_err(|e| Error::Transport(e.to_string()))?;
		let status = response.status();
		debug!(url, status = status.as_u16(), "remote.response");
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(Error::Status {
				status: status.as_u16(),
				body,
			});
		}

		Ok(response
			.bytes_stream()
			.map(|chunk| chunk.map_err(|e| Error::Transport(e.to_string())))
			.boxed())
	}
}
