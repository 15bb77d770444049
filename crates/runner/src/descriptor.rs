//! Language descriptors: which backend runs a session and how it is configured.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Closed set of execution engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
	/// Remote sandboxed compile/run service.
	Remote,
	/// JS bundler sandbox.
	Bundler,
	/// Node-like process container.
	Container,
	/// Python interpreter.
	Interpreter,
}

impl BackendKind {
	/// Stable lowercase name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Remote => "remote",
			Self::Bundler => "bundler",
			Self::Container => "container",
			Self::Interpreter => "interpreter",
		}
	}
}

impl std::fmt::Display for BackendKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Playground languages. The wire name doubles as the remote runner's `language` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
	/// Rust on the remote runner.
	Rust,
	/// Go on the remote runner.
	Go,
	/// Go with the Maelstrom harness on the remote runner.
	MaelstromGo,
	/// JavaScript in the bundler sandbox.
	Javascript,
	/// JavaScript in the process container.
	JavascriptWebcontainer,
	/// Python in the interpreter.
	Python,
}

impl Language {
	/// Every language, in display order.
	pub const ALL: [Self; 6] = [
		Self::Rust,
		Self::Go,
		Self::MaelstromGo,
		Self::Javascript,
		Self::JavascriptWebcontainer,
		Self::Python,
	];

	/// Wire name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Rust => "rust",
			Self::Go => "go",
			Self::MaelstromGo => "maelstrom_go",
			Self::Javascript => "javascript",
			Self::JavascriptWebcontainer => "javascript_webcontainer",
			Self::Python => "python",
		}
	}

	/// Backend that runs this language.
	pub const fn backend(self) -> BackendKind {
		match self {
			Self::Rust | Self::Go | Self::MaelstromGo => BackendKind::Remote,
			Self::Javascript => BackendKind::Bundler,
			Self::JavascriptWebcontainer => BackendKind::Container,
			Self::Python => BackendKind::Interpreter,
		}
	}
}

impl std::fmt::Display for Language {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Language {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::ALL
			.into_iter()
			.find(|lang| lang.as_str() == s)
			.ok_or_else(|| Error::Config(format!("unknown language `{s}`")))
	}
}

/// Extra files and command used by the remote runner to build a custom image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuilder {
	/// Files placed in the image build context.
	#[serde(default)]
	pub files: IndexMap<String, String>,
	/// Build command.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
}

/// Options forwarded to the remote runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOptions {
	/// Sent as `image_build_args`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image_builder: Option<ImageBuilder>,
	/// Adds `Cache-Control: no-cache` to run requests.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub disable_cache: bool,
}

/// Remote runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
	/// Endpoint receiving run requests.
	pub runner_url: String,
	/// Command override; the runner picks a per-language default otherwise.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
	/// Build and cache options.
	#[serde(default)]
	pub options: RemoteOptions,
}

/// Bundler sandbox configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerConfig {
	/// Rendering surface the sandbox attaches to.
	pub surface: String,
	/// Bundle entry point. Defaults to `/index.js`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub entry: Option<String>,
	/// Stylesheets and scripts injected into the sandbox page.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub external_resources: Vec<String>,
	/// Self-hosted bundler location.
	#[serde(default, rename = "bundlerURL", skip_serializing_if = "Option::is_none")]
	pub bundler_url: Option<String>,
}

/// Process container configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
	/// Rendering surface showing the served page.
	pub surface: String,
	/// Start command. Defaults to `npm start`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub run_command: Option<String>,
	/// Dependency install command. Defaults to `npm install`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub install_command: Option<String>,
}

/// Interpreter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
	/// Where the interpreter distribution is loaded from.
	#[serde(default, rename = "indexURL", skip_serializing_if = "Option::is_none")]
	pub index_url: Option<String>,
}

/// Language selection plus the fields meaningful to its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "language", rename_all = "snake_case")]
pub enum LanguageDescriptor {
	/// Rust on the remote runner.
	Rust(RemoteConfig),
	/// Go on the remote runner.
	Go(RemoteConfig),
	/// Maelstrom Go on the remote runner.
	MaelstromGo(RemoteConfig),
	/// JavaScript in the bundler sandbox.
	Javascript(BundlerConfig),
	/// JavaScript in the process container.
	JavascriptWebcontainer(ContainerConfig),
	/// Python in the interpreter.
	Python(InterpreterConfig),
}

impl LanguageDescriptor {
	/// Builds a remote descriptor for a remote-capable language.
	pub fn remote(language: Language, runner_url: impl Into<String>) -> Result<Self> {
		let config = RemoteConfig {
			runner_url: runner_url.into(),
			command: None,
			options: RemoteOptions::default(),
		};
		match language {
			Language::Rust => Ok(Self::Rust(config)),
			Language::Go => Ok(Self::Go(config)),
			Language::MaelstromGo => Ok(Self::MaelstromGo(config)),
			other => Err(Error::Config(format!("{other} does not run on the remote backend"))),
		}
	}

	/// The selected language.
	pub fn language(&self) -> Language {
		match self {
			Self::Rust(_) => Language::Rust,
			Self::Go(_) => Language::Go,
			Self::MaelstromGo(_) => Language::MaelstromGo,
			Self::Javascript(_) => Language::Javascript,
			Self::JavascriptWebcontainer(_) => Language::JavascriptWebcontainer,
			Self::Python(_) => Language::Python,
		}
	}

	/// Backend that must run this descriptor.
	pub fn backend_kind(&self) -> BackendKind {
		self.language().backend()
	}

	/// Remote configuration, if this is a remote language.
	pub fn as_remote(&self) -> Option<&RemoteConfig> {
		match self {
			Self::Rust(c) | Self::Go(c) | Self::MaelstromGo(c) => Some(c),
			_ => None,
		}
	}

	/// Mutable remote configuration.
	pub fn as_remote_mut(&mut self) -> Option<&mut RemoteConfig> {
		match self {
			Self::Rust(c) | Self::Go(c) | Self::MaelstromGo(c) => Some(c),
			_ => None,
		}
	}

	/// Checks required fields. Configuration errors are never defaulted away.
	pub fn validate(&self) -> Result<()> {
		match self {
			Self::Rust(c) | Self::Go(c) | Self::MaelstromGo(c) => {
				validate_url("runnerUrl", &c.runner_url)?;
				if c.command.as_deref().is_some_and(|cmd| cmd.trim().is_empty()) {
					return Err(Error::Config("command must not be blank".into()));
				}
				Ok(())
			}
			Self::Javascript(c) => {
				require("surface", &c.surface)?;
				if let Some(bundler) = &c.bundler_url {
					validate_url("bundlerURL", bundler)?;
				}
				Ok(())
			}
			Self::JavascriptWebcontainer(c) => {
				require("surface", &c.surface)?;
				for (field, cmd) in [("runCommand", &c.run_command), ("installCommand", &c.install_command)] {
					if cmd.as_deref().is_some_and(|cmd| cmd.trim().is_empty()) {
						return Err(Error::Config(format!("{field} must not be blank")));
					}
				}
				Ok(())
			}
			Self::Python(c) => match &c.index_url {
				Some(index) => validate_url("indexURL", index),
				None => Ok(()),
			},
		}
	}
}

fn require(field: &str, value: &str) -> Result<()> {
	if value.trim().is_empty() {
		return Err(Error::Config(format!("{field} is required")));
	}
	Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<()> {
	require(field, value)?;
	let parsed = url::Url::parse(value).map_err(|e| Error::Config(format!("{field} `{value}` is not a valid URL: {e}")))?;
	match parsed.scheme() {
		"http" | "https" => Ok(()),
		scheme => Err(Error::Config(format!("{field} must use http or https, got `{scheme}`"))),
	}
}
