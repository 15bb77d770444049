//! `cannon.toml` defaults for language descriptors.
//!
//! ```toml
//! [runner]
//! url = "https://runner.example/run"
//! disable_cache = true
//!
//! [runner.image_builder]
//! command = "docker build ."
//! files = { "Dockerfile" = "FROM rust" }
//!
//! [bundler]
//! external_resources = ["https://cdn.tailwindcss.com"]
//!
//! [container]
//! run_command = "npm run dev"
//!
//! [logging]
//! filter = "cannon=debug"
//! ```

use std::path::{Path, PathBuf};

use cannon_runner::{ImageBuilder, LanguageDescriptor};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
	/// The file is not valid TOML for this schema.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Remote runner defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerDefaults {
	/// Default `runnerUrl`.
	pub url: Option<String>,
	/// Default command override.
	pub command: Option<String>,
	/// Send `Cache-Control: no-cache`.
	pub disable_cache: bool,
	/// Custom image build inputs.
	pub image_builder: Option<ImageBuilderDefaults>,
}

/// `[runner.image_builder]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageBuilderDefaults {
	/// Build command.
	pub command: Option<String>,
	/// Build context files.
	pub files: IndexMap<String, String>,
}

/// Bundler sandbox defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundlerDefaults {
	/// Resources injected into the sandbox page.
	pub external_resources: Vec<String>,
	/// Self-hosted bundler.
	pub bundler_url: Option<String>,
}

/// Process container defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerDefaults {
	/// Start command.
	pub run_command: Option<String>,
	/// Install command.
	pub install_command: Option<String>,
}

/// Interpreter defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterDefaults {
	/// Interpreter distribution location.
	pub index_url: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
	/// `tracing` filter directive.
	pub filter: Option<String>,
}

/// Parsed `cannon.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaygroundConfig {
	/// `[runner]`
	pub runner: RunnerDefaults,
	/// `[bundler]`
	pub bundler: BundlerDefaults,
	/// `[container]`
	pub container: ContainerDefaults,
	/// `[interpreter]`
	pub interpreter: InterpreterDefaults,
	/// `[logging]`
	pub logging: LoggingConfig,
}

impl PlaygroundConfig {
	/// File name looked up by default.
	pub const FILE_NAME: &'static str = "cannon.toml";

	/// Parses configuration text.
	pub fn parse(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Loads configuration from a file. A missing file yields the defaults.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = match std::fs::read_to_string(path) {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(path = %path.display(), "config.missing");
				return Ok(Self::default());
			}
			Err(e) => {
				return Err(ConfigError::Io {
					path: path.to_path_buf(),
					error: e,
				});
			}
		};
		Self::parse(&content)
	}

	/// Fills descriptor fields left unset. Values already present win.
	pub fn apply(&self, descriptor: &mut LanguageDescriptor) {
		match descriptor {
			LanguageDescriptor::Rust(c) | LanguageDescriptor::Go(c) | LanguageDescriptor::MaelstromGo(c) => {
				let runner = &self.runner;
				if c.runner_url.trim().is_empty()
					&& let Some(url) = &runner.url
				{
					c.runner_url = url.clone();
				}
				if c.command.is_none() {
					c.command = runner.command.clone();
				}
				c.options.disable_cache |= runner.disable_cache;
				if c.options.image_builder.is_none() {
					c.options.image_builder = runner.image_builder.as_ref().map(|b| ImageBuilder {
						files: b.files.clone(),
						command: b.command.clone(),
					});
				}
			}
			LanguageDescriptor::Javascript(c) => {
				if c.external_resources.is_empty() {
					c.external_resources = self.bundler.external_resources.clone();
				}
				if c.bundler_url.is_none() {
					c.bundler_url = self.bundler.bundler_url.clone();
				}
			}
			LanguageDescriptor::JavascriptWebcontainer(c) => {
				if c.run_command.is_none() {
					c.run_command = self.container.run_command.clone();
				}
				if c.install_command.is_none() {
					c.install_command = self.container.install_command.clone();
				}
			}
			LanguageDescriptor::Python(c) => {
				if c.index_url.is_none() {
					c.index_url = self.interpreter.index_url.clone();
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use cannon_runner::{BundlerConfig, Language};
	use pretty_assertions::assert_eq;

	use super::*;

	const FULL: &str = r#"
[runner]
url = "https://runner.example/run"
command = "cargo run --release"
disable_cache = true

[runner.image_builder]
command = "docker build ."
files = { "Dockerfile" = "FROM rust" }

[bundler]
external_resources = ["https://cdn.tailwindcss.com"]

[container]
run_command = "npm run dev"

[logging]
filter = "cannon=debug"
"#;

	#[test]
	fn fills_unset_remote_fields() {
		let config = PlaygroundConfig::parse(FULL).unwrap();
		let mut descriptor = LanguageDescriptor::remote(Language::Rust, "").unwrap();
		config.apply(&mut descriptor);

		let remote = descriptor.as_remote().unwrap();
		assert_eq!(remote.runner_url, "https://runner.example/run");
		assert_eq!(remote.command.as_deref(), Some("cargo run --release"));
		assert!(remote.options.disable_cache);
		let builder = remote.options.image_builder.as_ref().unwrap();
		assert_eq!(builder.files.get("Dockerfile").map(String::as_str), Some("FROM rust"));
		assert_eq!(config.logging.filter.as_deref(), Some("cannon=debug"));
	}

	#[test]
	fn explicit_descriptor_values_win() {
		let config = PlaygroundConfig::parse(FULL).unwrap();
		let mut descriptor = LanguageDescriptor::remote(Language::Go, "https://mine.example").unwrap();
		descriptor.as_remote_mut().unwrap().command = Some("go run .".into());
		config.apply(&mut descriptor);

		let remote = descriptor.as_remote().unwrap();
		assert_eq!(remote.runner_url, "https://mine.example");
		assert_eq!(remote.command.as_deref(), Some("go run ."));

		let mut bundler = LanguageDescriptor::Javascript(BundlerConfig {
			surface: "preview".into(),
			external_resources: vec!["https://cdn.example/mine.css".into()],
			..Default::default()
		});
		config.apply(&mut bundler);
		let LanguageDescriptor::Javascript(bundler) = bundler else {
			unreachable!()
		};
		assert_eq!(bundler.external_resources, vec!["https://cdn.example/mine.css"]);
	}

	#[test]
	fn missing_file_yields_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = PlaygroundConfig::load(dir.path().join(PlaygroundConfig::FILE_NAME)).unwrap();
		assert_eq!(config, PlaygroundConfig::default());
	}

	#[test]
	fn malformed_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(PlaygroundConfig::FILE_NAME);
		std::fs::write(&path, "[runner]\nurl = 42\n").unwrap();
		assert!(matches!(PlaygroundConfig::load(&path), Err(ConfigError::Parse(_))));

		std::fs::write(&path, "[runer]\n").unwrap();
		assert!(matches!(PlaygroundConfig::load(&path), Err(ConfigError::Parse(_))));
	}
}
