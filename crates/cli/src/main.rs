//! Cannon command-line front end.
//!
//! Prints starter snapshots and runs snapshots for remote-runner languages.

mod commands;

use std::path::PathBuf;

use cannon_runner::Language;
use cannon_session::PlaygroundConfig;
use clap::{Parser, Subcommand};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "cannon")]
#[command(about = "Run code playground snapshots against a remote runner")]
struct Args {
	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print a starter snapshot for a language
	Template {
		/// Language wire name, e.g. `rust` or `python`
		language: Language,

		/// Runner endpoint for remote languages
		#[arg(long, value_name = "URL")]
		runner_url: Option<String>,
	},
	/// Run a snapshot once and print its output
	Run {
		/// Snapshot JSON file
		snapshot: PathBuf,

		/// Configuration file
		#[arg(long, value_name = "PATH", default_value = PlaygroundConfig::FILE_NAME)]
		config: PathBuf,

		/// Overrides the snapshot's runner endpoint
		#[arg(long, value_name = "URL")]
		runner_url: Option<String>,

		/// Drop `stderr:` lines from the printed output
		#[arg(long)]
		hide_stderr: bool,

		/// Write the snapshot with the new output here
		#[arg(long, value_name = "PATH")]
		save: Option<PathBuf>,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	match args.command {
		Command::Template { language, runner_url } => {
			setup_tracing(args.verbose, None);
			let snapshot = commands::template_snapshot(language, runner_url)?;
			println!("{}", snapshot.to_json()?);
		}
		Command::Run {
			snapshot,
			config,
			runner_url,
			hide_stderr,
			save,
		} => {
			let config = PlaygroundConfig::load(&config)?;
			setup_tracing(args.verbose, config.logging.filter.as_deref());
			info!(snapshot = %snapshot.display(), "starting cannon run");

			let mut loaded = commands::read_snapshot(&snapshot)?;
			commands::prepare_descriptor(&mut loaded.language_props, &config, runner_url)?;
			let backends = commands::remote_backends()?;
			let outcome = commands::run_snapshot(backends, loaded, hide_stderr, commands::stdout_printer()).await?;

			if let Some(path) = save {
				commands::write_snapshot(&path, &outcome)?;
				info!(path = %path.display(), "snapshot saved");
			}
		}
	}

	Ok(())
}

/// `CANNON_LOG` wins, then the configured filter, then the verbosity flag.
fn setup_tracing(verbose: bool, configured: Option<&str>) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("CANNON_LOG").unwrap_or_else(|_| match configured {
		Some(directive) => EnvFilter::new(directive),
		None if verbose => EnvFilter::new("cannon=debug,cannon_session=debug,cannon_runner=debug,info"),
		None => EnvFilter::new("cannon=info,cannon_session=info,cannon_runner=info,warn"),
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose)
		.init();
}
