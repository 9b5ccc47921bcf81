use std::{
	fs,
	path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre};
use serde::Serialize;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use mnemo_config::Config;
use mnemo_service::manifest::{self, Manifest, ParityReport};
use mnemo_storage::{graph::Neo4jStore, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = mnemo_cli::VERSION,
	rename_all = "kebab",
	styles = mnemo_cli::styles(),
)]
struct Args {
	#[arg(long, short = 'c', value_name = "FILE", global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "kebab")]
enum Command {
	/// Reads schema parameters from the live backends and writes a manifest.
	Generate {
		#[arg(long, value_name = "SHA")]
		commit: String,
		#[arg(long, value_name = "FILE")]
		out: Option<PathBuf>,
	},
	/// Writes the reference manifest declared by the configuration.
	Lock {
		#[arg(long, value_name = "SHA")]
		commit: String,
		#[arg(long, value_name = "FILE")]
		out: Option<PathBuf>,
	},
	/// Compares a manifest with the lock and fails on any mismatch.
	Check {
		#[arg(long, value_name = "FILE")]
		lock: PathBuf,
		/// Previously generated manifest. The live backends are read when omitted.
		#[arg(long, value_name = "FILE")]
		manifest: Option<PathBuf>,
		#[arg(long, value_name = "FILE")]
		out: Option<PathBuf>,
	},
}

#[derive(Debug, Serialize)]
struct CheckReport {
	config_path: String,
	lock_path: String,
	lock_commit: String,
	manifest_commit: String,
	#[serde(flatten)]
	parity: ParityReport,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let args = Args::parse();
	let config_path = args.config.ok_or_else(|| eyre::eyre!("--config is required."))?;
	let cfg = mnemo_config::load(&config_path)?;
	let filter =
		EnvFilter::try_new(&cfg.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	match args.command {
		Command::Generate { commit, out } => {
			let manifest = live_manifest(&cfg, &commit).await?;

			write_json(&manifest, out.as_deref())
		},
		Command::Lock { commit, out } => {
			let manifest = manifest::build_reference(&cfg, &commit, OffsetDateTime::now_utc())?;

			tracing::info!(commit = %manifest.commit, "Built reference manifest.");

			write_json(&manifest, out.as_deref())
		},
		Command::Check { lock, manifest, out } => {
			let lock_manifest = read_manifest(&lock)?;
			let current = match &manifest {
				Some(path) => read_manifest(path)?,
				None => live_manifest(&cfg, &lock_manifest.commit).await?,
			};
			let parity = manifest::check_parity(&current, &lock_manifest);
			let report = CheckReport {
				config_path: config_path.display().to_string(),
				lock_path: lock.display().to_string(),
				lock_commit: lock_manifest.commit.clone(),
				manifest_commit: current.commit.clone(),
				parity,
			};

			write_json(&report, out.as_deref())?;

			if !report.parity.passed {
				tracing::error!(
					mismatch_count = report.parity.mismatches.len(),
					"Manifest parity check failed."
				);

				return Err(eyre::eyre!(
					"Manifest parity check failed with {} mismatch(es).",
					report.parity.mismatches.len()
				));
			}

			tracing::info!("Manifest parity check passed.");

			Ok(())
		},
	}
}

async fn live_manifest(cfg: &Config, commit: &str) -> Result<Manifest> {
	let vector = QdrantStore::new(&cfg.backends.vector)?;
	let graph = Neo4jStore::new(&cfg.backends.graph)?;

	Ok(manifest::generate_from(cfg, &vector, &graph, commit, OffsetDateTime::now_utc()).await?)
}

fn read_manifest(path: &Path) -> Result<Manifest> {
	let raw = fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read manifest {}: {err}.", path.display()))?;

	serde_json::from_str(&raw)
		.map_err(|err| eyre::eyre!("Failed to parse manifest {}: {err}.", path.display()))
}

fn write_json<T>(value: &T, out: Option<&Path>) -> Result<()>
where
	T: Serialize,
{
	let json = serde_json::to_string_pretty(value)?;

	if let Some(out_path) = out {
		fs::write(out_path, &json)?;
	} else {
		println!("{json}");
	}

	Ok(())
}
