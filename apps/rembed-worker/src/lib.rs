use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rembed_cache::CacheManager;
use rembed_service::{CancelFlag, HttpEmbeddingProvider, PgMemoryStore, RembedService};
use rembed_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = rembed_cli::VERSION,
	rename_all = "kebab",
	styles = rembed_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Only run discovery and print what a reconciliation would touch.
	#[arg(long)]
	pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct DryRunReport {
	target_dim: u32,
	discovered: u64,
	sampled: bool,
	by_dimension: BTreeMap<u32, u64>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = rembed_config::load(&args.config)?;

	init_tracing(&config)?;

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let cache = CacheManager::from_config(&config.cache, Some(db.pool.clone()))?;
	let store = Arc::new(PgMemoryStore::new(db));
	let service =
		RembedService::new(config, store, Arc::new(HttpEmbeddingProvider), Some(cache));
	let reconciler = service.reconciler();

	if args.dry_run {
		let discovery = reconciler.discover().await?;
		let report = DryRunReport {
			target_dim: reconciler.settings().target_dim,
			discovered: discovery.discovered(),
			sampled: discovery.sampled,
			by_dimension: discovery.by_dimension,
		};

		println!("{}", serde_json::to_string_pretty(&report)?);

		return Ok(());
	}

	let cancel = CancelFlag::new();
	let interrupt = cancel.clone();

	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::warn!("Interrupt received. Stopping after the current batch.");

			interrupt.cancel();
		}
	});

	match reconciler.run(&cancel).await {
		Ok(report) => {
			println!("{}", serde_json::to_string_pretty(&report)?);

			Ok(())
		},
		Err(failure) => {
			println!("{}", serde_json::to_string_pretty(&failure.report)?);

			Err(failure.into())
		},
	}
}

fn init_tracing(config: &rembed_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).try_init().map_err(|err| {
		color_eyre::eyre::eyre!("Failed to install tracing subscriber: {err}")
	})?;

	Ok(())
}
