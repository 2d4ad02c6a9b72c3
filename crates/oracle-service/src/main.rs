use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oracle_config::ConfigLoader;
use oracle_core::{OracleBuilder, RunMode};
use oracle_monitoring::tracing::{init_tracing, LogFormat, TracingConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;

#[derive(Parser)]
#[command(name = "oracle-coordinator")]
#[command(about = "Multi-source price oracle coordinator", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", env = "ORACLE_CONFIG", default_value = "config/oracle.toml")]
	config: PathBuf,

	/// Default filter when RUST_LOG is unset
	#[arg(long, env = "ORACLE_LOG_LEVEL", default_value = "info")]
	log_level: String,

	#[arg(long, default_value = "pretty", value_parser = parse_log_format)]
	log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the coordinator
	Start {
		/// full, coordinator or monitor
		#[arg(long, default_value = "full", value_parser = parse_run_mode)]
		mode: RunMode,
	},
	/// Validate the configuration file
	Validate,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
	value.parse()
}

fn parse_run_mode(value: &str) -> Result<RunMode, String> {
	value.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	init_tracing(
		TracingConfig::new()
			.with_level(cli.log_level.clone())
			.with_format(cli.log_format),
	)
	.map_err(|e| anyhow::anyhow!(e))
	.context("Failed to initialize tracing")?;

	match cli.command {
		Some(Commands::Start { mode }) => start_service(&cli.config, mode).await,
		None => start_service(&cli.config, RunMode::Full).await,
		Some(Commands::Validate) => validate_config(&cli.config).await,
	}
}

async fn start_service(path: &Path, mode: RunMode) -> Result<()> {
	let config = ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Oracle name: {}", config.oracle.name);
	info!("Pairs: {}", config.pairs.len());
	info!("Dry run: {}, offline: {}", config.oracle.dry_run, config.oracle.offline);

	let api_config = config.api.clone();
	let engine = Arc::new(
		OracleBuilder::new(config)
			.build()
			.context("Failed to build oracle engine")?,
	);

	let http_handle = if api_config.enabled {
		let server = api::ApiServer::new(api_config.host, api_config.port, engine.clone());
		Some(tokio::spawn(async move {
			if let Err(e) = server.run().await {
				error!("API server stopped: {}", e);
			}
		}))
	} else {
		None
	};

	let runner = engine.clone();
	let mut engine_handle = tokio::spawn(async move { runner.run(mode).await });

	let finished = tokio::select! {
		_ = shutdown_signal() => None,
		result = &mut engine_handle => Some(result),
	};
	let result = match finished {
		Some(result) => result.context("Engine task failed")?,
		None => {
			info!("Shutdown signal received, stopping loops...");
			if let Err(e) = engine.shutdown().await {
				warn!("Engine was not running: {}", e);
			}
			engine_handle.await.context("Engine task failed")?
		}
	};

	if let Some(handle) = http_handle {
		handle.abort();
	}

	result.context("Oracle engine failed")?;
	info!("Oracle coordinator stopped");
	Ok(())
}

async fn validate_config(path: &Path) -> Result<()> {
	info!("Validating configuration file: {:?}", path);

	let config = ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Oracle name: {}", config.oracle.name);
	info!("Sources: {}", config.sources.enabled.join(", "));
	info!("Delivery backend: {}", config.delivery.backend);
	info!("Storage backend: {}", config.storage.backend);
	for pair in &config.pairs {
		info!(
			"  {}: min {} sources, channels [{}]",
			pair.key(),
			pair.min_sources,
			pair.channels.join(", ")
		);
	}

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
