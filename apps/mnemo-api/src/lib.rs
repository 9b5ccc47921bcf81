pub mod routes;
pub mod state;

use std::{future, net::SocketAddr, path::PathBuf};

use clap::Parser;
use color_eyre::eyre;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = mnemo_cli::VERSION,
	rename_all = "kebab",
	styles = mnemo_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = mnemo_config::load(&args.config)?;

	init_tracing(&config)?;

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;

	if config.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}
	if !admin_addr.ip().is_loopback() {
		return Err(eyre::eyre!("admin_bind must be a loopback address."));
	}

	let (state, tracker) = AppState::new(config).await?;
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let tracker_task = tokio::spawn(tracker.run(shutdown_rx.clone()));
	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);

	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let http_server = axum::serve(http_listener, app)
		.with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	let admin_server = axum::serve(admin_listener, admin_app)
		.with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

	tokio::spawn(async move {
		listen_for_ctrl_c().await;

		let _ = shutdown_tx.send(true);
	});
	tokio::try_join!(http_server, admin_server)?;

	tracker_task.await?;

	tracing::info!("Servers stopped.");

	Ok(())
}

fn init_tracing(config: &mnemo_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}

async fn listen_for_ctrl_c() {
	match signal::ctrl_c().await {
		Ok(()) => tracing::info!("Shutdown signal received."),
		Err(err) => {
			tracing::error!(error = %err, "Failed to listen for the shutdown signal.");

			future::pending::<()>().await;
		},
	}
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}
