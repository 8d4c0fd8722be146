//! duostreak server binary.
//!
//! Reads `duostreak.toml` (or the path given with `--config`), opens the
//! per-guild SQLite stores, starts the tick loop and serves the JSON API.
//! Ctrl-C stops accepting requests, lets the in-flight tick finish and
//! closes every guild database.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use duostreak_server::Settings;
use duostreak_store_sqlite::GuildStores;
use duostreak_tracker::Tracker;
use tokio::{net::TcpListener, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Duo voice co-presence streak tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "duostreak.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config).context("failed to read configuration")?;
  let defaults = settings.guild_defaults().context("invalid configuration")?;

  let data_dir = settings.data_dir();
  let store = Arc::new(
    GuildStores::open_dir(&data_dir)
      .await
      .with_context(|| format!("failed to open data directory {data_dir:?}"))?,
  );

  let tracker = Arc::new(Tracker::new(Arc::clone(&store), defaults, settings.afk_policy()));
  let (stop, shutdown) = watch::channel(false);
  let ticks = tokio::spawn(Arc::clone(&tracker).run(settings.tick_period(), shutdown));

  let app = duostreak_server::app(tracker);
  let address = settings.address();

  tracing::info!(data_dir = ?data_dir, "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(ctrl_c())
    .await
    .context("server error")?;

  stop.send_replace(true);
  ticks.await.context("tick loop panicked")?;
  store.close_all().await.context("failed to close guild databases")?;
  tracing::info!("shut down cleanly");

  Ok(())
}

/// Resolve on Ctrl-C. If the handler cannot be installed, never resolve.
async fn ctrl_c() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown requested");
}
