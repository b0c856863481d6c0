//! fable-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the story API over HTTP, with the
//! tick scheduler running in-process unless disabled.
//!
//! # Quarantine
//!
//! When a corrupt current-story record blocks every tick, move it aside for
//! inspection and exit:
//!
//! ```
//! fable-server --quarantine-current
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use fable_core::{lifecycle::LifecycleManager, repository::StoryRepository};
use fable_server::{
  ServerConfig, app, broadcast::WebhookBroadcast, scheduler::TickScheduler,
  source::HttpCandidateSource,
};
use fable_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "fable story coordination server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Move a corrupt current-story record aside for inspection and exit.
  #[arg(long)]
  quarantine_current: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FABLE"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let story_settings = Arc::new(server_cfg.story.clone());
  let repo = Arc::new(StoryRepository::new(store, story_settings.clone()));

  // Maintenance mode: park the current record and exit.
  if cli.quarantine_current {
    match repo.quarantine_current(Utc::now()).await? {
      Some(key) => println!("current story record moved to {key}"),
      None => println!("no current story record to quarantine"),
    }
    return Ok(());
  }

  let source = HttpCandidateSource::new(
    server_cfg.candidate_feed_url.clone(),
    Duration::from_secs(server_cfg.fetch_timeout_secs),
  )
  .context("failed to build candidate feed client")?;
  let broadcast = WebhookBroadcast::new(server_cfg.webhook_url.clone())
    .context("failed to build webhook client")?;
  let manager = Arc::new(LifecycleManager::new(
    repo,
    source,
    broadcast,
    story_settings,
  ));

  if server_cfg.scheduler {
    TickScheduler::new(manager.clone()).spawn();
  }

  let app = app(manager);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
