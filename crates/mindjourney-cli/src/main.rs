//! `mj`, a command-line client for the MindJourney journal.
//!
//! # Usage
//!
//! ```text
//! mj login -u alice              # password from MJ_PASSWORD or --password
//! mj new "Visited Prague today" --public --suggest --wait
//! mj public --face 5
//! mj --config ~/.config/mindjourney/config.toml faces mine
//! ```

mod commands;
mod render;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use commands::Command;
use mindjourney_client::{Credentials, HttpBackend, SessionState};
use mindjourney_sync::Journal;
use settings::{Overrides, Settings};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mj", version, about = "Command-line client for the MindJourney journal")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// API root of the backend, e.g. http://localhost:8000/api.
  #[arg(long, global = true, value_name = "URL")]
  base_url: Option<String>,

  /// Where the bearer credential is stored.
  #[arg(long, global = true, value_name = "FILE")]
  token_path: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(cli.config.as_deref(), Overrides {
    base_url:   cli.base_url,
    token_path: cli.token_path,
  })?;

  let credentials = match &settings.client.token_path {
    Some(path) => Credentials::persisted(path)?,
    None => Credentials::in_memory(),
  };
  let needs_session = !matches!(cli.command, Command::Login { .. } | Command::Config);
  if needs_session && credentials.state() != SessionState::Authenticated {
    anyhow::bail!("not logged in; run `mj login`");
  }

  let backend = HttpBackend::new(&settings.client, credentials.clone())
    .context("failed to build HTTP client")?;
  let journal = Journal::new(backend, settings.sync);
  tracing::debug!(base_url = %settings.client.base_url, "client ready");

  let result = commands::run(cli.command, &journal, &settings).await;
  if credentials.state() == SessionState::Expired {
    return result.context("session expired; run `mj login`");
  }
  result
}
