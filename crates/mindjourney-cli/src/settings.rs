//! Layered configuration: defaults, then the TOML file, then `MJ_*`
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use mindjourney_client::ClientConfig;
use mindjourney_sync::SyncConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = "~/.config/mindjourney/config.toml";
const DEFAULT_TOKEN: &str = "~/.config/mindjourney/token";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub client: ClientConfig,
  pub sync:   SyncConfig,
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Default)]
pub struct Overrides {
  pub base_url:   Option<String>,
  pub token_path: Option<PathBuf>,
}

impl Settings {
  pub fn load(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Self> {
    let path = expand_tilde(path.unwrap_or(Path::new(DEFAULT_CONFIG)));

    // `MJ_CLIENT__BASE_URL` maps to `client.base_url`.
    let layered = config::Config::builder()
      .add_source(config::File::from(path.as_path()).required(false))
      .add_source(config::Environment::with_prefix("MJ").prefix_separator("_").separator("__"))
      .build()
      .with_context(|| format!("failed to read configuration from {}", path.display()))?;

    let mut settings: Settings =
      layered.try_deserialize().context("failed to deserialise configuration")?;

    if let Some(url) = overrides.base_url {
      settings.client.base_url = url;
    }
    let token = overrides
      .token_path
      .or(settings.client.token_path.take())
      .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN));
    settings.client.token_path = Some(expand_tilde(&token));
    Ok(settings)
  }

  /// The effective configuration as TOML.
  pub fn to_toml(&self) -> anyhow::Result<String> {
    toml::to_string_pretty(self).context("failed to serialise configuration")
  }
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
