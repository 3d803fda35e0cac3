//! Connection settings for the backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  /// API root, including any path prefix (e.g. `http://localhost:8000/api`).
  pub base_url:   String,
  pub timeout_ms: u64,
  /// Where the bearer credential is persisted between runs. `None` keeps it
  /// in memory only.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token_path: Option<PathBuf>,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url:   "http://localhost:8000/api".to_owned(),
      timeout_ms: 30_000,
      token_path: None,
    }
  }
}
