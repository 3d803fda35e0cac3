//! Error type for constructing the gateway.
//!
//! Request failures are reported as [`mindjourney_core::Error`]; this type
//! only covers setup problems.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("failed to build HTTP client: {0}")]
  Build(#[from] reqwest::Error),

  #[error("base URL must start with http:// or https://, got {0:?}")]
  InvalidBaseUrl(String),

  #[error("credential file {path:?}: {source}")]
  Credential {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
