//! Error taxonomy shared by every layer of the client.
//!
//! The type is `Clone` so that one fetch outcome can be handed to every
//! caller waiting on the same cache key.

use thiserror::Error;

/// A client-side validation failure. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("entry content is required")]
  EmptyContent,

  #[error("face name is required")]
  EmptyFaceName,

  #[error("category name is required")]
  EmptyCategoryName,

  #[error("search query is required")]
  EmptySearchQuery,

  #[error("document {0:?} is empty")]
  EmptyDocument(String),

  #[error("document {filename:?} is {size} bytes, over the upload limit")]
  DocumentTooLarge { filename: String, size: usize },
}

#[derive(Debug, Clone, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(#[from] ValidationError),

  /// The credential is missing or was rejected (HTTP 401).
  #[error("not authenticated")]
  Auth,

  #[error("not found: {0}")]
  NotFound(String),

  /// Timeouts, connection failures and 5xx responses.
  #[error("transient backend failure: {0}")]
  Transient(String),

  /// Concurrent edits are last-write-wins; this is only raised when the
  /// backend itself answers 409.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("rejected by backend: {0}")]
  BadRequest(String),

  #[error("unexpected HTTP status {status}: {message}")]
  Http { status: u16, message: String },

  #[error("could not decode response: {0}")]
  Decode(String),

  #[error("a {kind} mutation for {target} is already in flight")]
  MutationPending { kind: &'static str, target: String },

  /// The task producing a shared result went away before completing.
  #[error("request cancelled")]
  Cancelled,
}

impl Error {
  /// Whether a user-initiated retry could plausibly succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Transient(_) | Self::Cancelled)
  }

  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

  pub fn is_auth(&self) -> bool { matches!(self, Self::Auth) }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self { Self::Decode(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
