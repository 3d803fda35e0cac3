//! Bearer credential storage and session state.
//!
//! The credential optionally lives in a file so it survives restarts. Every
//! change is published on a [`tokio::sync::watch`] channel; front ends watch
//! for [`SessionState::Expired`] to route the user back to login.

use std::{
  fs,
  io,
  path::{Path, PathBuf},
  sync::{Arc, PoisonError, RwLock},
};

use tokio::sync::watch;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Authenticated,
  /// No credential, by user choice or because none was ever stored.
  LoggedOut,
  /// The backend rejected the credential with a 401; it has been discarded.
  Expired,
}

/// Shared handle to the current credential. Cheap to clone.
#[derive(Clone)]
pub struct Credentials {
  inner: Arc<Inner>,
}

struct Inner {
  token: RwLock<Option<String>>,
  path:  Option<PathBuf>,
  state: watch::Sender<SessionState>,
}

impl Credentials {
  /// A store that forgets the credential when the process exits.
  pub fn in_memory() -> Self { Self::build(None, None) }

  /// A store persisted at `path`, loading any credential already there.
  pub fn persisted(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let token = match fs::read_to_string(&path) {
      Ok(raw) => Some(raw.trim().to_owned()).filter(|t| !t.is_empty()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => None,
      Err(source) => return Err(ClientError::Credential { path, source }),
    };
    Ok(Self::build(token, Some(path)))
  }

  fn build(token: Option<String>, path: Option<PathBuf>) -> Self {
    let initial = if token.is_some() {
      SessionState::Authenticated
    } else {
      SessionState::LoggedOut
    };
    let (state, _) = watch::channel(initial);
    Self { inner: Arc::new(Inner { token: RwLock::new(token), path, state }) }
  }

  pub fn token(&self) -> Option<String> {
    self.inner.token.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn state(&self) -> SessionState { *self.inner.state.borrow() }

  pub fn subscribe(&self) -> watch::Receiver<SessionState> { self.inner.state.subscribe() }

  /// Store a freshly issued credential.
  pub fn set(&self, token: impl Into<String>) -> Result<()> {
    let token = token.into();
    if let Some(path) = &self.inner.path {
      write_token(path, &token)?;
    }
    *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    self.inner.state.send_replace(SessionState::Authenticated);
    Ok(())
  }

  /// Drop the credential, recording why.
  pub fn clear(&self, reason: SessionState) {
    *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    if let Some(path) = &self.inner.path
      && let Err(e) = fs::remove_file(path)
      && e.kind() != io::ErrorKind::NotFound
    {
      tracing::warn!(path = %path.display(), error = %e, "could not remove credential file");
    }
    self.inner.state.send_replace(reason);
  }
}

fn write_token(path: &Path, token: &str) -> Result<()> {
  let wrap = |source| ClientError::Credential { path: path.to_path_buf(), source };
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).map_err(wrap)?;
  }
  fs::write(path, token).map_err(wrap)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn persisted_token_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/token");

    let creds = Credentials::persisted(&path).unwrap();
    assert_eq!(creds.state(), SessionState::LoggedOut);
    creds.set("abc123").unwrap();

    let reloaded = Credentials::persisted(&path).unwrap();
    assert_eq!(reloaded.token().as_deref(), Some("abc123"));
    assert_eq!(reloaded.state(), SessionState::Authenticated);
  }

  #[test]
  fn clearing_removes_file_and_publishes_reason() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token");
    let creds = Credentials::persisted(&path).unwrap();
    creds.set("abc123").unwrap();
    let rx = creds.subscribe();

    creds.clear(SessionState::Expired);

    assert!(creds.token().is_none());
    assert!(!path.exists());
    assert_eq!(*rx.borrow(), SessionState::Expired);
  }
}
