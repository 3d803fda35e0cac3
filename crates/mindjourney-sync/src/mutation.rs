//! Server-changing operations and their cache consequences.
//!
//! A mutation is identified by its [`ChangeKind`] and [`Target`]; only one
//! may be outstanding per pair. On success the coordinator seeds the cache
//! with the returned data and then invalidates everything the dependency
//! table names, the seeded keys included: the next read shows the seeded
//! value at once and confirms it with the server. On failure nothing in the
//! cache changes.

use std::{collections::HashSet, future::Future};

use mindjourney_core::{Error, Result};
use tokio::sync::watch;

use crate::{
  cache::QueryCache,
  deps::{ChangeKind, Target, invalidation_set},
  key::{CacheKey, KeyPattern},
  resource::Resource,
};

type Edit = Box<dyn FnOnce(&mut Resource) + Send>;

/// What a successful mutation does to the cache.
pub struct Effects {
  /// The entity the change ended up applying to (for creates, the new id).
  pub target:   Target,
  /// Values from the mutation response to store before invalidating.
  pub writes:   Vec<(CacheKey, Resource)>,
  /// In-place adjustments of values already cached.
  pub edits:    Vec<(CacheKey, Edit)>,
  /// Keys that no longer exist.
  pub removals: Vec<KeyPattern>,
}

impl Effects {
  pub fn on(target: Target) -> Self {
    Self { target, writes: Vec::new(), edits: Vec::new(), removals: Vec::new() }
  }

  pub fn write(mut self, key: CacheKey, value: Resource) -> Self {
    self.writes.push((key, value));
    self
  }

  pub fn edit(mut self, key: CacheKey, f: impl FnOnce(&mut Resource) + Send + 'static) -> Self {
    self.edits.push((key, Box::new(f)));
    self
  }

  pub fn remove(mut self, pattern: KeyPattern) -> Self {
    self.removals.push(pattern);
    self
  }
}

type Pending = HashSet<(ChangeKind, Target)>;

#[derive(Clone)]
pub struct MutationCoordinator {
  cache:   QueryCache<Resource>,
  pending: watch::Sender<Pending>,
}

impl MutationCoordinator {
  pub fn new(cache: QueryCache<Resource>) -> Self {
    Self { cache, pending: watch::Sender::new(HashSet::new()) }
  }

  pub fn is_pending(&self, kind: ChangeKind, target: Target) -> bool {
    self.pending.borrow().contains(&(kind, target))
  }

  /// Live view of every outstanding mutation.
  pub fn subscribe(&self) -> watch::Receiver<Pending> { self.pending.subscribe() }

  /// Run `op` as the `kind` mutation of `target`.
  ///
  /// Fails with [`Error::MutationPending`] without running `op` if the same
  /// mutation is already outstanding. `effects` is applied only if `op`
  /// succeeds; the returned value is then handed back to the caller for any
  /// follow-up.
  pub async fn run<T, Fut, E>(&self, kind: ChangeKind, target: Target, op: Fut, effects: E) -> Result<T>
  where
    Fut: Future<Output = Result<T>>,
    E: FnOnce(&T) -> Effects,
  {
    let _guard = self.begin(kind, target)?;
    tracing::debug!(%kind, %target, "mutation started");

    let value = match op.await {
      Ok(value) => value,
      Err(e) => {
        tracing::debug!(%kind, %target, error = %e, "mutation failed");
        return Err(e);
      }
    };

    let applied = effects(&value);
    self.apply(kind, applied);
    tracing::debug!(%kind, %target, "mutation applied");
    Ok(value)
  }

  fn begin(&self, kind: ChangeKind, target: Target) -> Result<PendingGuard<'_>> {
    let inserted = self.pending.send_if_modified(|set| set.insert((kind, target)));
    if !inserted {
      return Err(Error::MutationPending { kind: kind.as_str(), target: target.to_string() });
    }
    Ok(PendingGuard { pending: &self.pending, key: (kind, target) })
  }

  fn apply(&self, kind: ChangeKind, effects: Effects) {
    let Effects { target, writes, edits, removals } = effects;

    for (key, value) in writes {
      self.cache.write(key, value);
    }
    for (key, edit) in edits {
      self.cache.update(&key, edit);
    }
    // Removed keys are gone for good; re-fetching them would only 404.
    let mut removed = Vec::new();
    for pattern in &removals {
      removed.extend(self.cache.remove(pattern));
    }
    for pattern in invalidation_set(kind, target) {
      self.cache.invalidate_excluding(&pattern, &removed);
    }
  }
}

/// Clears the pending flag however the mutation ends.
struct PendingGuard<'a> {
  pending: &'a watch::Sender<Pending>,
  key:     (ChangeKind, Target),
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) { self.pending.send_if_modified(|set| set.remove(&self.key)); }
}
