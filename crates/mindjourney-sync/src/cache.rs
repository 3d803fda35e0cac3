//! [`QueryCache`], the keyed store of server-derived data.
//!
//! - At most one load is in flight per key; concurrent callers attach to the
//!   pending result instead of issuing their own request.
//! - Invalidation marks matching keys stale, notifies listeners, and
//!   re-fetches keys that currently have an observer with a loader. A load
//!   already in flight stays the only one: its result lands stale and the
//!   observed key is re-fetched once it has settled.
//! - A failed load never removes data: the last good value stays readable,
//!   marked with the error.
//! - Versioned values (see [`CacheValue::version`]) are never replaced by an
//!   older version, whatever order responses arrive in.

use std::{
  collections::{HashMap, HashSet},
  future::Future,
  pin::Pin,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use mindjourney_core::{Error, Result};
use tokio::{
  sync::{mpsc, watch},
  time::Instant,
};

use crate::key::{CacheKey, KeyPattern};

pub type BoxFuture<V> = Pin<Box<dyn Future<Output = Result<V>> + Send>>;

/// A re-usable loader, kept by observers so invalidation can re-fetch.
pub type Loader<V> = Arc<dyn Fn() -> BoxFuture<V> + Send + Sync>;

pub trait CacheValue: Clone + Send + Sync + 'static {
  /// Server-assigned version, if any. Later versions win.
  fn version(&self) -> Option<DateTime<Utc>> { None }
}

/// A snapshot of one cached key.
#[derive(Debug, Clone)]
pub struct Cached<V> {
  pub value:      V,
  /// Invalidated since it was fetched; shown, but due for a re-fetch.
  pub stale:      bool,
  pub fetched_at: Instant,
  /// The most recent load failure, if it happened after `fetched_at`.
  pub last_error: Option<Error>,
}

/// Sent to a key's listeners.
#[derive(Debug, Clone)]
pub enum CacheEvent {
  Updated,
  Invalidated,
  Removed,
  Failed(Error),
}

type Outcome<V> = Option<Result<V>>;

struct Inflight<V> {
  rx: watch::Receiver<Outcome<V>>,
}

struct Listener<V> {
  id:     u64,
  tx:     mpsc::UnboundedSender<CacheEvent>,
  loader: Option<Loader<V>>,
}

struct State<V> {
  slots:         HashMap<CacheKey, Cached<V>>,
  inflight:      HashMap<CacheKey, Inflight<V>>,
  epochs:        HashMap<CacheKey, u64>,
  listeners:     HashMap<CacheKey, Vec<Listener<V>>>,
  next_listener: u64,
}

impl<V> Default for State<V> {
  fn default() -> Self {
    Self {
      slots:         HashMap::new(),
      inflight:      HashMap::new(),
      epochs:        HashMap::new(),
      listeners:     HashMap::new(),
      next_listener: 0,
    }
  }
}

impl<V> State<V> {
  fn epoch(&self, key: &CacheKey) -> u64 { self.epochs.get(key).copied().unwrap_or(0) }

  fn observed_loader(&self, key: &CacheKey) -> Option<Loader<V>> {
    self.listeners.get(key).and_then(|ls| ls.iter().find_map(|l| l.loader.clone()))
  }

  fn notify(&mut self, key: &CacheKey, event: &CacheEvent) {
    if let Some(listeners) = self.listeners.get_mut(key) {
      listeners.retain(|l| l.tx.send(event.clone()).is_ok());
    }
  }

  fn matching_keys(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
    let unique: HashSet<&CacheKey> = self
      .slots
      .keys()
      .chain(self.inflight.keys())
      .chain(self.listeners.keys())
      .filter(|k| pattern.matches(k))
      .collect();
    let mut keys: Vec<CacheKey> = unique.into_iter().cloned().collect();
    keys.sort_by_key(ToString::to_string);
    keys
  }
}

/// Shared handle to the cache. Cheap to clone.
pub struct QueryCache<V> {
  state: Arc<Mutex<State<V>>>,
}

impl<V> Clone for QueryCache<V> {
  fn clone(&self) -> Self { Self { state: Arc::clone(&self.state) } }
}

impl<V: CacheValue> Default for QueryCache<V> {
  fn default() -> Self { Self::new() }
}

enum Role<V> {
  Leader(watch::Sender<Outcome<V>>, u64),
  Follower(watch::Receiver<Outcome<V>>),
}

impl<V: CacheValue> QueryCache<V> {
  pub fn new() -> Self { Self { state: Arc::new(Mutex::new(State::default())) } }

  fn lock(&self) -> MutexGuard<'_, State<V>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// The cached snapshot for `key`, fresh or stale.
  pub fn read(&self, key: &CacheKey) -> Option<Cached<V>> { self.lock().slots.get(key).cloned() }

  pub fn is_loading(&self, key: &CacheKey) -> bool { self.lock().inflight.contains_key(key) }

  /// Cached value if present and not stale; otherwise load it.
  pub async fn fetch<F, Fut>(&self, key: &CacheKey, loader: F) -> Result<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>>,
  {
    self.fetch_max_age(key, None, loader).await
  }

  /// Like [`Self::fetch`], but also treats values older than `max_age` as
  /// stale.
  pub async fn fetch_max_age<F, Fut>(
    &self,
    key: &CacheKey,
    max_age: Option<Duration>,
    loader: F,
  ) -> Result<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>>,
  {
    if let Some(hit) = self.read(key) {
      let expired = max_age.is_some_and(|age| hit.fetched_at.elapsed() >= age);
      if !hit.stale && !expired {
        tracing::trace!(%key, "cache hit");
        return Ok(hit.value);
      }
    }
    self.refetch(key, loader).await
  }

  /// Load `key` regardless of what is cached, joining a load already in
  /// flight for it.
  pub async fn refetch<F, Fut>(&self, key: &CacheKey, loader: F) -> Result<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V>>,
  {
    let role = {
      let mut state = self.lock();
      match state.inflight.get(key) {
        Some(flight) => Role::Follower(flight.rx.clone()),
        None => {
          let (tx, rx) = watch::channel(None);
          let epoch = state.epoch(key);
          state.inflight.insert(key.clone(), Inflight { rx });
          Role::Leader(tx, epoch)
        }
      }
    };

    match role {
      Role::Follower(mut rx) => {
        tracing::debug!(%key, "joining in-flight load");
        match rx.wait_for(Option::is_some).await {
          Ok(outcome) => outcome.clone().unwrap_or(Err(Error::Cancelled)),
          Err(_) => Err(Error::Cancelled),
        }
      }
      Role::Leader(tx, epoch) => {
        tracing::debug!(%key, "loading");
        let guard = FlightGuard { cache: self, key, rx: tx.subscribe(), epoch, armed: true };
        let loaded = loader().await;
        let (result, follow_up) = guard.settle(loaded);
        tx.send_replace(Some(result.clone()));
        self.spawn_refetches(follow_up.into_iter().map(|l| (key.clone(), l)).collect());
        result
      }
    }
  }

  /// Seed `key` with a known-good value (typically a mutation response).
  pub fn write(&self, key: CacheKey, value: V) {
    let mut state = self.lock();
    if let Some(existing) = state.slots.get(&key)
      && is_older(&value, &existing.value)
    {
      tracing::debug!(%key, "ignoring write older than cached value");
      return;
    }
    state.slots.insert(
      key.clone(),
      Cached { value, stale: false, fetched_at: Instant::now(), last_error: None },
    );
    state.notify(&key, &CacheEvent::Updated);
  }

  /// Apply `f` to the cached value for `key`, if there is one. The result
  /// keeps the slot's staleness.
  pub fn update(&self, key: &CacheKey, f: impl FnOnce(&mut V)) -> bool {
    let mut state = self.lock();
    let Some(slot) = state.slots.get_mut(key) else { return false };
    f(&mut slot.value);
    state.notify(key, &CacheEvent::Updated);
    true
  }

  /// Mark every key matching `pattern` stale and re-fetch the observed ones.
  /// Returns the keys that were invalidated.
  pub fn invalidate(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
    self.invalidate_excluding(pattern, &[])
  }

  /// [`Self::invalidate`], leaving `keep` untouched. Used after a mutation
  /// has just removed those keys.
  pub fn invalidate_excluding(&self, pattern: &KeyPattern, keep: &[CacheKey]) -> Vec<CacheKey> {
    let mut refetch = Vec::new();
    let keys = {
      let mut state = self.lock();
      let mut keys = state.matching_keys(pattern);
      keys.retain(|k| !keep.contains(k));
      for key in &keys {
        *state.epochs.entry(key.clone()).or_default() += 1;
        if let Some(slot) = state.slots.get_mut(key) {
          slot.stale = true;
        }
        state.notify(key, &CacheEvent::Invalidated);
        // A running load re-fetches for its observers when it settles.
        if state.inflight.contains_key(key) {
          continue;
        }
        if let Some(loader) = state.observed_loader(key) {
          refetch.push((key.clone(), loader));
        }
      }
      keys
    };
    tracing::debug!(?pattern, invalidated = keys.len(), observed = refetch.len(), "invalidated");
    self.spawn_refetches(refetch);
    keys
  }

  /// Drop every key matching `pattern` (used when the entity is deleted).
  pub fn remove(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
    let mut state = self.lock();
    let keys = state.matching_keys(pattern);
    for key in &keys {
      *state.epochs.entry(key.clone()).or_default() += 1;
      state.slots.remove(key);
      state.inflight.remove(key);
      state.notify(key, &CacheEvent::Removed);
    }
    keys
  }

  fn spawn_refetches(&self, refetch: Vec<(CacheKey, Loader<V>)>) {
    if refetch.is_empty() {
      return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      tracing::warn!("no runtime available; observed keys will refresh on next read");
      return;
    };
    for (key, loader) in refetch {
      let cache = self.clone();
      handle.spawn(async move {
        if let Err(e) = cache.refetch(&key, || loader()).await {
          tracing::debug!(%key, error = %e, "background refetch failed");
        }
      });
    }
  }

  /// Register a listener for `key`. With a `loader`, invalidating the key
  /// re-fetches it in the background while the observer is alive.
  pub fn observe(&self, key: CacheKey, loader: Option<Loader<V>>) -> Observer<V> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut state = self.lock();
    let id = state.next_listener;
    state.next_listener += 1;
    state.listeners.entry(key.clone()).or_default().push(Listener { id, tx, loader });
    Observer { cache: self.clone(), key, id, events: rx }
  }

  /// Live observers of `key`.
  pub fn observer_count(&self, key: &CacheKey) -> usize {
    self.lock().listeners.get(key).map_or(0, Vec::len)
  }

  fn unobserve(&self, key: &CacheKey, id: u64) {
    let mut state = self.lock();
    if let Some(listeners) = state.listeners.get_mut(key) {
      listeners.retain(|l| l.id != id);
      if listeners.is_empty() {
        state.listeners.remove(key);
      }
    }
  }
}

fn is_older<V: CacheValue>(incoming: &V, cached: &V) -> bool {
  matches!((incoming.version(), cached.version()), (Some(new), Some(old)) if new < old)
}

/// Clears the in-flight marker however the leading load ends, including
/// when its future is dropped.
struct FlightGuard<'a, V: CacheValue> {
  cache: &'a QueryCache<V>,
  key:   &'a CacheKey,
  rx:    watch::Receiver<Outcome<V>>,
  /// Invalidation epoch of the key when the load started.
  epoch: u64,
  armed: bool,
}

impl<V: CacheValue> FlightGuard<'_, V> {
  /// Release the key. False if the key was removed during the load.
  fn detach(&self, state: &mut State<V>) -> bool {
    let registered = state.inflight.get(self.key).is_some_and(|f| f.rx.same_channel(&self.rx));
    if registered {
      state.inflight.remove(self.key);
    }
    registered
  }

  /// The loader to re-run if the key was invalidated during the load and is
  /// still observed.
  fn follow_up(&self, state: &State<V>) -> Option<Loader<V>> {
    if state.epoch(self.key) == self.epoch {
      return None;
    }
    let loader = state.observed_loader(self.key);
    if loader.is_some() {
      tracing::debug!(key = %self.key, "invalidated while loading; re-fetching");
    }
    loader
  }

  /// Record the outcome of the load and release the key.
  fn settle(mut self, loaded: Result<V>) -> (Result<V>, Option<Loader<V>>) {
    self.armed = false;
    let key = self.key;
    let mut state = self.cache.lock();
    if !self.detach(&mut state) {
      tracing::debug!(%key, "removed while loading; result not stored");
      return (loaded, None);
    }
    let follow_up = self.follow_up(&state);
    let invalidated_since = state.epoch(key) != self.epoch;

    let result = match loaded {
      Ok(value) => {
        if let Some(existing) = state.slots.get(key)
          && is_older(&value, &existing.value)
        {
          tracing::debug!(%key, "dropping response older than cached value");
          return (Ok(existing.value.clone()), follow_up);
        }
        state.slots.insert(
          key.clone(),
          Cached {
            value:      value.clone(),
            stale:      invalidated_since,
            fetched_at: Instant::now(),
            last_error: None,
          },
        );
        state.notify(key, &CacheEvent::Updated);
        Ok(value)
      }
      Err(e) => {
        if let Some(slot) = state.slots.get_mut(key) {
          slot.last_error = Some(e.clone());
        }
        state.notify(key, &CacheEvent::Failed(e.clone()));
        Err(e)
      }
    };
    (result, follow_up)
  }
}

impl<V: CacheValue> Drop for FlightGuard<'_, V> {
  fn drop(&mut self) {
    if self.armed {
      let follow_up = {
        let mut state = self.cache.lock();
        if self.detach(&mut state) { self.follow_up(&state) } else { None }
      };
      let refetch = follow_up.into_iter().map(|l| (self.key.clone(), l)).collect();
      self.cache.spawn_refetches(refetch);
    }
  }
}

/// A registered interest in one key. Dropping it unregisters.
pub struct Observer<V: CacheValue> {
  cache:  QueryCache<V>,
  key:    CacheKey,
  id:     u64,
  events: mpsc::UnboundedReceiver<CacheEvent>,
}

impl<V: CacheValue> Observer<V> {
  pub fn key(&self) -> &CacheKey { &self.key }

  pub fn current(&self) -> Option<Cached<V>> { self.cache.read(&self.key) }

  /// The next event for this key.
  pub async fn changed(&mut self) -> Option<CacheEvent> { self.events.recv().await }

  /// Wait until the key holds a value written after the call, skipping
  /// invalidation notices. Fails with the load error if one arrives first.
  pub async fn next_value(&mut self) -> Result<V> {
    loop {
      match self.events.recv().await {
        Some(CacheEvent::Updated) => {
          if let Some(hit) = self.current() {
            return Ok(hit.value);
          }
        }
        Some(CacheEvent::Failed(e)) => return Err(e),
        Some(CacheEvent::Removed) => {
          return Err(Error::NotFound(format!("{} was removed", self.key)));
        }
        Some(CacheEvent::Invalidated) => {}
        None => return Err(Error::Cancelled),
      }
    }
  }
}

impl<V: CacheValue> Drop for Observer<V> {
  fn drop(&mut self) { self.cache.unobserve(&self.key, self.id); }
}
