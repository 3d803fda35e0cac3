//! Processing-status polling.
//!
//! Each observed entry whose insights are not yet processed gets a polling
//! task. The task is owned by the [`Poller`] and lives exactly as long as the
//! entry has at least one [`EntryWatch`]; it stops for good once a fetch
//! reports `insights_processed` or the entry turns out to be gone, until
//! [`Poller::restart`] is called.

use std::{
  collections::HashMap,
  future::Future,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use mindjourney_core::{Error, Result, entry::Entry, id::EntryId};
use tokio::{sync::watch, task::JoinHandle};

use crate::config::PollConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
  /// Not being polled: unobserved or never fetched.
  Idle,
  Polling,
  /// Insights are processed; nothing further is scheduled.
  Settled,
  /// The backend no longer has the entry.
  Missing,
}

impl PollState {
  /// Nothing more will happen without a restart.
  pub fn is_terminal(self) -> bool { matches!(self, Self::Settled | Self::Missing) }
}

/// Where the poller reads entries from.
pub trait EntrySource: Send + Sync + 'static {
  /// The cached entry, fresh or stale.
  fn cached(&self, id: EntryId) -> Option<Entry>;

  /// Fetch the entry from the backend, writing it through the cache.
  fn fetch(&self, id: EntryId) -> impl Future<Output = Result<Entry>> + Send;

  /// Called when polling sees `entry` finish processing.
  fn settled(&self, entry: &Entry);
}

struct Slot {
  state:     watch::Sender<PollState>,
  observers: usize,
  task:      Option<JoinHandle<()>>,
}

impl Slot {
  fn new() -> Self {
    Self { state: watch::Sender::new(PollState::Idle), observers: 0, task: None }
  }

  fn stop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }

  fn running(&self) -> bool { self.task.as_ref().is_some_and(|t| !t.is_finished()) }
}

struct Shared<S> {
  source: Arc<S>,
  config: PollConfig,
  slots:  Mutex<HashMap<EntryId, Slot>>,
}

pub struct Poller<S> {
  shared: Arc<Shared<S>>,
}

impl<S> Clone for Poller<S> {
  fn clone(&self) -> Self { Self { shared: Arc::clone(&self.shared) } }
}

impl<S: EntrySource> Poller<S> {
  pub fn new(source: Arc<S>, config: PollConfig) -> Self {
    Self { shared: Arc::new(Shared { source, config, slots: Mutex::new(HashMap::new()) }) }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<EntryId, Slot>> {
    self.shared.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn state(&self, id: EntryId) -> PollState {
    self.lock().get(&id).map_or(PollState::Idle, |slot| *slot.state.borrow())
  }

  pub fn observers(&self, id: EntryId) -> usize { self.lock().get(&id).map_or(0, |s| s.observers) }

  /// Start observing `id`. Polling begins if the entry is not settled and
  /// no task is already running for it.
  ///
  /// Must be called from within a tokio runtime.
  pub fn watch(&self, id: EntryId) -> EntryWatch<S> {
    let pending = self.shared.source.cached(id).is_some_and(|e| !e.insights_processed);
    let mut slots = self.lock();
    let slot = slots.entry(id).or_insert_with(Slot::new);
    slot.observers += 1;
    let state = slot.state.subscribe();
    if !slot.state.borrow().is_terminal() && !slot.running() {
      if pending {
        slot.state.send_replace(PollState::Polling);
      }
      slot.task = Some(self.spawn(id, slot.state.clone()));
    }
    EntryWatch { poller: self.clone(), id, state }
  }

  /// Restart polling after a reprocess, whatever the current state.
  pub fn restart(&self, id: EntryId) {
    let mut slots = self.lock();
    let slot = slots.entry(id).or_insert_with(Slot::new);
    slot.stop();
    if slot.observers > 0 {
      tracing::info!(entry = %id, "polling restarted");
      slot.state.send_replace(PollState::Polling);
      slot.task = Some(self.spawn(id, slot.state.clone()));
    } else {
      slot.state.send_replace(PollState::Idle);
    }
  }

  /// Stop polling `id` for good (the entry was deleted).
  pub fn forget(&self, id: EntryId) {
    if let Some(slot) = self.lock().get_mut(&id) {
      slot.stop();
      slot.state.send_replace(PollState::Missing);
    }
  }

  fn release(&self, id: EntryId) {
    let mut slots = self.lock();
    let Some(slot) = slots.get_mut(&id) else { return };
    slot.observers = slot.observers.saturating_sub(1);
    if slot.observers == 0 {
      slot.stop();
      slot.state.send_if_modified(|state| {
        let polling = *state == PollState::Polling;
        if polling {
          *state = PollState::Idle;
        }
        polling
      });
      tracing::debug!(entry = %id, "last observer gone; polling stopped");
    }
  }

  fn spawn(&self, id: EntryId, state: watch::Sender<PollState>) -> JoinHandle<()> {
    let source = Arc::clone(&self.shared.source);
    tokio::spawn(poll(source, id, state, self.shared.config))
  }
}

fn settle<S: EntrySource>(source: &S, state: &watch::Sender<PollState>, entry: &Entry) {
  tracing::info!(entry = %entry.id, "insights processed; polling settled");
  state.send_replace(PollState::Settled);
  source.settled(entry);
}

async fn poll<S: EntrySource>(
  source: Arc<S>,
  id: EntryId,
  state: watch::Sender<PollState>,
  config: PollConfig,
) {
  let mut delay = match source.cached(id) {
    // Nothing changed while we watched, so there is nothing to invalidate.
    Some(entry) if entry.insights_processed => {
      state.send_replace(PollState::Settled);
      return;
    }
    Some(_) => {
      state.send_replace(PollState::Polling);
      config.interval()
    }
    // Unknown entry: resolve it right away.
    None => Duration::ZERO,
  };
  let mut failures = 0;

  loop {
    tokio::time::sleep(delay).await;

    // A refresh or another view may already have seen it finish.
    if let Some(entry) = source.cached(id)
      && entry.insights_processed
    {
      return settle(&*source, &state, &entry);
    }

    // Detached so that stopping the schedule leaves the request running.
    let request = tokio::spawn({
      let source = Arc::clone(&source);
      async move { source.fetch(id).await }
    });
    let fetched = match request.await {
      Ok(fetched) => fetched,
      Err(e) => Err(if e.is_cancelled() {
        Error::Cancelled
      } else {
        Error::Transient(format!("poll task failed: {e}"))
      }),
    };

    match fetched {
      Ok(entry) if entry.insights_processed => return settle(&*source, &state, &entry),
      Ok(_) => {
        failures = 0;
        state.send_replace(PollState::Polling);
        delay = config.interval();
      }
      Err(e) if e.is_not_found() => {
        tracing::info!(entry = %id, "entry gone; polling stopped");
        state.send_replace(PollState::Missing);
        return;
      }
      Err(e) => {
        failures += 1;
        delay = config.delay_after_failures(failures);
        tracing::warn!(
          entry = %id,
          error = %e,
          failures,
          retry_in_ms = delay.as_millis() as u64,
          "poll failed"
        );
      }
    }
  }
}

/// A handle on one entry's processing status. Dropping the last watch on an
/// entry stops its polling schedule.
pub struct EntryWatch<S: EntrySource> {
  poller: Poller<S>,
  id:     EntryId,
  state:  watch::Receiver<PollState>,
}

impl<S: EntrySource> EntryWatch<S> {
  pub fn id(&self) -> EntryId { self.id }

  pub fn state(&self) -> PollState { *self.state.borrow() }

  /// Wait for the next state transition.
  pub async fn changed(&mut self) -> Result<PollState> {
    self.state.changed().await.map_err(|_| Error::Cancelled)?;
    Ok(*self.state.borrow_and_update())
  }

  /// Wait until the entry is processed. Fails with [`Error::NotFound`] if
  /// it is gone instead.
  pub async fn wait_settled(&mut self) -> Result<()> {
    let reached = self
      .state
      .wait_for(|s| s.is_terminal())
      .await
      .map(|s| *s)
      .map_err(|_| Error::Cancelled)?;
    match reached {
      PollState::Missing => Err(Error::NotFound(format!("entry {}", self.id))),
      _ => Ok(()),
    }
  }

  /// Fetch now, outside the schedule. The next tick still happens when it
  /// would have; it settles without fetching if this refresh saw the
  /// entry processed.
  pub async fn refresh_now(&self) -> Result<Entry> { self.poller.shared.source.fetch(self.id).await }
}

impl<S: EntrySource> Drop for EntryWatch<S> {
  fn drop(&mut self) { self.poller.release(self.id); }
}
