//! Face suggestions for a draft's title and content.
//!
//! The debounce policy is the pure [`should_refetch_suggestions`]; the
//! [`SuggestionPipeline`] applies it to a stream of edits and holds on to
//! the latest edit it turned away, so the text the user stopped at is still
//! fetched once the window closes.

use std::{
  sync::{Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use mindjourney_core::{Result, backend::JournalBackend, face::FaceSuggestion};
use tokio::time::Instant;

use crate::journal::Journal;

/// The text a suggestion request is computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SuggestionInputs {
  pub title:   String,
  pub content: String,
}

impl SuggestionInputs {
  pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
    Self { title: title.into(), content: content.into() }
  }

  /// Both fields empty after trimming.
  pub fn is_blank(&self) -> bool { self.title.trim().is_empty() && self.content.trim().is_empty() }
}

/// Whether `next` warrants a new suggestion request.
///
/// True only for non-blank input that differs from what was last fetched,
/// and only once the staleness window since `last_fetch` has passed (or
/// nothing was fetched yet).
pub fn should_refetch_suggestions(
  prev: Option<&SuggestionInputs>,
  next: &SuggestionInputs,
  last_fetch: Option<Instant>,
  now: Instant,
  staleness: Duration,
) -> bool {
  if next.is_blank() || prev == Some(next) {
    return false;
  }
  match last_fetch {
    None => true,
    Some(at) => now.saturating_duration_since(at) >= staleness,
  }
}

#[derive(Default)]
struct PipelineState {
  last_inputs: Option<SuggestionInputs>,
  last_fetch:  Option<Instant>,
  current:     Vec<FaceSuggestion>,
  /// Latest edit held back by the staleness window.
  pending:     Option<SuggestionInputs>,
}

/// Suggestions shown beside an entry form.
pub struct SuggestionPipeline<B: JournalBackend + 'static> {
  journal:   Journal<B>,
  staleness: Duration,
  state:     Mutex<PipelineState>,
}

impl<B: JournalBackend + 'static> SuggestionPipeline<B> {
  pub fn new(journal: Journal<B>) -> Self {
    let staleness = journal.config().suggestion_staleness();
    Self { journal, staleness, state: Mutex::new(PipelineState::default()) }
  }

  fn lock(&self) -> MutexGuard<'_, PipelineState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// The suggestions from the latest request.
  pub fn current(&self) -> Vec<FaceSuggestion> { self.lock().current.clone() }

  /// When the held-back edit becomes fetchable, if there is one.
  pub fn due_at(&self) -> Option<Instant> {
    let state = self.lock();
    state.pending.as_ref()?;
    state.last_fetch.map(|at| at + self.staleness)
  }

  /// Feed the latest form text. Returns fresh suggestions when a request was
  /// made, `None` when the policy held it back.
  pub async fn update(&self, inputs: SuggestionInputs) -> Result<Option<Vec<FaceSuggestion>>> {
    {
      let mut state = self.lock();
      let due = should_refetch_suggestions(
        state.last_inputs.as_ref(),
        &inputs,
        state.last_fetch,
        Instant::now(),
        self.staleness,
      );
      if !due {
        let superseded = inputs.is_blank() || state.last_inputs.as_ref() == Some(&inputs);
        state.pending = if superseded { None } else { Some(inputs) };
        return Ok(None);
      }
      state.pending = None;
    }
    let suggestions = self.journal.suggest_faces(&inputs).await?;
    let mut state = self.lock();
    state.last_inputs = Some(inputs);
    state.last_fetch = Some(Instant::now());
    state.current = suggestions.clone();
    Ok(Some(suggestions))
  }

  /// Re-run the policy for the held-back edit, if any.
  pub async fn flush(&self) -> Result<Option<Vec<FaceSuggestion>>> {
    let pending = self.lock().pending.take();
    match pending {
      Some(inputs) => self.update(inputs).await,
      None => Ok(None),
    }
  }

  /// Wait out the window for the held-back edit and fetch it. `None` when
  /// nothing is held back.
  pub async fn flush_when_due(&self) -> Result<Option<Vec<FaceSuggestion>>> {
    while let Some(at) = self.due_at() {
      tokio::time::sleep_until(at).await;
      if let Some(suggestions) = self.flush().await? {
        return Ok(Some(suggestions));
      }
    }
    Ok(None)
  }
}
