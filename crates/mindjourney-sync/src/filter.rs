//! Filter composition for the public feed.
//!
//! A [`FilterSelection`] is the user's current face/category choice; its
//! [`FilterSignature`] is the canonical form used as the list cache key, so
//! equal selections share one cached result however they were built.

use std::{
  collections::BTreeSet,
  fmt,
  sync::{Mutex, MutexGuard, PoisonError},
};

use mindjourney_core::{
  Result,
  backend::JournalBackend,
  entry::Entry,
  id::{CategoryId, FaceId},
  query::PublicEntryQuery,
};

use crate::{
  journal::Journal,
  key::{CacheKey, EntryListKey},
  resource::FromResource,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
  faces:      BTreeSet<FaceId>,
  categories: BTreeSet<CategoryId>,
}

impl FilterSelection {
  /// Flip membership of `id`; returns whether it is now selected.
  pub fn toggle_face(&mut self, id: FaceId) -> bool { toggle(&mut self.faces, id) }

  pub fn toggle_category(&mut self, id: CategoryId) -> bool { toggle(&mut self.categories, id) }

  /// Returns whether `id` was selected.
  pub fn remove_face(&mut self, id: FaceId) -> bool { self.faces.remove(&id) }

  pub fn clear(&mut self) {
    self.faces.clear();
    self.categories.clear();
  }

  pub fn is_empty(&self) -> bool { self.faces.is_empty() && self.categories.is_empty() }

  pub fn has_face(&self, id: FaceId) -> bool { self.faces.contains(&id) }

  pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ { self.faces.iter().copied() }

  pub fn categories(&self) -> impl Iterator<Item = CategoryId> + '_ {
    self.categories.iter().copied()
  }

  pub fn signature(&self) -> FilterSignature {
    FilterSignature {
      faces:      self.faces.iter().copied().collect(),
      categories: self.categories.iter().copied().collect(),
    }
  }
}

fn toggle<T: Ord>(set: &mut BTreeSet<T>, id: T) -> bool {
  if set.remove(&id) {
    false
  } else {
    set.insert(id);
    true
  }
}

/// Sorted, de-duplicated form of a [`FilterSelection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSignature {
  faces:      Vec<FaceId>,
  categories: Vec<CategoryId>,
}

impl FilterSignature {
  pub fn references_face(&self, id: FaceId) -> bool { self.faces.binary_search(&id).is_ok() }

  pub fn is_unfiltered(&self) -> bool { self.faces.is_empty() && self.categories.is_empty() }

  pub fn to_query(&self) -> PublicEntryQuery {
    PublicEntryQuery { face_ids: self.faces.clone(), category_ids: self.categories.clone() }
  }
}

impl fmt::Display for FilterSignature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, ids: &[T]) -> fmt::Result {
      for (i, id) in ids.iter().enumerate() {
        if i > 0 {
          f.write_str(",")?;
        }
        write!(f, "{id}")?;
      }
      Ok(())
    }
    f.write_str("faces=")?;
    join(f, &self.faces)?;
    f.write_str(";categories=")?;
    join(f, &self.categories)
  }
}

/// One rendering of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
  pub signature: FilterSignature,
  pub entries:   Vec<Entry>,
  /// The entries belong to an earlier selection whose replacement is still
  /// loading.
  pub previous:  bool,
}

struct FeedState {
  selection: FilterSelection,
  shown:     Option<(FilterSignature, Vec<Entry>)>,
}

/// The public feed with an interactive filter selection.
///
/// Filtering always happens server-side: every selection change goes through
/// the cache under the new signature, never by narrowing a list already on
/// screen.
pub struct PublicFeed<B: JournalBackend + 'static> {
  journal: Journal<B>,
  state:   Mutex<FeedState>,
}

impl<B: JournalBackend + 'static> PublicFeed<B> {
  pub fn new(journal: Journal<B>) -> Self {
    Self {
      journal,
      state: Mutex::new(FeedState { selection: FilterSelection::default(), shown: None }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, FeedState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn selection(&self) -> FilterSelection { self.lock().selection.clone() }

  pub fn key(&self) -> CacheKey {
    CacheKey::EntryList(EntryListKey::Public(self.lock().selection.signature()))
  }

  /// What the feed shows right now: the current selection's cached list, or
  /// the last list shown while the current one loads.
  pub fn displayed(&self) -> Option<FeedPage> {
    let signature = self.lock().selection.signature();
    let key = CacheKey::EntryList(EntryListKey::Public(signature.clone()));
    if let Some(entries) =
      self.journal.cache().read(&key).and_then(|hit| Vec::<Entry>::from_resource(hit.value))
    {
      return Some(FeedPage { signature, entries, previous: false });
    }
    self.lock().shown.clone().map(|(signature, entries)| FeedPage {
      signature,
      entries,
      previous: true,
    })
  }

  /// Fetch the list for the current selection.
  pub async fn load(&self) -> Result<FeedPage> {
    let signature = self.lock().selection.signature();
    let entries = self.journal.public_entries(&signature).await?;
    let mut state = self.lock();
    // A newer toggle may have landed meanwhile; it owns the display then.
    if state.selection.signature() == signature {
      state.shown = Some((signature.clone(), entries.clone()));
    }
    Ok(FeedPage { signature, entries, previous: false })
  }

  pub async fn toggle_face(&self, id: FaceId) -> Result<FeedPage> {
    self.lock().selection.toggle_face(id);
    self.load().await
  }

  pub async fn toggle_category(&self, id: CategoryId) -> Result<FeedPage> {
    self.lock().selection.toggle_category(id);
    self.load().await
  }

  pub async fn clear(&self) -> Result<FeedPage> {
    self.lock().selection.clear();
    self.load().await
  }

  /// Subscribing leaves the selection untouched.
  pub async fn subscribe_face(&self, id: FaceId) -> Result<()> {
    self.journal.subscribe_face(id).await
  }

  /// Unsubscribe, dropping `id` from the selection if it was selected. The
  /// feed is reloaded only when the selection changed.
  pub async fn unsubscribe_face(&self, id: FaceId) -> Result<Option<FeedPage>> {
    self.journal.unsubscribe_face(id).await?;
    let removed = self.lock().selection.remove_face(id);
    if removed {
      tracing::debug!(face = %id, "unsubscribed face removed from filter");
      self.load().await.map(Some)
    } else {
      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn toggling_is_symmetric() {
    let mut sel = FilterSelection::default();
    assert!(sel.toggle_face(FaceId(3)));
    assert!(!sel.toggle_face(FaceId(3)));
    assert!(sel.is_empty());
  }

  #[test]
  fn signature_is_order_independent() {
    let mut a = FilterSelection::default();
    a.toggle_face(FaceId(3));
    a.toggle_face(FaceId(7));
    let mut b = FilterSelection::default();
    b.toggle_face(FaceId(7));
    b.toggle_face(FaceId(3));
    assert_eq!(a.signature(), b.signature());
    assert_eq!(
      CacheKey::EntryList(EntryListKey::Public(a.signature())),
      CacheKey::EntryList(EntryListKey::Public(b.signature()))
    );
    assert_eq!(a.signature().to_string(), "faces=3,7;categories=");
  }

  #[test]
  fn faces_and_categories_do_not_collide() {
    let mut faces = FilterSelection::default();
    faces.toggle_face(FaceId(1));
    let mut cats = FilterSelection::default();
    cats.toggle_category(CategoryId(1));
    assert_ne!(faces.signature(), cats.signature());
  }

  #[test]
  fn query_carries_sorted_ids() {
    let mut sel = FilterSelection::default();
    sel.toggle_category(CategoryId(9));
    sel.toggle_face(FaceId(7));
    sel.toggle_face(FaceId(3));
    let query = sel.signature().to_query();
    assert_eq!(query.face_ids, vec![FaceId(3), FaceId(7)]);
    assert_eq!(query.category_ids, vec![CategoryId(9)]);
    assert!(FilterSelection::default().signature().to_query().is_unfiltered());
  }
}
