//! The static dependency table: which cache keys a change makes stale.
//!
//! Every [`ChangeKind`] has exactly one row. Adding a new list view means
//! adding its key to [`KeyPattern`] and to the rows that affect it here.

use std::fmt;

use mindjourney_core::id::{DocumentId, EntryId, FaceId};

use crate::key::{CacheKey, KeyPattern};

/// Something that changes server state. All but
/// [`ChangeKind::InsightsSettled`] are client mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
  CreateEntry,
  UpdateEntry,
  DeleteEntry,
  ReprocessEntry,
  UploadDocument,
  DeleteDocument,
  CreateFace,
  UpdateFace,
  SubscribeFace,
  UnsubscribeFace,
  CreateCategory,
  /// The backend finished extracting insights for an entry.
  InsightsSettled,
}

impl ChangeKind {
  pub const ALL: [Self; 12] = [
    Self::CreateEntry,
    Self::UpdateEntry,
    Self::DeleteEntry,
    Self::ReprocessEntry,
    Self::UploadDocument,
    Self::DeleteDocument,
    Self::CreateFace,
    Self::UpdateFace,
    Self::SubscribeFace,
    Self::UnsubscribeFace,
    Self::CreateCategory,
    Self::InsightsSettled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::CreateEntry => "create-entry",
      Self::UpdateEntry => "update-entry",
      Self::DeleteEntry => "delete-entry",
      Self::ReprocessEntry => "reprocess-entry",
      Self::UploadDocument => "upload-document",
      Self::DeleteDocument => "delete-document",
      Self::CreateFace => "create-face",
      Self::UpdateFace => "update-face",
      Self::SubscribeFace => "subscribe-face",
      Self::UnsubscribeFace => "unsubscribe-face",
      Self::CreateCategory => "create-category",
      Self::InsightsSettled => "insights-settled",
    }
  }
}

impl fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// The entity a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
  /// Not yet created; the server assigns the id.
  New,
  Entry(EntryId),
  Document { entry: EntryId, document: DocumentId },
  Face(FaceId),
}

impl Target {
  fn entry(&self) -> Option<EntryId> {
    match self {
      Self::Entry(id) | Self::Document { entry: id, .. } => Some(*id),
      _ => None,
    }
  }

  fn face(&self) -> Option<FaceId> {
    match self {
      Self::Face(id) => Some(*id),
      _ => None,
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::New => f.write_str("new"),
      Self::Entry(id) => write!(f, "entry {id}"),
      Self::Document { entry, document } => write!(f, "document {document} of entry {entry}"),
      Self::Face(id) => write!(f, "face {id}"),
    }
  }
}

/// A column of the dependency table, resolved against a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  /// The target entry's own key.
  TargetEntry,
  EveryEntry,
  EntryLists,
  /// Lists whose filter mentions the target face.
  ListsReferencingTargetFace,
  Faces,
  SubscribedFaces,
  Suggestions,
  Categories,
}

use Scope::*;

/// Change kind → affected scopes.
pub const DEPENDENCIES: &[(ChangeKind, &[Scope])] = &[
  (ChangeKind::CreateEntry, &[TargetEntry, EntryLists]),
  (ChangeKind::UpdateEntry, &[TargetEntry, EntryLists]),
  (ChangeKind::DeleteEntry, &[TargetEntry, EntryLists]),
  (ChangeKind::ReprocessEntry, &[TargetEntry, EntryLists]),
  (ChangeKind::UploadDocument, &[TargetEntry, EntryLists]),
  (ChangeKind::DeleteDocument, &[TargetEntry, EntryLists]),
  (ChangeKind::CreateFace, &[Faces, Suggestions]),
  // Entries embed face name and icon.
  (ChangeKind::UpdateFace, &[Faces, SubscribedFaces, Suggestions, EveryEntry, EntryLists]),
  (ChangeKind::SubscribeFace, &[SubscribedFaces, ListsReferencingTargetFace]),
  (ChangeKind::UnsubscribeFace, &[SubscribedFaces, ListsReferencingTargetFace]),
  (ChangeKind::CreateCategory, &[Categories]),
  // The settling poll already refreshed the entry itself. Processing may
  // create categories implicitly.
  (ChangeKind::InsightsSettled, &[EntryLists, Categories]),
];

pub fn scopes(kind: ChangeKind) -> &'static [Scope] {
  DEPENDENCIES
    .iter()
    .find(|(k, _)| *k == kind)
    .map(|(_, scopes)| *scopes)
    .unwrap_or(&[])
}

fn resolve(scope: Scope, target: Target) -> Option<KeyPattern> {
  Some(match scope {
    TargetEntry => KeyPattern::Exact(CacheKey::Entry(target.entry()?)),
    EveryEntry => KeyPattern::AnyEntry,
    EntryLists => KeyPattern::AnyEntryList,
    ListsReferencingTargetFace => KeyPattern::ListsReferencingFace(target.face()?),
    Faces => KeyPattern::Faces,
    SubscribedFaces => KeyPattern::SubscribedFaces,
    Suggestions => KeyPattern::AnySuggestion,
    Categories => KeyPattern::AnyCategoryList,
  })
}

/// The key patterns made stale by `kind` applied to `target`.
pub fn invalidation_set(kind: ChangeKind, target: Target) -> Vec<KeyPattern> {
  scopes(kind).iter().filter_map(|s| resolve(*s, target)).collect()
}

#[cfg(test)]
mod tests {
  use mindjourney_core::id::CategoryId;

  use super::*;
  use crate::{filter::FilterSelection, key::EntryListKey};

  #[test]
  fn every_change_kind_has_exactly_one_row() {
    for kind in ChangeKind::ALL {
      let rows = DEPENDENCIES.iter().filter(|(k, _)| *k == kind).count();
      assert_eq!(rows, 1, "{kind} has {rows} rows");
      assert!(!scopes(kind).is_empty(), "{kind} invalidates nothing");
    }
    assert_eq!(DEPENDENCIES.len(), ChangeKind::ALL.len());
  }

  #[test]
  fn visibility_change_reaches_public_feeds() {
    let set = invalidation_set(ChangeKind::UpdateEntry, Target::Entry(EntryId(1)));
    let mut sel = FilterSelection::default();
    sel.toggle_category(CategoryId(2));
    let keys = [
      CacheKey::Entry(EntryId(1)),
      CacheKey::EntryList(EntryListKey::Timeline),
      CacheKey::EntryList(EntryListKey::Public(FilterSelection::default().signature())),
      CacheKey::EntryList(EntryListKey::Public(sel.signature())),
    ];
    for key in &keys {
      assert!(set.iter().any(|p| p.matches(key)), "{key} not invalidated");
    }
    assert!(!set.iter().any(|p| p.matches(&CacheKey::Entry(EntryId(2)))));
    assert!(!set.iter().any(|p| p.matches(&CacheKey::Faces)));
  }

  #[test]
  fn document_changes_resolve_to_the_owning_entry() {
    let target = Target::Document { entry: EntryId(4), document: DocumentId(9) };
    let set = invalidation_set(ChangeKind::DeleteDocument, target);
    assert!(set.contains(&KeyPattern::Exact(CacheKey::Entry(EntryId(4)))));
  }

  #[test]
  fn subscription_changes_leave_unrelated_lists_alone() {
    let set = invalidation_set(ChangeKind::UnsubscribeFace, Target::Face(FaceId(5)));
    assert_eq!(
      set,
      vec![KeyPattern::SubscribedFaces, KeyPattern::ListsReferencingFace(FaceId(5))]
    );
    assert!(!set.iter().any(|p| p.matches(&CacheKey::EntryList(EntryListKey::Timeline))));
  }
}
