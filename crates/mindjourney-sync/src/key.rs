//! Structured cache keys and the patterns used to invalidate them.
//!
//! Keys are never opaque strings: an entry lives under
//! [`CacheKey::Entry`], a filtered public feed under
//! [`EntryListKey::Public`] carrying its [`FilterSignature`], and so on.

use std::fmt;

use mindjourney_core::{
  category::CategoryType,
  id::{EntryId, FaceId},
  query::CategoryLookup,
};

use crate::{filter::FilterSignature, suggest::SuggestionInputs};

/// Every list view of entries the client can display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryListKey {
  /// The caller's own entries (home and timeline views).
  Timeline,
  /// The shared public feed for one filter combination.
  Public(FilterSignature),
  Search(String),
  ByFace(FaceId),
  ByCategory(CategoryLookup),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
  Entry(EntryId),
  EntryList(EntryListKey),
  Faces,
  SubscribedFaces,
  Categories,
  CategoriesByType(CategoryType),
  FaceSuggestions(SuggestionInputs),
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Entry(id) => write!(f, "entries/{id}"),
      Self::EntryList(EntryListKey::Timeline) => f.write_str("entries"),
      Self::EntryList(EntryListKey::Public(sig)) => write!(f, "entries/public[{sig}]"),
      Self::EntryList(EntryListKey::Search(q)) => write!(f, "entries/search[{q}]"),
      Self::EntryList(EntryListKey::ByFace(id)) => write!(f, "entries/by_face/{id}"),
      Self::EntryList(EntryListKey::ByCategory(lookup)) => {
        write!(f, "entries/by_category[{}", lookup.name)?;
        if let Some(t) = lookup.category_type {
          write!(f, ",{t}")?;
        }
        f.write_str("]")
      }
      Self::Faces => f.write_str("faces"),
      Self::SubscribedFaces => f.write_str("faces/subscribed"),
      Self::Categories => f.write_str("categories"),
      Self::CategoriesByType(t) => write!(f, "categories/{t}"),
      Self::FaceSuggestions(_) => f.write_str("faces/suggest"),
    }
  }
}

/// A set of keys selected for invalidation or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  Exact(CacheKey),
  /// Every single-entry key.
  AnyEntry,
  /// Every list of entries, whatever its filter.
  AnyEntryList,
  /// Public feeds whose filter names the face, plus that face's own list.
  ListsReferencingFace(FaceId),
  /// The full face list (not the subscribed subset).
  Faces,
  SubscribedFaces,
  AnySuggestion,
  /// Every category list, typed or not.
  AnyCategoryList,
}

impl KeyPattern {
  pub fn matches(&self, key: &CacheKey) -> bool {
    match (self, key) {
      (Self::Exact(k), key) => k == key,
      (Self::AnyEntry, CacheKey::Entry(_)) => true,
      (Self::AnyEntryList, CacheKey::EntryList(_)) => true,
      (Self::ListsReferencingFace(face), CacheKey::EntryList(list)) => match list {
        EntryListKey::Public(sig) => sig.references_face(*face),
        EntryListKey::ByFace(id) => id == face,
        _ => false,
      },
      (Self::Faces, CacheKey::Faces) => true,
      (Self::SubscribedFaces, CacheKey::SubscribedFaces) => true,
      (Self::AnySuggestion, CacheKey::FaceSuggestions(_)) => true,
      (Self::AnyCategoryList, CacheKey::Categories | CacheKey::CategoriesByType(_)) => true,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use mindjourney_core::id::CategoryId;

  use super::*;
  use crate::filter::FilterSelection;

  fn public(faces: &[i64]) -> CacheKey {
    let mut sel = FilterSelection::default();
    for f in faces {
      sel.toggle_face(FaceId(*f));
    }
    CacheKey::EntryList(EntryListKey::Public(sel.signature()))
  }

  #[test]
  fn face_references_match_only_their_lists() {
    let pattern = KeyPattern::ListsReferencingFace(FaceId(5));
    assert!(pattern.matches(&public(&[5])));
    assert!(pattern.matches(&public(&[2, 5])));
    assert!(pattern.matches(&CacheKey::EntryList(EntryListKey::ByFace(FaceId(5)))));
    assert!(!pattern.matches(&public(&[2])));
    assert!(!pattern.matches(&public(&[])));
    assert!(!pattern.matches(&CacheKey::EntryList(EntryListKey::Timeline)));
  }

  #[test]
  fn category_filters_do_not_reference_faces() {
    let mut sel = FilterSelection::default();
    sel.toggle_category(CategoryId(5));
    let key = CacheKey::EntryList(EntryListKey::Public(sel.signature()));
    assert!(!KeyPattern::ListsReferencingFace(FaceId(5)).matches(&key));
    assert!(KeyPattern::AnyEntryList.matches(&key));
  }

  #[test]
  fn faces_pattern_is_not_a_prefix_of_subscribed() {
    assert!(KeyPattern::Faces.matches(&CacheKey::Faces));
    assert!(!KeyPattern::Faces.matches(&CacheKey::SubscribedFaces));
    assert!(KeyPattern::AnyCategoryList.matches(&CacheKey::CategoriesByType(CategoryType::Meal)));
  }
}
