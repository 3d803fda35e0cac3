//! The value type stored in the journal's cache.

use chrono::{DateTime, Utc};
use mindjourney_core::{
  Error, Result,
  category::Category,
  entry::Entry,
  face::{Face, FaceSuggestion},
};

use crate::cache::CacheValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
  Entry(Entry),
  Entries(Vec<Entry>),
  Faces(Vec<Face>),
  Categories(Vec<Category>),
  Suggestions(Vec<FaceSuggestion>),
}

impl Resource {
  fn kind(&self) -> &'static str {
    match self {
      Self::Entry(_) => "entry",
      Self::Entries(_) => "entries",
      Self::Faces(_) => "faces",
      Self::Categories(_) => "categories",
      Self::Suggestions(_) => "suggestions",
    }
  }
}

impl CacheValue for Resource {
  fn version(&self) -> Option<DateTime<Utc>> {
    match self {
      Self::Entry(entry) => entry.updated_at,
      _ => None,
    }
  }
}

/// Typed access to a [`Resource`].
pub trait FromResource: Sized {
  const KIND: &'static str;

  fn from_resource(resource: Resource) -> Option<Self>;

  fn into_resource(self) -> Resource;

  /// Like [`Self::from_resource`], failing with [`Error::Decode`] when the
  /// cached value has a different shape.
  fn extract(resource: Resource) -> Result<Self> {
    let found = resource.kind();
    Self::from_resource(resource)
      .ok_or_else(|| Error::Decode(format!("expected {} in cache, found {found}", Self::KIND)))
  }
}

macro_rules! from_resource {
  ($ty:ty, $variant:ident, $kind:literal) => {
    impl FromResource for $ty {
      const KIND: &'static str = $kind;

      fn from_resource(resource: Resource) -> Option<Self> {
        match resource {
          Resource::$variant(v) => Some(v),
          _ => None,
        }
      }

      fn into_resource(self) -> Resource { Resource::$variant(self) }
    }
  };
}

from_resource!(Entry, Entry, "entry");
from_resource!(Vec<Entry>, Entries, "entries");
from_resource!(Vec<Face>, Faces, "faces");
from_resource!(Vec<Category>, Categories, "categories");
from_resource!(Vec<FaceSuggestion>, Suggestions, "suggestions");
