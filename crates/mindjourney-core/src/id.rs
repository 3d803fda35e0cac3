//! Server-assigned integer identities, one newtype per entity.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
    }

    impl From<i64> for $name {
      fn from(v: i64) -> Self { Self(v) }
    }
  };
}

id_type!(
  /// Identity of a journal entry.
  EntryId
);
id_type!(FaceId);
id_type!(CategoryId);
id_type!(
  /// Identity of a document attached to an entry.
  DocumentId
);
id_type!(InsightId);
