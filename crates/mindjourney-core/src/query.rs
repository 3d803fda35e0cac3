//! Query inputs for list endpoints.

use crate::{
  category::CategoryType,
  id::{CategoryId, FaceId},
};

/// Parameters for `GET /entries/public/`.
///
/// Empty lists mean "no restriction". The backend matches ANY id within a
/// list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicEntryQuery {
  pub face_ids:     Vec<FaceId>,
  pub category_ids: Vec<CategoryId>,
}

impl PublicEntryQuery {
  pub fn is_unfiltered(&self) -> bool { self.face_ids.is_empty() && self.category_ids.is_empty() }

  /// Query-string pairs; ids are comma-joined and empty lists are omitted.
  pub fn to_params(&self) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if !self.face_ids.is_empty() {
      params.push(("face_ids", join_ids(self.face_ids.iter().map(|id| id.0))));
    }
    if !self.category_ids.is_empty() {
      params.push(("category_ids", join_ids(self.category_ids.iter().map(|id| id.0))));
    }
    params
  }
}

fn join_ids(ids: impl Iterator<Item = i64>) -> String {
  ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// Parameters for `GET /insights/entries_by_category/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryLookup {
  pub name:          String,
  pub category_type: Option<CategoryType>,
}

impl CategoryLookup {
  pub fn to_params(&self) -> Vec<(&'static str, String)> {
    let mut params = vec![("category_name", self.name.clone())];
    if let Some(t) = self.category_type {
      params.push(("category_type", t.as_str().to_owned()));
    }
    params
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_lists_are_omitted() {
    assert!(PublicEntryQuery::default().to_params().is_empty());

    let q = PublicEntryQuery {
      face_ids:     vec![FaceId(3), FaceId(7)],
      category_ids: vec![],
    };
    assert_eq!(q.to_params(), vec![("face_ids", "3,7".to_owned())]);
  }

  #[test]
  fn category_type_is_optional() {
    let lookup = CategoryLookup { name: "Prague".into(), category_type: None };
    assert_eq!(lookup.to_params().len(), 1);
    let lookup = CategoryLookup {
      name:          "Prague".into(),
      category_type: Some(CategoryType::Place),
    };
    assert_eq!(lookup.to_params()[1], ("category_type", "place".to_owned()));
  }
}
