//! List endpoints answer either with a bare array or with a paging envelope
//! carrying a `results` field. Both decode to a bare `Vec<T>`.

use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
  Bare(Vec<T>),
  Paged { results: Vec<T> },
}

pub(crate) fn normalize<T>(value: serde_json::Value) -> Result<Vec<T>, serde_json::Error>
where
  T: for<'de> Deserialize<'de>,
{
  Ok(match serde_json::from_value::<ListBody<T>>(value)? {
    ListBody::Bare(items) | ListBody::Paged { results: items } => items,
  })
}
