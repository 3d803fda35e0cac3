//! Faces: user-defined personas attachable to entries and subscribable
//! for feed filtering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{ValidationError, id::FaceId};

/// Icon shown when a face has none of its own.
pub const DEFAULT_ICON: &str = "🙂";

fn icon_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  let raw: Option<String> = Option::deserialize(d)?;
  Ok(match raw {
    Some(s) if !s.trim().is_empty() => s,
    _ => DEFAULT_ICON.to_owned(),
  })
}

fn default_icon() -> String { DEFAULT_ICON.to_owned() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
  pub id:          FaceId,
  pub name:        String,
  #[serde(default = "default_icon", deserialize_with = "icon_or_default")]
  pub icon:        String,
  #[serde(default)]
  pub description: String,
  pub created_at:  Option<DateTime<Utc>>,
  pub updated_at:  Option<DateTime<Utc>>,
}

/// Body of `POST /faces/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewFace {
  pub name:        String,
  pub icon:        String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
}

impl NewFace {
  /// A face with the placeholder icon and no description.
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name:        name.into(),
      icon:        DEFAULT_ICON.to_owned(),
      description: String::new(),
    }
  }

  /// Trims the name and checks it is non-empty.
  pub fn validated(mut self) -> Result<Self, ValidationError> {
    self.name = validate_face_name(&self.name)?;
    if self.icon.trim().is_empty() {
      self.icon = DEFAULT_ICON.to_owned();
    }
    Ok(self)
  }
}

/// Body of `PATCH /faces/{id}/`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FacePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl FacePatch {
  pub fn validated(mut self) -> Result<Self, ValidationError> {
    if let Some(name) = &self.name {
      self.name = Some(validate_face_name(name)?);
    }
    Ok(self)
  }
}

fn validate_face_name(name: &str) -> Result<String, ValidationError> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(ValidationError::EmptyFaceName);
  }
  Ok(trimmed.to_owned())
}

/// One item of `GET /faces/suggest/`.
///
/// `id` present means the suggestion names an existing face; absent means a
/// proposal for a face that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceSuggestion {
  pub name: String,
  #[serde(default = "default_icon", deserialize_with = "icon_or_default")]
  pub icon: String,
  #[serde(default)]
  pub id:   Option<FaceId>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_icon_falls_back_to_placeholder() {
    let face: Face =
      serde_json::from_str(r#"{"id": 4, "name": "Gardener", "icon": ""}"#).unwrap();
    assert_eq!(face.icon, DEFAULT_ICON);

    let face: Face = serde_json::from_str(r#"{"id": 4, "name": "Gardener"}"#).unwrap();
    assert_eq!(face.icon, DEFAULT_ICON);
  }

  #[test]
  fn face_name_is_trimmed_and_required() {
    let face = NewFace::named("  Father ").validated().unwrap();
    assert_eq!(face.name, "Father");

    let err = NewFace::named("   ").validated().unwrap_err();
    assert_eq!(err, ValidationError::EmptyFaceName);

    let err = FacePatch { name: Some("\t".into()), ..Default::default() }
      .validated()
      .unwrap_err();
    assert_eq!(err, ValidationError::EmptyFaceName);
  }
}
