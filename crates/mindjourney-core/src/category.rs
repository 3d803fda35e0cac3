//! Categories, the global classification attached to insights.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ValidationError, id::CategoryId};

/// The fixed set of category kinds the extraction backend produces.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
  Place,
  Product,
  Movie,
  Meal,
  Person,
  Activity,
  Emotion,
  /// Also the landing spot for any type string this client does not know.
  #[default]
  #[serde(other)]
  Other,
}

impl CategoryType {
  pub const ALL: [Self; 8] = [
    Self::Place,
    Self::Product,
    Self::Movie,
    Self::Meal,
    Self::Person,
    Self::Activity,
    Self::Emotion,
    Self::Other,
  ];

  /// The wire string; must match the `rename_all = "lowercase"` tags above.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Place => "place",
      Self::Product => "product",
      Self::Movie => "movie",
      Self::Meal => "meal",
      Self::Person => "person",
      Self::Activity => "activity",
      Self::Emotion => "emotion",
      Self::Other => "other",
    }
  }
}

impl fmt::Display for CategoryType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
}

impl FromStr for CategoryType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_ascii_lowercase();
    Self::ALL
      .into_iter()
      .find(|t| t.as_str() == lower)
      .ok_or_else(|| format!("unknown category type {s:?}"))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id:            CategoryId,
  pub name:          String,
  #[serde(default)]
  pub category_type: CategoryType,
  #[serde(default)]
  pub description:   String,
  pub created_at:    Option<DateTime<Utc>>,
}

/// Body of `POST /categories/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
  pub name:          String,
  pub category_type: CategoryType,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description:   String,
}

impl NewCategory {
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.name.trim().is_empty() {
      return Err(ValidationError::EmptyCategoryName);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_type_decodes_as_other() {
    let t: CategoryType = serde_json::from_str("\"vehicle\"").unwrap();
    assert_eq!(t, CategoryType::Other);
    let t: CategoryType = serde_json::from_str("\"place\"").unwrap();
    assert_eq!(t, CategoryType::Place);
  }

  #[test]
  fn parses_case_insensitively() {
    assert_eq!("Meal".parse::<CategoryType>().unwrap(), CategoryType::Meal);
    assert!("spaceship".parse::<CategoryType>().is_err());
  }
}
