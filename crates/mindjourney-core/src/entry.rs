//! Entries (the journal records) and the server-owned data hanging off
//! them (insights and documents).
//!
//! `insights` and `overall_sentiment` are only meaningful once the backend
//! has flipped `insights_processed`; the accessors on [`Entry`] enforce that.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  ValidationError,
  category::Category,
  face::Face,
  id::{DocumentId, EntryId, FaceId, InsightId},
};

/// Upload limit enforced before a document reaches the network. Same cap as
/// the web client's file picker (10 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

// ─── Read models ─────────────────────────────────────────────────────────────

/// A backend-derived annotation over a span of the entry's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
  pub id:               InsightId,
  pub category:         Category,
  pub text_snippet:     String,
  /// In `[-1, 1]`.
  pub sentiment_score:  f64,
  /// In `[0, 1]`.
  pub confidence_score: f64,
  pub start_position:   Option<u32>,
  pub end_position:     Option<u32>,
  #[serde(default)]
  pub is_manual_edit:   bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id:           DocumentId,
  pub filename:     String,
  /// Size in bytes.
  pub file_size:    u64,
  /// Opaque storage reference (URL or path) as handed out by the backend.
  #[serde(default)]
  pub file:         Option<String>,
  #[serde(default)]
  pub content_type: Option<String>,
  pub uploaded_at:  Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
  pub id:                 EntryId,
  #[serde(default)]
  pub user:               Option<String>,
  #[serde(default)]
  pub title:              Option<String>,
  pub content:            String,
  #[serde(default)]
  pub is_public:          bool,
  pub created_at:         DateTime<Utc>,
  /// Server-assigned on every save; used to order competing responses.
  #[serde(default)]
  pub updated_at:         Option<DateTime<Utc>>,
  #[serde(default)]
  pub insights_processed: bool,
  #[serde(default)]
  pub overall_sentiment:  Option<f64>,
  #[serde(default)]
  pub faces:              Vec<Face>,
  #[serde(default)]
  pub insights:           Vec<Insight>,
  #[serde(default)]
  pub documents:          Vec<Document>,
  #[serde(default)]
  pub location_name:      Option<String>,
  #[serde(default)]
  pub latitude:           Option<f64>,
  #[serde(default)]
  pub longitude:          Option<f64>,
}

impl Entry {
  /// Insights, or `None` while processing is still pending.
  pub fn processed_insights(&self) -> Option<&[Insight]> {
    self.insights_processed.then_some(self.insights.as_slice())
  }

  /// Overall sentiment, or `None` while processing is pending or when the
  /// backend produced none.
  pub fn sentiment(&self) -> Option<f64> {
    if self.insights_processed { self.overall_sentiment } else { None }
  }

  pub fn face_ids(&self) -> Vec<FaceId> { self.faces.iter().map(|f| f.id).collect() }

  pub fn has_face(&self, face: FaceId) -> bool { self.faces.iter().any(|f| f.id == face) }

  /// Display title; falls back to "Untitled".
  pub fn display_title(&self) -> &str {
    match self.title.as_deref().map(str::trim) {
      Some(t) if !t.is_empty() => t,
      _ => "Untitled",
    }
  }
}

// ─── Write models ────────────────────────────────────────────────────────────

/// Body of `POST /entries/`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewEntry {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:     Option<String>,
  pub content:   String,
  pub is_public: bool,
  pub face_ids:  Vec<FaceId>,
}

impl NewEntry {
  pub fn new(content: impl Into<String>) -> Self {
    Self { content: content.into(), ..Default::default() }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.content.trim().is_empty() {
      return Err(ValidationError::EmptyContent);
    }
    Ok(())
  }
}

/// Body of `PATCH /entries/{id}/`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_public: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub face_ids:  Option<Vec<FaceId>>,
}

impl EntryPatch {
  pub fn validate(&self) -> Result<(), ValidationError> {
    match &self.content {
      Some(c) if c.trim().is_empty() => Err(ValidationError::EmptyContent),
      _ => Ok(()),
    }
  }
}

/// A file picked for upload. Uploads are never retried automatically.
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub filename:     String,
  pub content_type: Option<String>,
  pub data:         Bytes,
}

impl NewDocument {
  pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
    Self { filename: filename.into(), content_type: None, data: data.into() }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.data.is_empty() {
      return Err(ValidationError::EmptyDocument(self.filename.clone()));
    }
    if self.data.len() > MAX_DOCUMENT_BYTES {
      return Err(ValidationError::DocumentTooLarge {
        filename: self.filename.clone(),
        size:     self.data.len(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry_json(processed: bool) -> serde_json::Value {
    serde_json::json!({
      "id": 7,
      "title": "",
      "content": "Visited Prague today",
      "is_public": true,
      "created_at": "2026-03-01T10:00:00Z",
      "insights_processed": processed,
      "overall_sentiment": 0.6,
      "insights": [{
        "id": 1,
        "category": {"id": 3, "name": "Prague", "category_type": "place"},
        "text_snippet": "Prague",
        "sentiment_score": 0.6,
        "confidence_score": 0.9
      }]
    })
  }

  #[test]
  fn provisional_fields_hidden_until_processed() {
    let pending: Entry = serde_json::from_value(entry_json(false)).unwrap();
    assert!(pending.processed_insights().is_none());
    assert_eq!(pending.sentiment(), None);

    let done: Entry = serde_json::from_value(entry_json(true)).unwrap();
    assert_eq!(done.processed_insights().map(<[_]>::len), Some(1));
    assert_eq!(done.sentiment(), Some(0.6));
  }

  #[test]
  fn blank_title_displays_untitled() {
    let entry: Entry = serde_json::from_value(entry_json(false)).unwrap();
    assert_eq!(entry.display_title(), "Untitled");
  }

  #[test]
  fn content_must_not_be_blank() {
    assert_eq!(NewEntry::new("").validate(), Err(ValidationError::EmptyContent));
    assert_eq!(NewEntry::new(" \n\t").validate(), Err(ValidationError::EmptyContent));
    assert!(NewEntry::new("hello").validate().is_ok());

    let patch = EntryPatch { content: Some("  ".into()), ..Default::default() };
    assert_eq!(patch.validate(), Err(ValidationError::EmptyContent));
    assert!(EntryPatch::default().validate().is_ok());
  }

  #[test]
  fn documents_are_size_checked() {
    assert!(NewDocument::new("a.txt", Vec::new()).validate().is_err());
    assert!(NewDocument::new("a.txt", b"notes".to_vec()).validate().is_ok());
    let big = NewDocument::new("big.pdf", vec![0u8; MAX_DOCUMENT_BYTES + 1]);
    assert!(matches!(
      big.validate(),
      Err(ValidationError::DocumentTooLarge { .. })
    ));
  }
}
