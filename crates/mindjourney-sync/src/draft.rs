//! An entry being composed, before it is submitted.

use mindjourney_core::{
  ValidationError,
  entry::{NewDocument, NewEntry},
  face::FaceSuggestion,
  id::FaceId,
};

use crate::suggest::SuggestionInputs;

/// What accepting a suggestion did to the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionOutcome {
  Added(FaceId),
  AlreadySelected(FaceId),
  /// The suggestion proposes a face that does not exist yet; it has to be
  /// created explicitly before it can be attached.
  NeedsCreation,
}

#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
  pub title:     String,
  pub content:   String,
  pub is_public: bool,
  faces:         Vec<FaceId>,
  documents:     Vec<NewDocument>,
}

impl EntryDraft {
  pub fn new(content: impl Into<String>) -> Self {
    Self { content: content.into(), ..Self::default() }
  }

  /// Selected faces in selection order.
  pub fn faces(&self) -> &[FaceId] { &self.faces }

  /// Returns whether the face was newly selected.
  pub fn select_face(&mut self, id: FaceId) -> bool {
    if self.faces.contains(&id) {
      return false;
    }
    self.faces.push(id);
    true
  }

  /// Add a local file to upload after the entry is created.
  pub fn attach(&mut self, document: NewDocument) -> Result<(), ValidationError> {
    document.validate()?;
    self.documents.push(document);
    Ok(())
  }

  pub fn documents(&self) -> &[NewDocument] { &self.documents }

  /// Accept a face suggestion. Only suggestions naming an existing face
  /// change the selection; no network call is made.
  pub fn accept_suggestion(&mut self, suggestion: &FaceSuggestion) -> SuggestionOutcome {
    match suggestion.id {
      Some(id) if self.select_face(id) => SuggestionOutcome::Added(id),
      Some(id) => SuggestionOutcome::AlreadySelected(id),
      None => SuggestionOutcome::NeedsCreation,
    }
  }

  pub fn suggestion_inputs(&self) -> SuggestionInputs {
    SuggestionInputs::new(self.title.clone(), self.content.clone())
  }

  /// The create request for this draft, validated.
  pub fn to_new_entry(&self) -> Result<NewEntry, ValidationError> {
    let title = self.title.trim();
    let entry = NewEntry {
      title:     (!title.is_empty()).then(|| title.to_owned()),
      content:   self.content.clone(),
      is_public: self.is_public,
      face_ids:  self.faces.clone(),
    };
    entry.validate()?;
    Ok(entry)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn suggestion(id: Option<i64>) -> FaceSuggestion {
    FaceSuggestion { name: "Traveler".into(), icon: "🧳".into(), id: id.map(FaceId) }
  }

  #[test]
  fn existing_suggestions_are_selected_once() {
    let mut draft = EntryDraft::new("Visited Prague today");
    assert_eq!(draft.accept_suggestion(&suggestion(Some(4))), SuggestionOutcome::Added(FaceId(4)));
    assert_eq!(
      draft.accept_suggestion(&suggestion(Some(4))),
      SuggestionOutcome::AlreadySelected(FaceId(4))
    );
    assert_eq!(draft.faces(), &[FaceId(4)]);
  }

  #[test]
  fn new_face_proposals_leave_the_draft_alone() {
    let mut draft = EntryDraft::new("Visited Prague today");
    assert_eq!(draft.accept_suggestion(&suggestion(None)), SuggestionOutcome::NeedsCreation);
    assert!(draft.faces().is_empty());
  }

  #[test]
  fn whitespace_content_does_not_validate() {
    let draft = EntryDraft::new("   \n\t");
    assert_eq!(draft.to_new_entry().unwrap_err(), ValidationError::EmptyContent);
  }

  #[test]
  fn blank_title_is_omitted() {
    let mut draft = EntryDraft::new("Body");
    draft.title = "  ".into();
    draft.select_face(FaceId(2));
    let entry = draft.to_new_entry().unwrap();
    assert_eq!(entry.title, None);
    assert_eq!(entry.face_ids, vec![FaceId(2)]);
  }

  #[test]
  fn empty_documents_are_refused() {
    let mut draft = EntryDraft::new("Body");
    assert!(draft.attach(NewDocument::new("empty.txt", Vec::<u8>::new())).is_err());
    assert!(draft.documents().is_empty());
  }
}
