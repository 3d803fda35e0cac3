//! The `JournalBackend` trait: the REST surface the client core consumes.
//!
//! The trait is implemented by the HTTP gateway (`mindjourney-client`) and by
//! in-memory fakes in tests. The synchronisation layer depends on this
//! abstraction, not on any concrete transport.

use std::future::Future;

use crate::{
  Result,
  category::{Category, CategoryType, NewCategory},
  entry::{Document, Entry, EntryPatch, NewDocument, NewEntry},
  face::{Face, FacePatch, FaceSuggestion, NewFace},
  id::{DocumentId, EntryId, FaceId},
  query::{CategoryLookup, PublicEntryQuery},
};

/// Abstraction over the journaling backend.
///
/// List methods always return bare vectors; any paging envelope is the
/// implementation's problem. All futures are `Send` so they can run on a
/// multi-threaded tokio runtime.
pub trait JournalBackend: Send + Sync {
  // ── Entries ───────────────────────────────────────────────────────────

  /// The caller's own entries, newest first.
  fn list_entries(&self) -> impl Future<Output = Result<Vec<Entry>>> + Send + '_;

  /// Fails with [`crate::Error::NotFound`] for unknown ids.
  fn get_entry(&self, id: EntryId) -> impl Future<Output = Result<Entry>> + Send + '_;

  /// Returns the canonical created entry (`insights_processed == false`).
  fn create_entry(&self, input: NewEntry) -> impl Future<Output = Result<Entry>> + Send + '_;

  fn update_entry(
    &self,
    id: EntryId,
    patch: EntryPatch,
  ) -> impl Future<Output = Result<Entry>> + Send + '_;

  /// Cascades to the entry's insights and documents only.
  fn delete_entry(&self, id: EntryId) -> impl Future<Output = Result<()>> + Send + '_;

  /// Public entries from all users, filtered server-side.
  fn public_entries<'a>(
    &'a self,
    query: &'a PublicEntryQuery,
  ) -> impl Future<Output = Result<Vec<Entry>>> + Send + 'a;

  fn search_entries<'a>(
    &'a self,
    q: &'a str,
  ) -> impl Future<Output = Result<Vec<Entry>>> + Send + 'a;

  fn entries_by_face(&self, face: FaceId) -> impl Future<Output = Result<Vec<Entry>>> + Send + '_;

  fn entries_by_category<'a>(
    &'a self,
    lookup: &'a CategoryLookup,
  ) -> impl Future<Output = Result<Vec<Entry>>> + Send + 'a;

  /// Resets `insights_processed` server-side and re-triggers extraction.
  fn reprocess_entry(&self, id: EntryId) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  fn upload_document(
    &self,
    entry: EntryId,
    doc: NewDocument,
  ) -> impl Future<Output = Result<Document>> + Send + '_;

  fn delete_document(
    &self,
    entry: EntryId,
    doc: DocumentId,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Faces ─────────────────────────────────────────────────────────────

  fn list_faces(&self) -> impl Future<Output = Result<Vec<Face>>> + Send + '_;

  fn subscribed_faces(&self) -> impl Future<Output = Result<Vec<Face>>> + Send + '_;

  fn create_face(&self, input: NewFace) -> impl Future<Output = Result<Face>> + Send + '_;

  fn update_face(
    &self,
    id: FaceId,
    patch: FacePatch,
  ) -> impl Future<Output = Result<Face>> + Send + '_;

  fn subscribe_face(&self, id: FaceId) -> impl Future<Output = Result<()>> + Send + '_;

  fn unsubscribe_face(&self, id: FaceId) -> impl Future<Output = Result<()>> + Send + '_;

  fn suggest_faces<'a>(
    &'a self,
    title: &'a str,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<FaceSuggestion>>> + Send + 'a;

  // ── Categories ────────────────────────────────────────────────────────

  fn list_categories(&self) -> impl Future<Output = Result<Vec<Category>>> + Send + '_;

  fn categories_by_type(
    &self,
    kind: CategoryType,
  ) -> impl Future<Output = Result<Vec<Category>>> + Send + '_;

  fn create_category(
    &self,
    input: NewCategory,
  ) -> impl Future<Output = Result<Category>> + Send + '_;
}
