//! In-memory [`JournalBackend`] for exercising the sync core.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  sync::{Mutex, MutexGuard},
  time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use mindjourney_core::{
  Error, Result,
  backend::JournalBackend,
  category::{Category, CategoryType, NewCategory},
  entry::{Document, Entry, EntryPatch, NewDocument, NewEntry},
  face::{Face, FacePatch, FaceSuggestion, NewFace},
  id::{CategoryId, DocumentId, EntryId, FaceId},
  query::{CategoryLookup, PublicEntryQuery},
};

type Finish = Box<dyn FnOnce(&mut Entry) + Send>;

struct Processing {
  /// Reads still answered with the unprocessed entry.
  remaining: usize,
  finish:    Finish,
}

#[derive(Default)]
struct State {
  entries:        BTreeMap<EntryId, Entry>,
  faces:          Vec<Face>,
  subscribed:     BTreeSet<FaceId>,
  categories:     Vec<Category>,
  suggestions:    Vec<FaceSuggestion>,
  processing:     HashMap<EntryId, Processing>,
  /// Per operation: (call number, error).
  failures:       HashMap<&'static str, Vec<(usize, Error)>>,
  calls:          HashMap<&'static str, usize>,
  public_queries: Vec<PublicEntryQuery>,
  next_id:        i64,
  clock:          i64,
}

impl State {
  fn next_id(&mut self) -> i64 {
    self.next_id += 1;
    self.next_id
  }

  fn tick(&mut self) -> DateTime<Utc> {
    self.clock += 1;
    Utc.timestamp_opt(1_767_225_600 + self.clock, 0).single().unwrap_or_default()
  }

  fn entry(&self, id: EntryId) -> Result<Entry> {
    self.entries.get(&id).cloned().ok_or_else(|| Error::NotFound(format!("entries/{id}")))
  }

  fn entry_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
    self.entries.get_mut(&id).ok_or_else(|| Error::NotFound(format!("entries/{id}")))
  }

  fn newest_first(&self, keep: impl Fn(&Entry) -> bool) -> Vec<Entry> {
    self.entries.values().rev().filter(|e| keep(e)).cloned().collect()
  }
}

#[derive(Default)]
pub struct FakeBackend {
  state:   Mutex<State>,
  latency: Option<Duration>,
}

fn face(id: i64, name: &str) -> Face {
  Face {
    id:          FaceId(id),
    name:        name.into(),
    icon:        "🙂".into(),
    description: String::new(),
    created_at:  None,
    updated_at:  None,
  }
}

impl FakeBackend {
  pub fn new() -> Self { Self::default() }

  /// Every call waits `latency` (in tokio time) before answering.
  pub fn with_latency(latency: Duration) -> Self { Self { latency: Some(latency), ..Self::default() } }

  fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap() }

  pub fn calls(&self, op: &str) -> usize { self.lock().calls.get(op).copied().unwrap_or(0) }

  /// Fail the next call to `op` with `error`.
  pub fn fail_next(&self, op: &'static str, error: Error) {
    let call = self.calls(op) + 1;
    self.fail_on(op, call, error);
  }

  /// Fail the `call`-th call (counting from one) to `op`.
  pub fn fail_on(&self, op: &'static str, call: usize, error: Error) {
    self.lock().failures.entry(op).or_default().push((call, error));
  }

  pub fn add_face(&self, name: &str) -> Face {
    let mut state = self.lock();
    let face = face(state.next_id(), name);
    state.faces.push(face.clone());
    face
  }

  pub fn set_suggestions(&self, suggestions: Vec<FaceSuggestion>) {
    self.lock().suggestions = suggestions;
  }

  /// Report `id` unprocessed for `reads` more reads, then apply `finish`
  /// and mark it processed.
  pub fn process_after(
    &self,
    id: EntryId,
    reads: usize,
    finish: impl FnOnce(&mut Entry) + Send + 'static,
  ) {
    self.lock().processing.insert(id, Processing { remaining: reads, finish: Box::new(finish) });
  }

  pub fn stored(&self, id: EntryId) -> Option<Entry> { self.lock().entries.get(&id).cloned() }

  pub fn public_queries(&self) -> Vec<PublicEntryQuery> { self.lock().public_queries.clone() }

  async fn enter(&self, op: &'static str) -> Result<()> {
    let call = {
      let mut state = self.lock();
      let calls = state.calls.entry(op).or_default();
      *calls += 1;
      *calls
    };
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }
    let mut state = self.lock();
    let Some(failures) = state.failures.get_mut(op) else { return Ok(()) };
    match failures.iter().position(|(n, _)| *n == call) {
      Some(i) => Err(failures.remove(i).1),
      None => Ok(()),
    }
  }
}

impl JournalBackend for FakeBackend {
  async fn list_entries(&self) -> Result<Vec<Entry>> {
    self.enter("list_entries").await?;
    Ok(self.lock().newest_first(|_| true))
  }

  async fn get_entry(&self, id: EntryId) -> Result<Entry> {
    self.enter("get_entry").await?;
    let mut state = self.lock();
    if let Some(mut processing) = state.processing.remove(&id) {
      if processing.remaining > 1 {
        processing.remaining -= 1;
        state.processing.insert(id, processing);
      } else {
        let now = state.tick();
        let entry = state.entry_mut(id)?;
        (processing.finish)(entry);
        entry.insights_processed = true;
        entry.updated_at = Some(now);
      }
    }
    state.entry(id)
  }

  async fn create_entry(&self, input: NewEntry) -> Result<Entry> {
    self.enter("create_entry").await?;
    let mut state = self.lock();
    let id = EntryId(state.next_id());
    let now = state.tick();
    let faces = state.faces.iter().filter(|f| input.face_ids.contains(&f.id)).cloned().collect();
    let entry = Entry {
      id,
      user: Some("me".into()),
      title: input.title,
      content: input.content,
      is_public: input.is_public,
      created_at: now,
      updated_at: Some(now),
      insights_processed: false,
      overall_sentiment: None,
      faces,
      insights: vec![],
      documents: vec![],
      location_name: None,
      latitude: None,
      longitude: None,
    };
    state.entries.insert(id, entry.clone());
    Ok(entry)
  }

  async fn update_entry(&self, id: EntryId, patch: EntryPatch) -> Result<Entry> {
    self.enter("update_entry").await?;
    let mut state = self.lock();
    let now = state.tick();
    let all_faces = state.faces.clone();
    let entry = state.entry_mut(id)?;
    if let Some(title) = patch.title {
      entry.title = Some(title);
    }
    if let Some(content) = patch.content {
      entry.content = content;
    }
    if let Some(is_public) = patch.is_public {
      entry.is_public = is_public;
    }
    if let Some(ids) = patch.face_ids {
      entry.faces = all_faces.into_iter().filter(|f| ids.contains(&f.id)).collect();
    }
    entry.updated_at = Some(now);
    Ok(entry.clone())
  }

  async fn delete_entry(&self, id: EntryId) -> Result<()> {
    self.enter("delete_entry").await?;
    self.lock().entries.remove(&id).map(|_| ()).ok_or_else(|| Error::NotFound(format!("entries/{id}")))
  }

  async fn public_entries<'a>(&'a self, query: &'a PublicEntryQuery) -> Result<Vec<Entry>> {
    self.enter("public_entries").await?;
    let mut state = self.lock();
    state.public_queries.push(query.clone());
    Ok(state.newest_first(|e| {
      e.is_public
        && (query.face_ids.is_empty() || query.face_ids.iter().any(|f| e.has_face(*f)))
        && (query.category_ids.is_empty()
          || e.insights.iter().any(|i| query.category_ids.contains(&i.category.id)))
    }))
  }

  async fn search_entries<'a>(&'a self, q: &'a str) -> Result<Vec<Entry>> {
    self.enter("search_entries").await?;
    let q = q.to_lowercase();
    Ok(self.lock().newest_first(|e| e.content.to_lowercase().contains(&q)))
  }

  async fn entries_by_face(&self, face: FaceId) -> Result<Vec<Entry>> {
    self.enter("entries_by_face").await?;
    Ok(self.lock().newest_first(|e| e.has_face(face)))
  }

  async fn entries_by_category<'a>(&'a self, lookup: &'a CategoryLookup) -> Result<Vec<Entry>> {
    self.enter("entries_by_category").await?;
    Ok(self.lock().newest_first(|e| {
      e.insights.iter().any(|i| {
        i.category.name.eq_ignore_ascii_case(&lookup.name)
          && lookup.category_type.is_none_or(|t| t == i.category.category_type)
      })
    }))
  }

  async fn reprocess_entry(&self, id: EntryId) -> Result<()> {
    self.enter("reprocess_entry").await?;
    let mut state = self.lock();
    let now = state.tick();
    let entry = state.entry_mut(id)?;
    entry.insights_processed = false;
    entry.updated_at = Some(now);
    Ok(())
  }

  async fn upload_document(&self, entry: EntryId, doc: NewDocument) -> Result<Document> {
    self.enter("upload_document").await?;
    let mut state = self.lock();
    let id = DocumentId(state.next_id());
    let document = Document {
      id,
      filename: doc.filename,
      file_size: doc.data.len() as u64,
      file: None,
      content_type: doc.content_type,
      uploaded_at: None,
    };
    state.entry_mut(entry)?.documents.push(document.clone());
    Ok(document)
  }

  async fn delete_document(&self, entry: EntryId, doc: DocumentId) -> Result<()> {
    self.enter("delete_document").await?;
    self.lock().entry_mut(entry)?.documents.retain(|d| d.id != doc);
    Ok(())
  }

  async fn list_faces(&self) -> Result<Vec<Face>> {
    self.enter("list_faces").await?;
    Ok(self.lock().faces.clone())
  }

  async fn subscribed_faces(&self) -> Result<Vec<Face>> {
    self.enter("subscribed_faces").await?;
    let state = self.lock();
    Ok(state.faces.iter().filter(|f| state.subscribed.contains(&f.id)).cloned().collect())
  }

  async fn create_face(&self, input: NewFace) -> Result<Face> {
    self.enter("create_face").await?;
    let mut state = self.lock();
    let face = Face { icon: input.icon, description: input.description, ..face(state.next_id(), &input.name) };
    state.faces.push(face.clone());
    Ok(face)
  }

  async fn update_face(&self, id: FaceId, patch: FacePatch) -> Result<Face> {
    self.enter("update_face").await?;
    let mut state = self.lock();
    let face = state
      .faces
      .iter_mut()
      .find(|f| f.id == id)
      .ok_or_else(|| Error::NotFound(format!("faces/{id}")))?;
    if let Some(name) = patch.name {
      face.name = name;
    }
    if let Some(icon) = patch.icon {
      face.icon = icon;
    }
    if let Some(description) = patch.description {
      face.description = description;
    }
    Ok(face.clone())
  }

  async fn subscribe_face(&self, id: FaceId) -> Result<()> {
    self.enter("subscribe_face").await?;
    self.lock().subscribed.insert(id);
    Ok(())
  }

  async fn unsubscribe_face(&self, id: FaceId) -> Result<()> {
    self.enter("unsubscribe_face").await?;
    self.lock().subscribed.remove(&id);
    Ok(())
  }

  async fn suggest_faces<'a>(&'a self, _title: &'a str, _text: &'a str) -> Result<Vec<FaceSuggestion>> {
    self.enter("suggest_faces").await?;
    Ok(self.lock().suggestions.clone())
  }

  async fn list_categories(&self) -> Result<Vec<Category>> {
    self.enter("list_categories").await?;
    Ok(self.lock().categories.clone())
  }

  async fn categories_by_type(&self, kind: CategoryType) -> Result<Vec<Category>> {
    self.enter("categories_by_type").await?;
    Ok(self.lock().categories.iter().filter(|c| c.category_type == kind).cloned().collect())
  }

  async fn create_category(&self, input: NewCategory) -> Result<Category> {
    self.enter("create_category").await?;
    let mut state = self.lock();
    let category = Category {
      id:            CategoryId(state.next_id()),
      name:          input.name,
      category_type: input.category_type,
      description:   input.description,
      created_at:    None,
    };
    state.categories.push(category.clone());
    Ok(category)
  }
}
