//! [`Journal`], the client core: a backend wired to the cache, the poller
//! and the mutation coordinator.

use std::{marker::PhantomData, sync::Arc};

use mindjourney_core::{
  Error, Result, ValidationError,
  backend::JournalBackend,
  category::{Category, CategoryType, NewCategory},
  entry::{Document, Entry, EntryPatch, NewDocument, NewEntry},
  face::{Face, FacePatch, FaceSuggestion, NewFace},
  id::{DocumentId, EntryId, FaceId},
  query::CategoryLookup,
};

use crate::{
  cache::{BoxFuture, CacheEvent, Loader, Observer, QueryCache},
  config::SyncConfig,
  deps::{ChangeKind, Target, invalidation_set},
  draft::EntryDraft,
  filter::FilterSignature,
  key::{CacheKey, EntryListKey, KeyPattern},
  mutation::{Effects, MutationCoordinator},
  poller::{EntrySource, EntryWatch, PollState, Poller},
  resource::{FromResource, Resource},
  suggest::SuggestionInputs,
};

async fn load<B: JournalBackend>(backend: &B, key: &CacheKey) -> Result<Resource> {
  Ok(match key {
    CacheKey::Entry(id) => Resource::Entry(backend.get_entry(*id).await?),
    CacheKey::EntryList(list) => Resource::Entries(match list {
      EntryListKey::Timeline => backend.list_entries().await?,
      EntryListKey::Public(signature) => {
        let query = signature.to_query();
        backend.public_entries(&query).await?
      }
      EntryListKey::Search(q) => backend.search_entries(q).await?,
      EntryListKey::ByFace(id) => backend.entries_by_face(*id).await?,
      EntryListKey::ByCategory(lookup) => backend.entries_by_category(lookup).await?,
    }),
    CacheKey::Faces => Resource::Faces(backend.list_faces().await?),
    CacheKey::SubscribedFaces => Resource::Faces(backend.subscribed_faces().await?),
    CacheKey::Categories => Resource::Categories(backend.list_categories().await?),
    CacheKey::CategoriesByType(kind) => {
      Resource::Categories(backend.categories_by_type(*kind).await?)
    }
    CacheKey::FaceSuggestions(inputs) => {
      Resource::Suggestions(backend.suggest_faces(&inputs.title, &inputs.content).await?)
    }
  })
}

fn loader<B: JournalBackend + 'static>(backend: &Arc<B>, key: &CacheKey) -> Loader<Resource> {
  let backend = Arc::clone(backend);
  let key = key.clone();
  Arc::new(move || -> BoxFuture<Resource> {
    let backend = Arc::clone(&backend);
    let key = key.clone();
    Box::pin(async move { load(&*backend, &key).await })
  })
}

/// Poll source reading entries through the journal's cache.
pub struct EntryFetcher<B> {
  backend: Arc<B>,
  cache:   QueryCache<Resource>,
}

impl<B: JournalBackend + 'static> EntrySource for EntryFetcher<B> {
  fn cached(&self, id: EntryId) -> Option<Entry> {
    self
      .cache
      .read(&CacheKey::Entry(id))
      .and_then(|hit| Entry::from_resource(hit.value))
  }

  async fn fetch(&self, id: EntryId) -> Result<Entry> {
    let key = CacheKey::Entry(id);
    let loader = loader(&self.backend, &key);
    let value = self.cache.refetch(&key, || loader()).await?;
    Entry::extract(value)
  }

  fn settled(&self, entry: &Entry) {
    for pattern in invalidation_set(ChangeKind::InsightsSettled, Target::Entry(entry.id)) {
      self.cache.invalidate(&pattern);
    }
  }
}

/// The outcome of creating an entry together with its documents.
#[derive(Debug, Clone)]
pub struct CreatedEntry {
  pub entry:        Entry,
  /// Documents uploaded before any failure, in submission order.
  pub documents:    Vec<Document>,
  pub upload_error: Option<UploadFailure>,
}

/// The upload that stopped a compound create. The entry itself was kept.
#[derive(Debug, Clone)]
pub struct UploadFailure {
  pub filename: String,
  pub error:    Error,
  /// Files that were never attempted.
  pub skipped:  Vec<String>,
}

/// A typed registration on one cache key.
pub struct Subscription<T> {
  observer: Observer<Resource>,
  _marker:  PhantomData<fn() -> T>,
}

impl<T: FromResource> Subscription<T> {
  pub fn key(&self) -> &CacheKey { self.observer.key() }

  /// The cached value, fresh or stale.
  pub fn current(&self) -> Option<T> {
    self.observer.current().and_then(|hit| T::from_resource(hit.value))
  }

  pub fn is_stale(&self) -> bool { self.observer.current().is_some_and(|hit| hit.stale) }

  /// Wait for the next value stored under the key.
  pub async fn next(&mut self) -> Result<T> { T::extract(self.observer.next_value().await?) }

  pub async fn changed(&mut self) -> Option<CacheEvent> { self.observer.changed().await }
}

/// An open entry: its cached value plus its processing status.
pub struct EntryView<B: JournalBackend + 'static> {
  status: EntryWatch<EntryFetcher<B>>,
  entry:  Subscription<Entry>,
}

impl<B: JournalBackend + 'static> EntryView<B> {
  pub fn id(&self) -> EntryId { self.status.id() }

  pub fn entry(&self) -> Option<Entry> { self.entry.current() }

  pub fn state(&self) -> PollState { self.status.state() }

  pub async fn next(&mut self) -> Result<Entry> { self.entry.next().await }

  /// Wait for processing to finish and return the processed entry. Fails
  /// with [`Error::NotFound`] if the entry is gone.
  pub async fn wait_settled(&mut self) -> Result<Entry> {
    self.status.wait_settled().await?;
    match self.entry.current() {
      Some(entry) if entry.insights_processed => Ok(entry),
      _ => self.status.refresh_now().await,
    }
  }

  /// Fetch immediately without touching the polling schedule.
  pub async fn refresh_now(&self) -> Result<Entry> { self.status.refresh_now().await }
}

struct Inner<B> {
  backend:   Arc<B>,
  cache:     QueryCache<Resource>,
  mutations: MutationCoordinator,
  poller:    Poller<EntryFetcher<B>>,
  config:    SyncConfig,
}

/// Shared handle on the client core. Cheap to clone.
pub struct Journal<B> {
  inner: Arc<Inner<B>>,
}

impl<B> Clone for Journal<B> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<B: JournalBackend + 'static> Journal<B> {
  pub fn new(backend: B, config: SyncConfig) -> Self {
    let backend = Arc::new(backend);
    let cache = QueryCache::new();
    let fetcher = EntryFetcher { backend: Arc::clone(&backend), cache: cache.clone() };
    Self {
      inner: Arc::new(Inner {
        mutations: MutationCoordinator::new(cache.clone()),
        poller: Poller::new(Arc::new(fetcher), config.poll),
        backend,
        cache,
        config,
      }),
    }
  }

  pub fn backend(&self) -> &B { &self.inner.backend }

  pub fn cache(&self) -> &QueryCache<Resource> { &self.inner.cache }

  pub fn config(&self) -> &SyncConfig { &self.inner.config }

  pub fn mutations(&self) -> &MutationCoordinator { &self.inner.mutations }

  pub fn poller(&self) -> &Poller<EntryFetcher<B>> { &self.inner.poller }

  pub fn is_pending(&self, kind: ChangeKind, target: Target) -> bool {
    self.inner.mutations.is_pending(kind, target)
  }

  async fn query<T: FromResource>(&self, key: CacheKey) -> Result<T> {
    let loader = loader(&self.inner.backend, &key);
    T::extract(self.inner.cache.fetch(&key, || loader()).await?)
  }

  // ── Queries ───────────────────────────────────────────────────────────

  /// The caller's own entries.
  pub async fn entries(&self) -> Result<Vec<Entry>> {
    self.query(CacheKey::EntryList(EntryListKey::Timeline)).await
  }

  pub async fn entry(&self, id: EntryId) -> Result<Entry> { self.query(CacheKey::Entry(id)).await }

  pub async fn public_entries(&self, filter: &FilterSignature) -> Result<Vec<Entry>> {
    self.query(CacheKey::EntryList(EntryListKey::Public(filter.clone()))).await
  }

  pub async fn search(&self, q: &str) -> Result<Vec<Entry>> {
    let q = q.trim();
    if q.is_empty() {
      return Err(ValidationError::EmptySearchQuery.into());
    }
    self.query(CacheKey::EntryList(EntryListKey::Search(q.to_owned()))).await
  }

  pub async fn entries_by_face(&self, id: FaceId) -> Result<Vec<Entry>> {
    self.query(CacheKey::EntryList(EntryListKey::ByFace(id))).await
  }

  pub async fn entries_by_category(&self, lookup: CategoryLookup) -> Result<Vec<Entry>> {
    if lookup.name.trim().is_empty() {
      return Err(ValidationError::EmptyCategoryName.into());
    }
    self.query(CacheKey::EntryList(EntryListKey::ByCategory(lookup))).await
  }

  pub async fn faces(&self) -> Result<Vec<Face>> { self.query(CacheKey::Faces).await }

  /// "Your faces".
  pub async fn subscribed_faces(&self) -> Result<Vec<Face>> {
    self.query(CacheKey::SubscribedFaces).await
  }

  pub async fn categories(&self) -> Result<Vec<Category>> {
    self.query(CacheKey::Categories).await
  }

  pub async fn categories_by_type(&self, kind: CategoryType) -> Result<Vec<Category>> {
    self.query(CacheKey::CategoriesByType(kind)).await
  }

  /// Suggestions for `inputs`, cached for the staleness window. Blank
  /// inputs yield nothing without a request.
  pub async fn suggest_faces(&self, inputs: &SuggestionInputs) -> Result<Vec<FaceSuggestion>> {
    if inputs.is_blank() {
      return Ok(Vec::new());
    }
    let key = CacheKey::FaceSuggestions(inputs.clone());
    let loader = loader(&self.inner.backend, &key);
    let staleness = self.inner.config.suggestion_staleness();
    let value = self.inner.cache.fetch_max_age(&key, Some(staleness), || loader()).await?;
    Vec::<FaceSuggestion>::extract(value)
  }

  // ── Observation ───────────────────────────────────────────────────────

  /// Register interest in `key`; invalidations re-fetch it while the
  /// subscription lives.
  pub fn observe<T: FromResource>(&self, key: CacheKey) -> Subscription<T> {
    let loader = loader(&self.inner.backend, &key);
    Subscription { observer: self.inner.cache.observe(key, Some(loader)), _marker: PhantomData }
  }

  /// Open an entry, polling its processing status while the view lives.
  pub fn observe_entry(&self, id: EntryId) -> EntryView<B> {
    let entry = self.observe(CacheKey::Entry(id));
    EntryView { status: self.inner.poller.watch(id), entry }
  }

  // ── Entry mutations ───────────────────────────────────────────────────

  pub async fn create_entry(&self, input: NewEntry) -> Result<Entry> {
    input.validate()?;
    self
      .inner
      .mutations
      .run(ChangeKind::CreateEntry, Target::New, self.inner.backend.create_entry(input), |entry| {
        Effects::on(Target::Entry(entry.id))
          .write(CacheKey::Entry(entry.id), Resource::Entry(entry.clone()))
      })
      .await
  }

  /// Create an entry, then upload `documents` one by one. An upload failure
  /// stops the remaining uploads but keeps the entry and what was attached.
  pub async fn create_entry_with_documents(
    &self,
    input: NewEntry,
    documents: Vec<NewDocument>,
  ) -> Result<CreatedEntry> {
    input.validate()?;
    for doc in &documents {
      doc.validate()?;
    }

    let entry = self.create_entry(input).await?;
    let mut created = CreatedEntry { entry, documents: Vec::new(), upload_error: None };

    let mut queue = documents.into_iter();
    while let Some(doc) = queue.next() {
      let filename = doc.filename.clone();
      match self.upload_document(created.entry.id, doc).await {
        Ok(uploaded) => created.documents.push(uploaded),
        Err(error) => {
          tracing::warn!(entry = %created.entry.id, %filename, %error, "upload failed");
          let skipped = queue.map(|d| d.filename).collect();
          created.upload_error = Some(UploadFailure { filename, error, skipped });
          break;
        }
      }
    }
    Ok(created)
  }

  /// Submit a draft with its attached documents.
  pub async fn submit_draft(&self, draft: &EntryDraft) -> Result<CreatedEntry> {
    let input = draft.to_new_entry()?;
    self.create_entry_with_documents(input, draft.documents().to_vec()).await
  }

  pub async fn update_entry(&self, id: EntryId, patch: EntryPatch) -> Result<Entry> {
    patch.validate()?;
    self
      .inner
      .mutations
      .run(
        ChangeKind::UpdateEntry,
        Target::Entry(id),
        self.inner.backend.update_entry(id, patch),
        |entry| {
          Effects::on(Target::Entry(id)).write(CacheKey::Entry(id), Resource::Entry(entry.clone()))
        },
      )
      .await
  }

  pub async fn delete_entry(&self, id: EntryId) -> Result<()> {
    self
      .inner
      .mutations
      .run(ChangeKind::DeleteEntry, Target::Entry(id), self.inner.backend.delete_entry(id), |_| {
        Effects::on(Target::Entry(id)).remove(KeyPattern::Exact(CacheKey::Entry(id)))
      })
      .await?;
    self.inner.poller.forget(id);
    Ok(())
  }

  /// Re-run insight extraction and restart polling for the entry.
  pub async fn reprocess_entry(&self, id: EntryId) -> Result<()> {
    self
      .inner
      .mutations
      .run(
        ChangeKind::ReprocessEntry,
        Target::Entry(id),
        self.inner.backend.reprocess_entry(id),
        |_| {
          Effects::on(Target::Entry(id)).edit(CacheKey::Entry(id), |value| {
            if let Resource::Entry(entry) = value {
              entry.insights_processed = false;
            }
          })
        },
      )
      .await?;
    self.inner.poller.restart(id);
    Ok(())
  }

  pub async fn upload_document(&self, entry: EntryId, document: NewDocument) -> Result<Document> {
    document.validate()?;
    self
      .inner
      .mutations
      .run(
        ChangeKind::UploadDocument,
        Target::Entry(entry),
        self.inner.backend.upload_document(entry, document),
        |uploaded| {
          let uploaded = uploaded.clone();
          Effects::on(Target::Document { entry, document: uploaded.id }).edit(
            CacheKey::Entry(entry),
            move |value| {
              if let Resource::Entry(e) = value {
                e.documents.push(uploaded);
              }
            },
          )
        },
      )
      .await
  }

  pub async fn delete_document(&self, entry: EntryId, document: DocumentId) -> Result<()> {
    let target = Target::Document { entry, document };
    self
      .inner
      .mutations
      .run(
        ChangeKind::DeleteDocument,
        target,
        self.inner.backend.delete_document(entry, document),
        |_| {
          Effects::on(target).edit(CacheKey::Entry(entry), move |value| {
            if let Resource::Entry(e) = value {
              e.documents.retain(|d| d.id != document);
            }
          })
        },
      )
      .await
  }

  // ── Face mutations ────────────────────────────────────────────────────

  pub async fn create_face(&self, input: NewFace) -> Result<Face> {
    let input = input.validated()?;
    self
      .inner
      .mutations
      .run(ChangeKind::CreateFace, Target::New, self.inner.backend.create_face(input), |face| {
        let face = face.clone();
        Effects::on(Target::Face(face.id)).edit(CacheKey::Faces, move |value| {
          if let Resource::Faces(faces) = value {
            faces.push(face);
          }
        })
      })
      .await
  }

  /// Create the face a suggestion proposes and select it on `draft`. On
  /// failure the draft is left as it was.
  pub async fn create_face_from_suggestion(
    &self,
    draft: &mut EntryDraft,
    suggestion: &FaceSuggestion,
  ) -> Result<Face> {
    let input = NewFace { icon: suggestion.icon.clone(), ..NewFace::named(suggestion.name.clone()) };
    let face = self.create_face(input).await?;
    draft.select_face(face.id);
    Ok(face)
  }

  pub async fn update_face(&self, id: FaceId, patch: FacePatch) -> Result<Face> {
    let patch = patch.validated()?;
    self
      .inner
      .mutations
      .run(ChangeKind::UpdateFace, Target::Face(id), self.inner.backend.update_face(id, patch), |face| {
        let replace = |face: Face| {
          move |value: &mut Resource| {
            if let Resource::Faces(faces) = value {
              for f in faces.iter_mut().filter(|f| f.id == face.id) {
                *f = face.clone();
              }
            }
          }
        };
        Effects::on(Target::Face(id))
          .edit(CacheKey::Faces, replace(face.clone()))
          .edit(CacheKey::SubscribedFaces, replace(face.clone()))
      })
      .await
  }

  pub async fn subscribe_face(&self, id: FaceId) -> Result<()> {
    let known = self
      .inner
      .cache
      .read(&CacheKey::Faces)
      .and_then(|hit| Vec::<Face>::from_resource(hit.value))
      .and_then(|faces| faces.into_iter().find(|f| f.id == id));
    self
      .inner
      .mutations
      .run(ChangeKind::SubscribeFace, Target::Face(id), self.inner.backend.subscribe_face(id), |_| {
        let effects = Effects::on(Target::Face(id));
        match known {
          Some(face) => effects.edit(CacheKey::SubscribedFaces, move |value| {
            if let Resource::Faces(faces) = value
              && !faces.iter().any(|f| f.id == face.id)
            {
              faces.push(face);
            }
          }),
          None => effects,
        }
      })
      .await
  }

  pub async fn unsubscribe_face(&self, id: FaceId) -> Result<()> {
    self
      .inner
      .mutations
      .run(
        ChangeKind::UnsubscribeFace,
        Target::Face(id),
        self.inner.backend.unsubscribe_face(id),
        |_| {
          Effects::on(Target::Face(id)).edit(CacheKey::SubscribedFaces, move |value| {
            if let Resource::Faces(faces) = value {
              faces.retain(|f| f.id != id);
            }
          })
        },
      )
      .await
  }

  // ── Categories ────────────────────────────────────────────────────────

  pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
    input.validate()?;
    self
      .inner
      .mutations
      .run(
        ChangeKind::CreateCategory,
        Target::New,
        self.inner.backend.create_category(input),
        |category| {
          let category = category.clone();
          Effects::on(Target::New).edit(CacheKey::Categories, move |value| {
            if let Resource::Categories(categories) = value {
              categories.push(category);
            }
          })
        },
      )
      .await
  }
}
