//! Gateway behaviour against an in-process axum server.

use std::sync::{Arc, Mutex};

use axum::{
  Json,
  Router,
  extract::{Path, RawQuery, State},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
  routing::{get, post},
};
use mindjourney_client::{ClientConfig, Credentials, HttpBackend, SessionState};
use mindjourney_core::{
  Error,
  backend::JournalBackend,
  entry::NewDocument,
  id::{EntryId, FaceId},
  query::PublicEntryQuery,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Seen {
  auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Seen {
  fn record(&self, headers: &HeaderMap) {
    let value = headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);
    self.auth.lock().unwrap().push(value);
  }
}

fn entry(id: i64, content: &str) -> Value {
  json!({
    "id": id,
    "title": "t",
    "content": content,
    "is_public": true,
    "created_at": "2026-03-01T10:00:00Z",
    "insights_processed": false
  })
}

fn router(seen: Seen) -> Router {
  Router::new()
    .route(
      "/api/auth/login/",
      post(|Json(body): Json<Value>| async move {
        if body["password"] == "secret" {
          Json(json!({"token": "t0k"})).into_response()
        } else {
          (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad credentials"}))).into_response()
        }
      }),
    )
    .route(
      "/api/entries/",
      get(|State(seen): State<Seen>, headers: HeaderMap| async move {
        seen.record(&headers);
        Json(json!({"count": 1, "next": null, "results": [entry(1, "paged")]}))
      }),
    )
    .route(
      "/api/entries/public/",
      get(|RawQuery(q): RawQuery| async move {
        Json(json!([entry(2, &q.unwrap_or_default())]))
      }),
    )
    .route(
      "/api/entries/{id}/",
      get(|Path(id): Path<i64>| async move {
        if id == 99 {
          (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response()
        } else {
          Json(entry(id, "detail")).into_response()
        }
      }),
    )
    .route(
      "/api/entries/{id}/upload_document/",
      post(|headers: HeaderMap| async move {
        let multipart = headers
          .get(header::CONTENT_TYPE)
          .and_then(|v| v.to_str().ok())
          .is_some_and(|v| v.starts_with("multipart/form-data"));
        if !multipart {
          return (StatusCode::BAD_REQUEST, Json(json!({"error": "No file provided"})))
            .into_response();
        }
        (
          StatusCode::CREATED,
          Json(json!({"id": 5, "filename": "notes.txt", "file_size": 5})),
        )
          .into_response()
      }),
    )
    .route("/api/faces/", get(|| async { Json(json!([{"id": 5, "name": "Gardener"}])) }))
    .route(
      "/api/faces/subscribed/",
      get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"}))) }),
    )
    .route("/api/faces/{id}/subscribe/", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
    .with_state(seen)
}

async fn serve(seen: Seen) -> HttpBackend {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, router(seen)).await.unwrap() });
  let config = ClientConfig { base_url: format!("http://{addr}/api/"), ..Default::default() };
  HttpBackend::new(&config, Credentials::in_memory()).unwrap()
}

#[tokio::test]
async fn login_stores_token_and_attaches_it() {
  let seen = Seen::default();
  let backend = serve(seen.clone()).await;

  backend.list_entries().await.unwrap();
  backend.login("alice", "secret").await.unwrap();
  assert_eq!(backend.credentials().state(), SessionState::Authenticated);
  backend.list_entries().await.unwrap();

  let auth = seen.auth.lock().unwrap().clone();
  assert_eq!(auth, vec![None, Some("Bearer t0k".to_owned())]);
}

#[tokio::test]
async fn failed_login_is_an_auth_error() {
  let backend = serve(Seen::default()).await;
  let err = backend.login("alice", "wrong").await.unwrap_err();
  assert!(err.is_auth());
  assert!(backend.credentials().token().is_none());
}

#[tokio::test]
async fn envelopes_and_bare_lists_both_decode() {
  let backend = serve(Seen::default()).await;
  let entries = backend.list_entries().await.unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].content, "paged");

  let faces = backend.list_faces().await.unwrap();
  assert_eq!(faces[0].id, FaceId(5));
  assert_eq!(faces[0].icon, "🙂");
}

#[tokio::test]
async fn unauthorized_clears_credential_and_expires_session() {
  let backend = serve(Seen::default()).await;
  backend.login("alice", "secret").await.unwrap();
  let mut rx = backend.credentials().subscribe();

  let err = backend.subscribed_faces().await.unwrap_err();

  assert!(matches!(err, Error::Auth));
  assert!(backend.credentials().token().is_none());
  rx.changed().await.unwrap();
  assert_eq!(*rx.borrow(), SessionState::Expired);
}

#[tokio::test]
async fn statuses_are_classified() {
  let backend = serve(Seen::default()).await;

  let err = backend.get_entry(EntryId(99)).await.unwrap_err();
  assert!(err.is_not_found());

  let err = backend.subscribe_face(FaceId(5)).await.unwrap_err();
  assert!(matches!(err, Error::Transient(_)));

  let found = backend.get_entry(EntryId(3)).await.unwrap();
  assert_eq!(found.id, EntryId(3));
}

#[tokio::test]
async fn public_filter_ids_are_comma_joined() {
  let backend = serve(Seen::default()).await;
  let query = PublicEntryQuery { face_ids: vec![FaceId(3), FaceId(7)], category_ids: vec![] };
  let entries = backend.public_entries(&query).await.unwrap();
  assert_eq!(entries[0].content, "face_ids=3%2C7");

  let unfiltered = backend.public_entries(&PublicEntryQuery::default()).await.unwrap();
  assert_eq!(unfiltered[0].content, "");
}

#[tokio::test]
async fn uploads_are_multipart() {
  let backend = serve(Seen::default()).await;
  let doc = backend
    .upload_document(EntryId(1), NewDocument::new("notes.txt", b"hello".to_vec()))
    .await
    .unwrap();
  assert_eq!(doc.file_size, 5);
}
