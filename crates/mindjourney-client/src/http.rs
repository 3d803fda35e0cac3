//! [`HttpBackend`], the reqwest implementation of [`JournalBackend`].

use std::time::Duration;

use mindjourney_core::{
  Error,
  Result,
  backend::JournalBackend,
  category::{Category, CategoryType, NewCategory},
  entry::{Document, Entry, EntryPatch, NewDocument, NewEntry},
  face::{Face, FacePatch, FaceSuggestion, NewFace},
  id::{DocumentId, EntryId, FaceId},
  query::{CategoryLookup, PublicEntryQuery},
};
use reqwest::{
  Client,
  RequestBuilder,
  Response,
  StatusCode,
  multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
  config::ClientConfig,
  credentials::{Credentials, SessionState},
  envelope,
  error::ClientError,
};

/// Async HTTP client for the journaling REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based and
/// [`Credentials`] is shared.
#[derive(Clone)]
pub struct HttpBackend {
  client:      Client,
  base_url:    String,
  credentials: Credentials,
}

#[derive(Serialize)]
struct LoginBody<'a> {
  username: &'a str,
  password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
  token: Option<String>,
}

impl HttpBackend {
  pub fn new(
    config: &ClientConfig,
    credentials: Credentials,
  ) -> Result<Self, ClientError> {
    let base = config.base_url.trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
      return Err(ClientError::InvalidBaseUrl(config.base_url.clone()));
    }
    let client = Client::builder()
      .timeout(Duration::from_millis(config.timeout_ms))
      .build()?;
    Ok(Self { client, base_url: base.to_owned(), credentials })
  }

  pub fn credentials(&self) -> &Credentials { &self.credentials }

  fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

  fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
    match self.credentials.token() {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  /// Send `req`, turning transport failures and non-2xx statuses into the
  /// core taxonomy. A 401 clears the stored credential.
  async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
    let resp = self.authorize(req).send().await.map_err(|e| transport_error(what, &e))?;
    let status = resp.status();
    tracing::debug!(request = what, %status, "backend responded");
    if status.is_success() {
      return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
      tracing::warn!(request = what, "credential rejected; clearing session");
      self.credentials.clear(SessionState::Expired);
      return Err(Error::Auth);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(what, status, &body))
  }

  async fn json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    let resp = self.send(req, what).await?;
    resp.json().await.map_err(|e| Error::Decode(format!("{what}: {e}")))
  }

  async fn list<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<Vec<T>> {
    let value: serde_json::Value = self.json(req, what).await?;
    envelope::normalize(value).map_err(|e| Error::Decode(format!("{what}: {e}")))
  }

  async fn discard(&self, req: RequestBuilder, what: &str) -> Result<()> {
    self.send(req, what).await.map(drop)
  }

  // ── Session ───────────────────────────────────────────────────────────────

  /// `POST /auth/login/`. Stores the returned bearer credential.
  pub async fn login(&self, username: &str, password: &str) -> Result<()> {
    let req = self
      .client
      .post(self.url("/auth/login/"))
      .json(&LoginBody { username, password });
    let body: LoginResponse = self.json(req, "POST /auth/login/").await?;
    let token = body
      .token
      .filter(|t| !t.is_empty())
      .ok_or_else(|| Error::Decode("login response carried no token".into()))?;
    self
      .credentials
      .set(token)
      .map_err(|e| Error::Transient(e.to_string()))
  }

  /// `POST /auth/logout/`, best effort; the local credential is always
  /// cleared.
  pub async fn logout(&self) {
    let req = self.client.post(self.url("/auth/logout/"));
    if let Err(e) = self.discard(req, "POST /auth/logout/").await {
      tracing::debug!(error = %e, "logout request failed; clearing locally anyway");
    }
    self.credentials.clear(SessionState::LoggedOut);
  }
}

fn transport_error(what: &str, e: &reqwest::Error) -> Error {
  if e.is_decode() {
    Error::Decode(format!("{what}: {e}"))
  } else {
    Error::Transient(format!("{what}: {e}"))
  }
}

/// Pull a human-readable message out of a DRF-style error body.
fn error_message(body: &str) -> String {
  serde_json::from_str::<serde_json::Value>(body)
    .ok()
    .and_then(|v| {
      ["error", "detail"]
        .iter()
        .find_map(|k| v.get(k).and_then(|m| m.as_str()).map(str::to_owned))
        .or_else(|| v.is_object().then(|| v.to_string()))
    })
    .unwrap_or_else(|| body.trim().to_owned())
}

fn status_error(what: &str, status: StatusCode, body: &str) -> Error {
  let message = format!("{what}: {}", error_message(body));
  match status {
    StatusCode::NOT_FOUND => Error::NotFound(message),
    StatusCode::CONFLICT => Error::Conflict(message),
    StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::BadRequest(message),
    StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Error::Transient(message),
    s if s.is_server_error() => Error::Transient(message),
    s => Error::Http { status: s.as_u16(), message },
  }
}

impl JournalBackend for HttpBackend {
  // ── Entries ───────────────────────────────────────────────────────────────

  /// `GET /entries/`
  async fn list_entries(&self) -> Result<Vec<Entry>> {
    self.list(self.client.get(self.url("/entries/")), "GET /entries/").await
  }

  /// `GET /entries/{id}/`
  async fn get_entry(&self, id: EntryId) -> Result<Entry> {
    let req = self.client.get(self.url(&format!("/entries/{id}/")));
    self.json(req, "GET /entries/{id}/").await
  }

  /// `POST /entries/`
  async fn create_entry(&self, input: NewEntry) -> Result<Entry> {
    let req = self.client.post(self.url("/entries/")).json(&input);
    self.json(req, "POST /entries/").await
  }

  /// `PATCH /entries/{id}/`
  async fn update_entry(&self, id: EntryId, patch: EntryPatch) -> Result<Entry> {
    let req = self.client.patch(self.url(&format!("/entries/{id}/"))).json(&patch);
    self.json(req, "PATCH /entries/{id}/").await
  }

  /// `DELETE /entries/{id}/`
  async fn delete_entry(&self, id: EntryId) -> Result<()> {
    let req = self.client.delete(self.url(&format!("/entries/{id}/")));
    self.discard(req, "DELETE /entries/{id}/").await
  }

  /// `GET /entries/public/?face_ids=&category_ids=`
  async fn public_entries<'a>(&'a self, query: &'a PublicEntryQuery) -> Result<Vec<Entry>> {
    let req = self.client.get(self.url("/entries/public/")).query(&query.to_params());
    self.list(req, "GET /entries/public/").await
  }

  /// `GET /entries/search/?q=`
  async fn search_entries<'a>(&'a self, q: &'a str) -> Result<Vec<Entry>> {
    let req = self.client.get(self.url("/entries/search/")).query(&[("q", q)]);
    self.list(req, "GET /entries/search/").await
  }

  /// `GET /entries/by_face/{face_id}/`
  async fn entries_by_face(&self, face: FaceId) -> Result<Vec<Entry>> {
    let req = self.client.get(self.url(&format!("/entries/by_face/{face}/")));
    self.list(req, "GET /entries/by_face/{id}/").await
  }

  /// `GET /insights/entries_by_category/?category_name=&category_type=`
  async fn entries_by_category<'a>(&'a self, lookup: &'a CategoryLookup) -> Result<Vec<Entry>> {
    let req = self
      .client
      .get(self.url("/insights/entries_by_category/"))
      .query(&lookup.to_params());
    self.list(req, "GET /insights/entries_by_category/").await
  }

  /// `POST /entries/{id}/reprocess/`
  async fn reprocess_entry(&self, id: EntryId) -> Result<()> {
    let req = self.client.post(self.url(&format!("/entries/{id}/reprocess/")));
    self.discard(req, "POST /entries/{id}/reprocess/").await
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  /// `POST /entries/{id}/upload_document/` (multipart, field `file`)
  async fn upload_document(&self, entry: EntryId, doc: NewDocument) -> Result<Document> {
    let len = doc.data.len() as u64;
    let mut part = Part::stream_with_length(doc.data, len).file_name(doc.filename);
    if let Some(mime) = &doc.content_type {
      part = part
        .mime_str(mime)
        .map_err(|e| Error::BadRequest(format!("content type {mime:?}: {e}")))?;
    }
    let req = self
      .client
      .post(self.url(&format!("/entries/{entry}/upload_document/")))
      .multipart(Form::new().part("file", part));
    self.json(req, "POST /entries/{id}/upload_document/").await
  }

  /// `DELETE /entries/{id}/documents/{doc_id}/`
  async fn delete_document(&self, entry: EntryId, doc: DocumentId) -> Result<()> {
    let req = self
      .client
      .delete(self.url(&format!("/entries/{entry}/documents/{doc}/")));
    self.discard(req, "DELETE /entries/{id}/documents/{doc_id}/").await
  }

  // ── Faces ─────────────────────────────────────────────────────────────────

  /// `GET /faces/`
  async fn list_faces(&self) -> Result<Vec<Face>> {
    self.list(self.client.get(self.url("/faces/")), "GET /faces/").await
  }

  /// `GET /faces/subscribed/`
  async fn subscribed_faces(&self) -> Result<Vec<Face>> {
    let req = self.client.get(self.url("/faces/subscribed/"));
    self.list(req, "GET /faces/subscribed/").await
  }

  /// `POST /faces/`
  async fn create_face(&self, input: NewFace) -> Result<Face> {
    let req = self.client.post(self.url("/faces/")).json(&input);
    self.json(req, "POST /faces/").await
  }

  /// `PATCH /faces/{id}/`
  async fn update_face(&self, id: FaceId, patch: FacePatch) -> Result<Face> {
    let req = self.client.patch(self.url(&format!("/faces/{id}/"))).json(&patch);
    self.json(req, "PATCH /faces/{id}/").await
  }

  /// `POST /faces/{id}/subscribe/`
  async fn subscribe_face(&self, id: FaceId) -> Result<()> {
    let req = self.client.post(self.url(&format!("/faces/{id}/subscribe/")));
    self.discard(req, "POST /faces/{id}/subscribe/").await
  }

  /// `POST /faces/{id}/unsubscribe/`
  async fn unsubscribe_face(&self, id: FaceId) -> Result<()> {
    let req = self.client.post(self.url(&format!("/faces/{id}/unsubscribe/")));
    self.discard(req, "POST /faces/{id}/unsubscribe/").await
  }

  /// `GET /faces/suggest/?title=&text=`
  async fn suggest_faces<'a>(&'a self, title: &'a str, text: &'a str) -> Result<Vec<FaceSuggestion>> {
    let req = self
      .client
      .get(self.url("/faces/suggest/"))
      .query(&[("title", title), ("text", text)]);
    self.list(req, "GET /faces/suggest/").await
  }

  // ── Categories ────────────────────────────────────────────────────────────

  /// `GET /categories/`
  async fn list_categories(&self) -> Result<Vec<Category>> {
    self.list(self.client.get(self.url("/categories/")), "GET /categories/").await
  }

  /// `GET /categories/by_type/?type=`
  async fn categories_by_type(&self, kind: CategoryType) -> Result<Vec<Category>> {
    let req = self
      .client
      .get(self.url("/categories/by_type/"))
      .query(&[("type", kind.as_str())]);
    self.list(req, "GET /categories/by_type/").await
  }

  /// `POST /categories/`
  async fn create_category(&self, input: NewCategory) -> Result<Category> {
    let req = self.client.post(self.url("/categories/")).json(&input);
    self.json(req, "POST /categories/").await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statuses_map_onto_taxonomy() {
    let e = status_error("GET /x", StatusCode::NOT_FOUND, r#"{"detail": "Not found."}"#);
    assert!(matches!(e, Error::NotFound(ref m) if m.ends_with("Not found.")));

    let e = status_error("GET /x", StatusCode::BAD_GATEWAY, "");
    assert!(e.is_retryable());

    let e = status_error("POST /x", StatusCode::BAD_REQUEST, r#"{"error": "No file provided"}"#);
    assert!(matches!(e, Error::BadRequest(ref m) if m.contains("No file provided")));

    let e = status_error("GET /x", StatusCode::FORBIDDEN, "nope");
    assert!(matches!(e, Error::Http { status: 403, .. }));
  }

  #[test]
  fn rejects_non_http_base_url() {
    let config = ClientConfig { base_url: "localhost:8000".into(), ..Default::default() };
    assert!(matches!(
      HttpBackend::new(&config, Credentials::in_memory()),
      Err(ClientError::InvalidBaseUrl(_))
    ));
  }
}
