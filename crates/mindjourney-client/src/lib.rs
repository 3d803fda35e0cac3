//! Remote data gateway for the MindJourney backend.
//!
//! [`HttpBackend`] implements [`mindjourney_core::backend::JournalBackend`]
//! over HTTP. It attaches the stored bearer credential to every request,
//! normalises list envelopes to bare vectors, and on any 401 clears the
//! credential and reports [`SessionState::Expired`] so the application can
//! send the user back to its login entry point.

mod envelope;
mod http;

pub mod config;
pub mod credentials;
pub mod error;

pub use config::ClientConfig;
pub use credentials::{Credentials, SessionState};
pub use error::ClientError;
pub use http::HttpBackend;
