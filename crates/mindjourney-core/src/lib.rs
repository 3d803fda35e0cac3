//! Core types and trait definitions for the MindJourney journaling client.
//!
//! This crate is deliberately free of HTTP and runtime dependencies. The
//! gateway (`mindjourney-client`) and the synchronisation layer
//! (`mindjourney-sync`) both depend on it.

pub mod backend;
pub mod category;
pub mod entry;
pub mod error;
pub mod face;
pub mod id;
pub mod query;

pub use error::{Error, Result, ValidationError};
