//! Client-side synchronisation for MindJourney.
//!
//! [`Journal`] wires a [`JournalBackend`](mindjourney_core::backend::JournalBackend)
//! to a keyed [`QueryCache`], a processing-status [`Poller`] and a
//! [`MutationCoordinator`] whose cache consequences come from the static
//! table in [`deps`]. [`PublicFeed`] and [`SuggestionPipeline`] build the
//! filtered feed and face suggestions on top of it.

pub mod cache;
pub mod config;
pub mod deps;
pub mod draft;
pub mod filter;
pub mod journal;
pub mod key;
pub mod mutation;
pub mod poller;
pub mod resource;
pub mod suggest;

#[cfg(test)]
mod fake;

pub use cache::{Cached, QueryCache};
pub use config::{PollConfig, SyncConfig};
pub use deps::{ChangeKind, Target};
pub use draft::{EntryDraft, SuggestionOutcome};
pub use filter::{FeedPage, FilterSelection, FilterSignature, PublicFeed};
pub use journal::{CreatedEntry, EntryView, Journal, Subscription, UploadFailure};
pub use key::{CacheKey, EntryListKey, KeyPattern};
pub use mutation::MutationCoordinator;
pub use poller::{PollState, Poller};
pub use resource::Resource;
pub use suggest::{SuggestionInputs, SuggestionPipeline, should_refetch_suggestions};
