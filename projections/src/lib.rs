//! # Chirp Projections
//!
//! Derived stores that follow the post service through events.
//!
//! | Projection | Binds | Store |
//! |---|---|---|
//! | [`SearchProjection`] | `post.*` | [`SearchStore`](chirp_core::store::SearchStore) |
//! | [`MediaProjection`] | `post.deleted` | [`MediaStore`](chirp_core::store::MediaStore) + [`BlobStore`](chirp_core::store::BlobStore) |
//!
//! Both implement [`EventHandler`](chirp_runtime::EventHandler) and are
//! driven by an [`EventConsumer`](chirp_runtime::EventConsumer). Applying an
//! event twice has the same effect as applying it once, so a retried event
//! is harmless.

mod media;
mod search;

pub use media::{MediaProjection, ReconcileReport};
pub use search::SearchProjection;
