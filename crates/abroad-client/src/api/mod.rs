//! REST wrappers for the marketplace features
//!
//! Thin, contract-only clients. Every call goes through
//! [`AuthorizedClient`](crate::request::AuthorizedClient) so the bearer
//! token and the refresh-on-401 behavior apply uniformly.

pub mod chat;
pub mod files;
pub mod forum;
pub mod mentors;
pub mod profile;

pub use chat::ChatApi;
pub use files::FileApi;
pub use forum::ForumApi;
pub use mentors::MentorApi;
pub use profile::ProfileApi;

use crate::error::Result;

/// Fall back to the default value for reads the UI can live without
pub(crate) fn degrade<T: Default>(result: Result<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load {what}, using empty result");
        T::default()
    })
}
