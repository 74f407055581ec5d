use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// An error that happens while resolving linked entities against a space.
///
/// Fetch failures are handled close to where they happen: the rewrite-style
/// [`EntityCache`](crate::EntityCache) degrades them into missing-entity
/// stubs, while [`EntityListCache`](crate::EntityListCache) surfaces them to
/// the caller of the failed round. Neither lets a failed round corrupt the
/// cache or stall the resolution queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The space rejected the request due to missing permissions.
    ///
    /// The attached string contains the space's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The fetch did not settle within the configured deadline.
    ///
    /// A hung transport would otherwise stall the per-instance queue
    /// forever, so every fetch is raced against
    /// [`CacheConfig::fetch_timeout`](crate::CacheConfig).
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    /// The entities could not be fetched due to another problem, like
    /// connection loss, DNS resolution, or a 5xx server response.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The space responded, but the body was not a valid entity collection.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The round driving this request was dropped before it completed.
    #[error("resolution canceled")]
    Canceled,
}

impl ResolveError {
    pub(crate) fn fetch_error(mut error: &dyn Error) -> Self {
        while let Some(source) = error.source() {
            error = source;
        }
        Self::Fetch(error.to_string())
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::fetch_error(&error)
        }
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}

/// The outcome of a resolution round, either `Ok(T)` or the reason the round
/// could not complete.
pub type ResolveResult<T = ()> = Result<T, ResolveError>;
