//! Error taxonomy for the session and cache core.
//!
//! Identity errors (`AuthError`) always resolve to a well-defined
//! `Unauthenticated` state. Fetch errors (`FetchError`) are localized to the
//! cache entry they occurred on and never take down the whole store.

use thiserror::Error;

/// Failure to map an authenticated user onto one of the closed set of roles.
///
/// Treated as a subtype of [`AuthError`]: a user whose role cannot be
/// resolved is never left in a silently-unresolved state.
#[derive(Debug, Error)]
pub enum RoleResolutionError {
    #[error("no profile record found for user {0}")]
    MissingProfile(String),

    #[error("unrecognized role {0:?}")]
    UnknownRole(String),

    #[error("role lookup failed: {0}")]
    Lookup(#[source] anyhow::Error),
}

/// Authentication failures, surfaced to callers of `sign_in`/`restore`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("session expired or revoked")]
    SessionExpired,

    #[error("role resolution failed: {0}")]
    RoleResolution(#[from] RoleResolutionError),

    #[error("auth provider error: {0}")]
    Provider(#[source] anyhow::Error),
}

/// Failure of a caller-supplied cache fetcher.
///
/// Recorded on the cache entry and handed to every attached waiter; a failed
/// fetch never clears a previously-successful value.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(#[source] anyhow::Error),

    /// The fetch task died without reporting a result.
    #[error("fetch aborted before completing")]
    Aborted,
}

/// Caller errors on the cache API itself.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("negative ttl is not allowed (got {0})")]
    NegativeTtl(i64),
}
