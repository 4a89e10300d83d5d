//! Clubhouse core - session and cache coordination for the club-management
//! client.
//!
//! Every screen in the application is form-driven CRUD over a remote data
//! service; what they share is this layer. It owns the authenticated
//! identity, resolves the caller's role, gates navigation per role, and
//! serves remote-fetched entities through a keyed TTL cache that coalesces
//! concurrent fetches and supports explicit invalidation.
//!
//! The moving parts:
//! - [`cache::CacheStore`]: keyed TTL cache, one in-flight fetch per key,
//!   stale-while-revalidate, identity-scoped invalidation
//! - [`session::SessionManager`]: restore / sign-in / sign-out state machine
//!   with a subscribable current session
//! - [`guard::RouteGuard`]: role-allowlist gating with a bounded resolution
//!   wait and single-shot redirects
//! - [`push::PushTokenRegistrar`]: best-effort device-token sync
//! - [`context::AppContext`]: the explicit composition root
//!
//! Collaborator boundaries (auth backend, role directory, durable storage,
//! push platform, router) are the traits in [`ports`].

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod ports;
pub mod prefs;
pub mod push;
pub mod session;
pub mod storage;

pub use cache::{BoxFetch, CacheStore, Lookup};
pub use config::Config;
pub use context::{AppContext, Collaborators};
pub use error::{AuthError, CacheError, FetchError, RoleResolutionError};
pub use guard::{GuardDecision, GuardOutcome, RouteGuard};
pub use prefs::Preferences;
pub use push::PushTokenRegistrar;
pub use session::{RetryPolicy, Role, RoleSet, Session, SessionManager, SessionStatus};
pub use storage::{JsonFileStore, MemoryStore};
