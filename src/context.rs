//! Explicit composition root.
//!
//! The source of truth for every shared component: the cache, the session
//! manager, the registrar, and preferences are constructed here, handed
//! their collaborators, and torn down here. No component reads ambient
//! global state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::guard::RouteGuard;
use crate::ports::{
    AuthProvider, DeviceTokenStore, PersistentKeyValueStore, PushNotificationProvider,
    RoleDirectory,
};
use crate::prefs::Preferences;
use crate::push::PushTokenRegistrar;
use crate::session::{RoleSet, SessionManager};

/// Collaborator bundle handed to [`AppContext::new`]. Push support is
/// optional; everything else is required.
pub struct Collaborators {
    pub auth: Arc<dyn AuthProvider>,
    pub directory: Arc<dyn RoleDirectory>,
    pub store: Arc<dyn PersistentKeyValueStore>,
    pub push: Option<(Arc<dyn PushNotificationProvider>, Arc<dyn DeviceTokenStore>)>,
}

pub struct AppContext {
    pub config: Config,
    pub cache: CacheStore,
    pub session: Arc<SessionManager>,
    pub prefs: Arc<Preferences>,
    store: Arc<dyn PersistentKeyValueStore>,
    cancel: CancellationToken,
}

impl AppContext {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let cache = CacheStore::new();
        let prefs = Arc::new(Preferences::new(Arc::clone(&collaborators.store)));

        let mut session = SessionManager::new(
            collaborators.auth,
            collaborators.directory,
            cache.clone(),
        )
        .with_retry_policy(config.restore_retry.clone())
        .with_preferences(Arc::clone(&prefs));

        if let Some((provider, tokens)) = collaborators.push {
            session = session.with_registrar(Arc::new(PushTokenRegistrar::new(provider, tokens)));
        }

        Self {
            config,
            cache,
            session: Arc::new(session),
            prefs,
            store: collaborators.store,
            cancel: CancellationToken::new(),
        }
    }

    /// Bring the context up: load preferences and the cache snapshot, then
    /// kick off session restoration in the background. Returns immediately;
    /// consumers follow progress through [`SessionManager::subscribe`].
    pub async fn init(&self) {
        self.prefs.load().await;

        if self.config.cache_snapshot {
            if let Err(err) = self.cache.load_snapshot(self.store.as_ref()).await {
                debug!(error = %err, "cache snapshot not restored");
            }
        }

        let session = Arc::clone(&self.session);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            // Outcome is published on the watch channel; errors here already
            // settled the state to Unauthenticated.
            let _ = session.restore(&cancel).await;
        });
        info!("app context initialized");
    }

    /// Tear the context down: cancel outstanding restoration work and
    /// persist the cache snapshot.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        if self.config.cache_snapshot {
            if let Err(err) = self.cache.save_snapshot(self.store.as_ref()).await {
                debug!(error = %err, "cache snapshot not persisted");
            }
        }
        info!("app context torn down");
    }

    /// Build a guard for a section, wired to this context's configuration.
    pub fn guard(&self, allowed: RoleSet) -> RouteGuard {
        RouteGuard::new(allowed).with_timeout(Duration::from_secs(self.config.guard_timeout_secs))
    }

    /// Child token for work that should stop at teardown.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::{AuthError, RoleResolutionError};
    use crate::ports::AuthIdentity;
    use crate::session::{RetryPolicy, Role, SessionStatus};
    use crate::storage::MemoryStore;

    fn init_tracing() {
        // RUST_LOG=debug cargo test -- --nocapture to see the core's logs
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    struct StaticAuth;

    #[async_trait]
    impl AuthProvider for StaticAuth {
        async fn get_session(&self) -> Result<Option<AuthIdentity>, AuthError> {
            Ok(Some(AuthIdentity {
                user_id: "coach-1".into(),
                email: None,
                profile: Some(json!({"name": "Sam"})),
            }))
        }

        async fn sign_in_with_password(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<AuthIdentity, AuthError> {
            Err(AuthError::InvalidCredentials)
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            Ok(())
        }
    }

    struct StaticDirectory;

    #[async_trait]
    impl RoleDirectory for StaticDirectory {
        async fn fetch_role(&self, _user_id: &str) -> Result<Role, RoleResolutionError> {
            Ok(Role::Coach)
        }
    }

    fn test_context() -> AppContext {
        let config = Config {
            restore_retry: RetryPolicy {
                max_attempts: 2,
                initial_delay_ms: 1,
                backoff_factor: 1.0,
            },
            guard_timeout_secs: 1,
            cache_snapshot: true,
        };
        AppContext::new(
            config,
            Collaborators {
                auth: Arc::new(StaticAuth),
                directory: Arc::new(StaticDirectory),
                store: Arc::new(MemoryStore::new()),
                push: None,
            },
        )
    }

    #[tokio::test]
    async fn init_restores_the_session_in_the_background() {
        init_tracing();
        let ctx = test_context();
        let mut rx = ctx.session.subscribe();
        ctx.init().await;

        let session = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|s| s.is_settled()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.role(), Some(Role::Coach));
        ctx.teardown().await;
    }

    #[tokio::test]
    async fn teardown_persists_the_cache_snapshot() {
        let store: Arc<dyn PersistentKeyValueStore> = Arc::new(MemoryStore::new());
        let config = Config::default();
        let ctx = AppContext::new(
            config,
            Collaborators {
                auth: Arc::new(StaticAuth),
                directory: Arc::new(StaticDirectory),
                store: Arc::clone(&store),
                push: None,
            },
        );

        ctx.cache
            .get("club:42", 900, || async { Ok(json!({"id": 42})) })
            .await
            .unwrap();
        ctx.teardown().await;

        assert!(store.get_item("cache:snapshot").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn guard_uses_configured_timeout() {
        let ctx = test_context();
        let guard = ctx.guard(RoleSet::of(&[Role::Coach]));
        // Session never settles on this fresh channel; the 1s timeout from
        // the config must fail safe into a redirect.
        let (_tx, mut rx) =
            tokio::sync::watch::channel(crate::session::Session::unknown());
        let router = NullRouter;
        let outcome = guard.resolve(&mut rx, &router).await;
        assert_eq!(outcome, crate::guard::GuardOutcome::Redirected);
    }

    struct NullRouter;

    impl crate::ports::Router for NullRouter {
        fn replace(&self, _path: &str) {}
        fn push(&self, _path: &str) {}
    }
}
