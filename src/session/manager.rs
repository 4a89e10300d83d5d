//! Session lifecycle: restoration, sign-in, sign-out.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::AuthError;
use crate::ports::{AuthIdentity, AuthProvider, RoleDirectory};
use crate::prefs::Preferences;
use crate::push::PushTokenRegistrar;
use crate::session::{RetryPolicy, Session};

/// Owns the current authentication state and resolved role.
///
/// The state machine is `Unknown -> Resolving -> {Authenticated |
/// Unauthenticated}`, with `Resolving` re-entered on a sign-in attempt and
/// everything reset to `Unknown` on sign-out. The current session is
/// published through a watch channel; guards and screens subscribe rather
/// than poll.
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn RoleDirectory>,
    cache: CacheStore,
    retry: RetryPolicy,
    registrar: Option<Arc<PushTokenRegistrar>>,
    prefs: Option<Arc<Preferences>>,
    tx: watch::Sender<Session>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        directory: Arc<dyn RoleDirectory>,
        cache: CacheStore,
    ) -> Self {
        let (tx, _rx) = watch::channel(Session::unknown());
        Self {
            auth,
            directory,
            cache,
            retry: RetryPolicy::default(),
            registrar: None,
            prefs: None,
            tx,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach the push-token registrar, fired (and forgotten) whenever the
    /// session reaches `Authenticated`.
    pub fn with_registrar(mut self, registrar: Arc<PushTokenRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Attach preferences so successful sign-ins remember the login identifier.
    pub fn with_preferences(mut self, prefs: Arc<Preferences>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    /// Subscribe to session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    fn publish(&self, session: Session) {
        self.tx.send_replace(session);
    }

    /// Restore a previously persisted session, invoked once at startup.
    ///
    /// Polls the auth provider per the retry policy to absorb its warm-up;
    /// no session after the bound means `Unauthenticated`, not an error.
    /// Cancelling the token between attempts stops the loop without any
    /// further state mutation.
    pub async fn restore(&self, cancel: &CancellationToken) -> Result<Session, AuthError> {
        self.publish(Session::resolving(None));

        let mut attempt = 0;
        let identity = loop {
            match self.auth.get_session().await {
                Ok(Some(identity)) => break identity,
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "session restore failed");
                    self.publish(Session::unauthenticated());
                    return Err(err);
                }
            }

            attempt += 1;
            if attempt >= self.retry.max_attempts {
                debug!(attempts = attempt, "no stored session after retry bound");
                let session = Session::unauthenticated();
                self.publish(session.clone());
                return Ok(session);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("session restore cancelled");
                    return Ok(self.current());
                }
                _ = tokio::time::sleep(self.retry.delay_for(attempt - 1)) => {}
            }
        };

        self.finish_login(identity).await
    }

    /// Sign in with email and password, then resolve the role.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.publish(Session::resolving(None));

        let identity = match self.auth.sign_in_with_password(email, password).await {
            Ok(identity) => identity,
            Err(err) => {
                info!(error = %err, "sign-in failed");
                self.publish(Session::unauthenticated());
                return Err(err);
            }
        };

        if let Some(prefs) = &self.prefs {
            if let Err(err) = prefs.remember_login(email).await {
                debug!(error = %err, "failed to persist remembered login");
            }
        }

        self.finish_login(identity).await
    }

    /// Sign out, strictly sequenced: the provider sign-out completes first,
    /// then cache entries scoped to the departing identity are dropped, then
    /// the state resets to `Unknown`. Reversing this order would let a
    /// screen re-read stale cached data under the old identity.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let departing = self.current().user_id().map(str::to_string);

        self.auth.sign_out().await?;

        if let Some(user_id) = departing {
            self.cache.invalidate_scope(&user_id);
            info!(user_id = %user_id, "signed out, identity-scoped cache dropped");
        }
        self.publish(Session::unknown());
        Ok(())
    }

    /// Role lookup shared by `restore` and `sign_in`. A missing or
    /// unrecognized role yields `Unauthenticated` with a diagnostic error,
    /// never a half-resolved session.
    async fn finish_login(&self, identity: AuthIdentity) -> Result<Session, AuthError> {
        self.publish(Session::resolving(Some(identity.user_id.clone())));

        match self.directory.fetch_role(&identity.user_id).await {
            Ok(role) => {
                let session = Session::authenticated(identity.user_id, role, identity.profile);
                info!(user_id = ?session.user_id(), role = %role, "session authenticated");
                self.publish(session.clone());

                // Fire-and-forget; registrar failures never touch session state.
                if let Some(registrar) = &self.registrar {
                    let registrar = Arc::clone(registrar);
                    let snapshot = session.clone();
                    tokio::spawn(async move {
                        registrar.sync(&snapshot).await;
                    });
                }

                Ok(session)
            }
            Err(err) => {
                warn!(user_id = %identity.user_id, error = %err, "role resolution failed");
                self.publish(Session::unauthenticated());
                Err(AuthError::RoleResolution(err))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
