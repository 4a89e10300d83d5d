//! Role-based gating for guarded sections of the application.
//!
//! A `RouteGuard` wraps a role-scoped section: it blocks until session
//! resolution settles (with a bounded timeout that fails safe into the
//! unauthenticated path), then allows, or redirects exactly once per denial.
//! Navigation happens only here; data components report values and errors,
//! never redirects.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::ports::Router;
use crate::session::{RoleSet, Session, SessionStatus};

/// Upper bound on how long a guard waits for the session to settle before
/// treating it as unauthenticated. Generous compared to the restore retry
/// bound so the guard only fires on a genuinely wedged resolution.
const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_DENIED_PATH: &str = "/not-authorized";

/// Pure decision for a session against this guard's allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not settled yet; render a neutral waiting state only.
    Pending,
    /// Authenticated and the role is in the allowlist; render children.
    Allow,
    /// Not signed in (or resolution failed); go to the login screen.
    RedirectToLogin,
    /// Signed in but the role is not permitted here.
    RedirectToDenied,
}

/// Terminal outcome of guarding a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Allowed,
    Redirected,
}

pub struct RouteGuard {
    allowed: RoleSet,
    login_path: String,
    denied_path: String,
    resolution_timeout: Duration,
}

impl RouteGuard {
    pub fn new(allowed: RoleSet) -> Self {
        Self {
            allowed,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            denied_path: DEFAULT_DENIED_PATH.to_string(),
            resolution_timeout: DEFAULT_RESOLUTION_TIMEOUT,
        }
    }

    pub fn with_paths(mut self, login_path: &str, denied_path: &str) -> Self {
        self.login_path = login_path.to_string();
        self.denied_path = denied_path.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.resolution_timeout = timeout;
        self
    }

    /// Evaluate a session snapshot against the allowlist.
    pub fn decide(&self, session: &Session) -> GuardDecision {
        match session.status() {
            SessionStatus::Unknown | SessionStatus::Resolving => GuardDecision::Pending,
            SessionStatus::Unauthenticated => GuardDecision::RedirectToLogin,
            SessionStatus::Authenticated => match session.role() {
                Some(role) if self.allowed.contains(role) => GuardDecision::Allow,
                _ => GuardDecision::RedirectToDenied,
            },
        }
    }

    /// Wait (bounded) for the session to settle, then allow or redirect.
    /// Performs at most one redirect per call.
    pub async fn resolve(
        &self,
        rx: &mut watch::Receiver<Session>,
        router: &dyn Router,
    ) -> GuardOutcome {
        let settled = tokio::time::timeout(
            self.resolution_timeout,
            rx.wait_for(|session| session.is_settled()),
        )
        .await;

        let decision = match settled {
            Ok(Ok(session)) => self.decide(&session),
            // Channel closed: the session manager is gone, fail safe.
            Ok(Err(_)) => GuardDecision::RedirectToLogin,
            Err(_) => {
                warn!(
                    timeout_ms = self.resolution_timeout.as_millis() as u64,
                    "session did not settle before the guard timeout"
                );
                GuardDecision::RedirectToLogin
            }
        };

        self.apply(decision, router)
    }

    /// Guard a mounted section for its whole lifetime: settle once, then
    /// re-evaluate on every session change. A mid-use expiry or role change
    /// redirects immediately instead of keeping stale-authorized content on
    /// screen. Returns when the section is denied or the channel closes;
    /// dropping the future (unmount) simply stops the watch.
    pub async fn watch_mounted(
        &self,
        rx: &mut watch::Receiver<Session>,
        router: &dyn Router,
    ) -> GuardOutcome {
        if let GuardOutcome::Redirected = self.resolve(rx, router).await {
            return GuardOutcome::Redirected;
        }

        loop {
            if rx.changed().await.is_err() {
                router.replace(&self.login_path);
                return GuardOutcome::Redirected;
            }
            let decision = {
                let session = rx.borrow_and_update();
                self.decide(&session)
            };
            match decision {
                // A sign-in retriggered resolution; keep rendering until it
                // settles rather than flashing the login screen.
                GuardDecision::Allow | GuardDecision::Pending => {}
                GuardDecision::RedirectToLogin => {
                    debug!("session lost while section mounted");
                    router.replace(&self.login_path);
                    return GuardOutcome::Redirected;
                }
                GuardDecision::RedirectToDenied => {
                    debug!("role no longer permitted while section mounted");
                    router.replace(&self.denied_path);
                    return GuardOutcome::Redirected;
                }
            }
        }
    }

    fn apply(&self, decision: GuardDecision, router: &dyn Router) -> GuardOutcome {
        match decision {
            GuardDecision::Allow => GuardOutcome::Allowed,
            GuardDecision::RedirectToDenied => {
                router.replace(&self.denied_path);
                GuardOutcome::Redirected
            }
            GuardDecision::Pending | GuardDecision::RedirectToLogin => {
                router.replace(&self.login_path);
                GuardOutcome::Redirected
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
