//! Session state and lifecycle.
//!
//! This module provides:
//! - `Session`: the current authenticated actor and its resolution status
//! - `Role` / `RoleSet`: the closed role enumeration and allowlists
//! - `SessionManager`: sign-in, sign-out, and cancellable restoration
//! - `RetryPolicy`: the bounded poll used while the auth provider warms up

pub mod manager;
pub mod retry;
pub mod role;

pub use manager::SessionManager;
pub use retry::RetryPolicy;
pub use role::{Role, RoleSet};

use serde_json::Value;

/// Resolution state of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Process just started; restoration has not begun.
    Unknown,
    /// Restoration or a sign-in attempt is underway.
    Resolving,
    Authenticated,
    Unauthenticated,
}

/// The authenticated actor, as published by [`SessionManager`].
///
/// Fields are private so the invariants hold by construction:
/// a role is present if and only if the status is `Authenticated`, and a
/// user id is present only while `Resolving` or `Authenticated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user_id: Option<String>,
    role: Option<Role>,
    profile: Option<Value>,
    status: SessionStatus,
}

impl Session {
    pub fn unknown() -> Self {
        Self {
            user_id: None,
            role: None,
            profile: None,
            status: SessionStatus::Unknown,
        }
    }

    pub fn resolving(user_id: Option<String>) -> Self {
        Self {
            user_id,
            role: None,
            profile: None,
            status: SessionStatus::Resolving,
        }
    }

    pub fn authenticated(user_id: String, role: Role, profile: Option<Value>) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role),
            profile,
            status: SessionStatus::Authenticated,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            user_id: None,
            role: None,
            profile: None,
            status: SessionStatus::Unauthenticated,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn profile(&self) -> Option<&Value> {
        self.profile.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Whether the session has left the `Unknown`/`Resolving` states.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Authenticated | SessionStatus::Unauthenticated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_enforce_invariants() {
        let s = Session::unknown();
        assert_eq!(s.status(), SessionStatus::Unknown);
        assert!(s.role().is_none() && s.user_id().is_none());

        let s = Session::resolving(Some("u1".into()));
        assert_eq!(s.status(), SessionStatus::Resolving);
        assert_eq!(s.user_id(), Some("u1"));
        assert!(s.role().is_none());

        let s = Session::authenticated("u1".into(), Role::Coach, None);
        assert!(s.is_authenticated());
        assert_eq!(s.role(), Some(Role::Coach));
        assert_eq!(s.user_id(), Some("u1"));

        let s = Session::unauthenticated();
        assert!(s.is_settled());
        assert!(s.role().is_none() && s.user_id().is_none());
    }
}
