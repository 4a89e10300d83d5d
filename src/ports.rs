//! Collaborator interfaces consumed by the core.
//!
//! The core owns no wire format; every payload crossing these boundaries is
//! opaque to it. Implementations live outside this crate (remote data
//! service, platform push APIs, the app's router), with the exception of the
//! file-backed [`PersistentKeyValueStore`] in [`crate::storage`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AuthError, RoleResolutionError};
use crate::session::Role;

/// Raw identity returned by the auth provider, before role resolution.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub user_id: String,
    pub email: Option<String>,
    /// Opaque profile payload owned by callers (name, email, club affiliation).
    pub profile: Option<Value>,
}

/// Authentication backend (remote identity service).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the currently persisted session, if any. May legitimately
    /// return `None` while the provider is still warming up; the session
    /// manager polls with a bounded retry to absorb that.
    async fn get_session(&self) -> Result<Option<AuthIdentity>, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Remote profile directory used to resolve a user's role.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn fetch_role(&self, user_id: &str) -> Result<Role, RoleResolutionError>;
}

/// Durable storage for remembered values and cache snapshots.
#[async_trait]
pub trait PersistentKeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// Platform push-notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPermission {
    Granted,
    Denied,
    Undetermined,
    /// Platform has no push support at all.
    Unsupported,
}

/// Platform push-notification APIs.
#[async_trait]
pub trait PushNotificationProvider: Send + Sync {
    async fn permission_status(&self) -> PushPermission;
    async fn request_permission(&self) -> PushPermission;
    async fn device_token(&self) -> anyhow::Result<String>;
}

/// Device-token field on the remote user record.
#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    async fn stored_token(&self, user_id: &str) -> anyhow::Result<Option<String>>;
    async fn store_token(&self, user_id: &str, token: &str) -> anyhow::Result<()>;
}

/// Navigation sink used for guard redirects. The core never inspects the
/// path structure, only whether a redirect is role-appropriate.
pub trait Router: Send + Sync {
    /// Replace the current location (no history entry).
    fn replace(&self, path: &str);

    /// Push a new location.
    fn push(&self, path: &str);
}
