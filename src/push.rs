//! Best-effort push-token synchronization.
//!
//! Keeps the device's notification token in sync with the session's user
//! record. Strictly fire-and-forget: every failure is absorbed into a log
//! line, and repeated calls with an unchanged token never write.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::ports::{DeviceTokenStore, PushNotificationProvider, PushPermission};
use crate::session::Session;

pub struct PushTokenRegistrar {
    provider: Arc<dyn PushNotificationProvider>,
    tokens: Arc<dyn DeviceTokenStore>,
    /// Last (user_id, token) pair written or confirmed, to short-circuit
    /// repeat syncs without a remote read.
    last_synced: Mutex<Option<(String, String)>>,
}

impl PushTokenRegistrar {
    pub fn new(
        provider: Arc<dyn PushNotificationProvider>,
        tokens: Arc<dyn DeviceTokenStore>,
    ) -> Self {
        Self {
            provider,
            tokens,
            last_synced: Mutex::new(None),
        }
    }

    fn last(&self) -> MutexGuard<'_, Option<(String, String)>> {
        self.last_synced.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Synchronize the device token onto the session's user record.
    ///
    /// No-op unless the session is authenticated, the platform supports
    /// push, and permission is (or can be) granted. Writes only when the
    /// stored token differs from the current device token. Never fails.
    pub async fn sync(&self, session: &Session) {
        if !session.is_authenticated() {
            return;
        }
        let Some(user_id) = session.user_id() else {
            return;
        };

        let permission = match self.provider.permission_status().await {
            PushPermission::Undetermined => self.provider.request_permission().await,
            status => status,
        };
        if permission != PushPermission::Granted {
            debug!(?permission, "push permission not granted, skipping token sync");
            return;
        }

        let token = match self.provider.device_token().await {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, "could not read device token");
                return;
            }
        };

        if self
            .last()
            .as_ref()
            .is_some_and(|(u, t)| u == user_id && t == &token)
        {
            return;
        }

        match self.tokens.stored_token(user_id).await {
            Ok(Some(stored)) if stored == token => {
                debug!(user_id, "device token already up to date");
            }
            Ok(_) => {
                if let Err(err) = self.tokens.store_token(user_id, &token).await {
                    warn!(user_id, error = %err, "failed to store device token");
                    return;
                }
                debug!(user_id, "device token registered");
            }
            Err(err) => {
                debug!(user_id, error = %err, "could not read stored device token");
                return;
            }
        }

        *self.last() = Some((user_id.to_string(), token));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::session::Role;

    struct FakePush {
        permission: PushPermission,
        token: anyhow::Result<String>,
        permission_requests: AtomicUsize,
    }

    impl FakePush {
        fn granted(token: &str) -> Self {
            Self {
                permission: PushPermission::Granted,
                token: Ok(token.to_string()),
                permission_requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PushNotificationProvider for FakePush {
        async fn permission_status(&self) -> PushPermission {
            self.permission
        }

        async fn request_permission(&self) -> PushPermission {
            self.permission_requests.fetch_add(1, Ordering::SeqCst);
            PushPermission::Granted
        }

        async fn device_token(&self) -> anyhow::Result<String> {
            match &self.token {
                Ok(token) => Ok(token.clone()),
                Err(err) => Err(anyhow::anyhow!("{err}")),
            }
        }
    }

    #[derive(Default)]
    struct FakeTokenStore {
        stored: Mutex<Option<String>>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl DeviceTokenStore for FakeTokenStore {
        async fn stored_token(&self, _user_id: &str) -> anyhow::Result<Option<String>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn store_token(&self, _user_id: &str, token: &str) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = Some(token.to_string());
            Ok(())
        }
    }

    fn authed() -> Session {
        Session::authenticated("marie".into(), Role::President, None)
    }

    #[tokio::test]
    async fn repeated_sync_with_unchanged_token_writes_once() {
        let store = Arc::new(FakeTokenStore::default());
        let registrar = PushTokenRegistrar::new(
            Arc::new(FakePush::granted("tok-1")),
            Arc::clone(&store) as Arc<dyn DeviceTokenStore>,
        );

        registrar.sync(&authed()).await;
        registrar.sync(&authed()).await;

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.stored.lock().unwrap().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn matching_stored_token_is_not_rewritten() {
        let store = Arc::new(FakeTokenStore::default());
        *store.stored.lock().unwrap() = Some("tok-1".to_string());
        let registrar = PushTokenRegistrar::new(
            Arc::new(FakePush::granted("tok-1")),
            Arc::clone(&store) as Arc<dyn DeviceTokenStore>,
        );

        registrar.sync(&authed()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn denied_permission_skips_everything() {
        let store = Arc::new(FakeTokenStore::default());
        let mut push = FakePush::granted("tok-1");
        push.permission = PushPermission::Denied;
        let registrar = PushTokenRegistrar::new(Arc::new(push), Arc::clone(&store) as Arc<dyn DeviceTokenStore>);

        registrar.sync(&authed()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undetermined_permission_is_requested_once() {
        let store = Arc::new(FakeTokenStore::default());
        let mut push = FakePush::granted("tok-1");
        push.permission = PushPermission::Undetermined;
        let registrar = PushTokenRegistrar::new(Arc::new(push), Arc::clone(&store) as Arc<dyn DeviceTokenStore>);

        registrar.sync(&authed()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_read_failure_is_swallowed() {
        let store = Arc::new(FakeTokenStore::default());
        let push = FakePush {
            permission: PushPermission::Granted,
            token: Err(anyhow::anyhow!("no apns")),
            permission_requests: AtomicUsize::new(0),
        };
        let registrar = PushTokenRegistrar::new(Arc::new(push), Arc::clone(&store) as Arc<dyn DeviceTokenStore>);

        registrar.sync(&authed()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unauthenticated_session_is_a_noop() {
        let store = Arc::new(FakeTokenStore::default());
        let registrar = PushTokenRegistrar::new(
            Arc::new(FakePush::granted("tok-1")),
            Arc::clone(&store) as Arc<dyn DeviceTokenStore>,
        );

        registrar.sync(&Session::unauthenticated()).await;
        registrar.sync(&Session::unknown()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn new_device_token_overwrites_old_one() {
        let store = Arc::new(FakeTokenStore::default());
        *store.stored.lock().unwrap() = Some("tok-old".to_string());
        let registrar = PushTokenRegistrar::new(
            Arc::new(FakePush::granted("tok-new")),
            Arc::clone(&store) as Arc<dyn DeviceTokenStore>,
        );

        registrar.sync(&authed()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.stored.lock().unwrap().as_deref(), Some("tok-new"));
    }
}
