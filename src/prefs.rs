//! Remembered values: last login identifier and per-screen last-viewed
//! timestamps, persisted as one JSON document in the key-value store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::PersistentKeyValueStore;

const PREFS_KEY: &str = "prefs";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PrefsData {
    last_email: Option<String>,
    #[serde(default)]
    last_viewed: HashMap<String, DateTime<Utc>>,
}

pub struct Preferences {
    store: Arc<dyn PersistentKeyValueStore>,
    data: Mutex<PrefsData>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PersistentKeyValueStore>) -> Self {
        Self {
            store,
            data: Mutex::new(PrefsData::default()),
        }
    }

    fn data(&self) -> MutexGuard<'_, PrefsData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load persisted preferences. Anything unreadable falls back to
    /// defaults with a log line; startup never fails on preferences.
    pub async fn load(&self) {
        let raw = match self.store.get_item(PREFS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(err) => {
                debug!(error = %err, "failed to read preferences");
                return;
            }
        };
        match serde_json::from_str::<PrefsData>(&raw) {
            Ok(data) => *self.data() = data,
            Err(err) => debug!(error = %err, "discarding unreadable preferences"),
        }
    }

    pub async fn remember_login(&self, email: &str) -> anyhow::Result<()> {
        self.data().last_email = Some(email.to_string());
        self.persist().await
    }

    pub fn remembered_login(&self) -> Option<String> {
        self.data().last_email.clone()
    }

    pub async fn forget_login(&self) -> anyhow::Result<()> {
        self.data().last_email = None;
        self.persist().await
    }

    /// Record that `screen` was viewed now.
    pub async fn mark_viewed(&self, screen: &str) -> anyhow::Result<()> {
        self.data().last_viewed.insert(screen.to_string(), Utc::now());
        self.persist().await
    }

    pub fn last_viewed(&self, screen: &str) -> Option<DateTime<Utc>> {
        self.data().last_viewed.get(screen).copied()
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let snapshot = self.data().clone();
        let json = serde_json::to_string(&snapshot)?;
        self.store.set_item(PREFS_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::MemoryStore;

    fn store() -> Arc<dyn PersistentKeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn remembered_login_survives_reload() {
        let kv: Arc<dyn PersistentKeyValueStore> = Arc::new(MemoryStore::new());

        let prefs = Preferences::new(Arc::clone(&kv));
        prefs.remember_login("marie@club.example").await.unwrap();

        let reloaded = Preferences::new(Arc::clone(&kv));
        reloaded.load().await;
        assert_eq!(
            reloaded.remembered_login(),
            Some("marie@club.example".to_string())
        );
    }

    #[tokio::test]
    async fn forget_login_clears_the_identifier() {
        let prefs = Preferences::new(store());
        prefs.remember_login("a@b.c").await.unwrap();
        prefs.forget_login().await.unwrap();
        assert_eq!(prefs.remembered_login(), None);
    }

    #[tokio::test]
    async fn last_viewed_is_tracked_per_screen() {
        let prefs = Preferences::new(store());
        assert!(prefs.last_viewed("budget").is_none());

        prefs.mark_viewed("budget").await.unwrap();
        let seen = prefs.last_viewed("budget").unwrap();
        assert!((Utc::now() - seen).num_seconds() < 5);
        assert!(prefs.last_viewed("roster").is_none());
    }

    #[tokio::test]
    async fn unreadable_preferences_fall_back_to_defaults() {
        let kv: Arc<dyn PersistentKeyValueStore> = Arc::new(MemoryStore::new());
        kv.set_item(PREFS_KEY, "not json at all").await.unwrap();

        let prefs = Preferences::new(Arc::clone(&kv));
        prefs.load().await;
        assert_eq!(prefs.remembered_login(), None);
    }
}
