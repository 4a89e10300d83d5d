//! Keyed TTL cache with fetch coalescing and stale-while-revalidate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{CacheError, FetchError};
use crate::ports::PersistentKeyValueStore;

/// Storage key under which the snapshot is persisted.
const SNAPSHOT_KEY: &str = "cache:snapshot";

type FetchOutcome = Result<Value, Arc<FetchError>>;
type InflightRx = watch::Receiver<Option<FetchOutcome>>;

/// Type-erased fetch future, for callers that build fetchers dynamically
/// (e.g. dispatching on a screen's data requirements at runtime).
pub type BoxFetch = futures::future::BoxFuture<'static, anyhow::Result<Value>>;

/// One cached asynchronous value.
///
/// At most one in-flight fetch exists per key; a value older than its TTL is
/// stale but remains servable until a fresher value replaces it. A failed
/// fetch records `last_error` and preserves the previous value.
#[derive(Default)]
struct Entry {
    value: Option<Value>,
    fetched_at: Option<DateTime<Utc>>,
    last_error: Option<Arc<FetchError>>,
    inflight: Option<InflightRx>,
}

impl Entry {
    /// Staleness is elapsed seconds >= ttl, so a ttl of 0 always refetches
    /// on read and a value fetched at `t` is served without refetch for any
    /// read strictly before `t + ttl`.
    fn is_fresh(&self, ttl_seconds: i64, now: DateTime<Utc>) -> bool {
        match (&self.value, self.fetched_at) {
            (Some(_), Some(at)) => (now - at).num_seconds() < ttl_seconds,
            _ => false,
        }
    }
}

/// Result of a cache read.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// Current value for the key, possibly stale, possibly absent.
    pub value: Option<Value>,
    /// Error from the most recent failed fetch, cleared by the next success.
    pub error: Option<Arc<FetchError>>,
    /// Whether a fetch for this key is still in flight.
    pub is_refreshing: bool,
}

impl Lookup {
    /// Deserialize the cached payload into a caller-owned type.
    pub fn value_as<T: DeserializeOwned>(&self) -> anyhow::Result<Option<T>> {
        match &self.value {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    key: String,
    value: Value,
    fetched_at: DateTime<Utc>,
}

/// Generic keyed store for remote-fetched values.
///
/// Every screen obtains its data through [`CacheStore::get`]; concurrent
/// reads of the same key coalesce into a single fetch, stale values are
/// served while a revalidation runs in the background, and fetch failures
/// are localized to their entry. Clone is cheap - the store is an `Arc`
/// around the entry map.
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a key scoped to an identity, so that [`Self::invalidate_scope`]
    /// can drop everything belonging to a departing user at sign-out.
    pub fn scoped_key(user_id: &str, rest: &str) -> String {
        format!("u:{}:{}", user_id, rest)
    }

    fn scope_prefix(user_id: &str) -> String {
        format!("u:{}:", user_id)
    }

    /// The mutex is never held across an await; poisoning can only come from
    /// a panic inside one of these short critical sections, in which case the
    /// map itself is still structurally sound.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read the value for `key`, fetching it if absent or stale.
    ///
    /// - Fresh value: returned immediately, `fetcher` is never invoked.
    /// - Absent value: starts (or attaches to) the single in-flight fetch
    ///   and waits for its completion.
    /// - Stale value: returned immediately with `is_refreshing = true` while
    ///   at most one revalidation runs in the background.
    ///
    /// A `ttl_seconds` of 0 means "always refetch on read if not already in
    /// flight"; a negative TTL is a caller error.
    pub async fn get<F, Fut>(
        &self,
        key: &str,
        ttl_seconds: i64,
        fetcher: F,
    ) -> Result<Lookup, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if ttl_seconds < 0 {
            return Err(CacheError::NegativeTtl(ttl_seconds));
        }

        let rx = {
            let mut entries = self.entries();
            let entry = entries.entry(key.to_string()).or_default();
            let now = Utc::now();

            if entry.is_fresh(ttl_seconds, now) {
                return Ok(Lookup {
                    value: entry.value.clone(),
                    error: entry.last_error.clone(),
                    is_refreshing: entry.inflight.is_some(),
                });
            }

            let rx = match &entry.inflight {
                Some(rx) => rx.clone(),
                None => {
                    debug!(key, ttl_seconds, "cache miss or stale, starting fetch");
                    self.start_fetch(entry, key, fetcher)
                }
            };

            if entry.value.is_some() {
                // Stale-while-revalidate: serve the old value right away.
                return Ok(Lookup {
                    value: entry.value.clone(),
                    error: entry.last_error.clone(),
                    is_refreshing: true,
                });
            }

            rx
        };

        // Nothing cached yet: attach to the outstanding fetch.
        Ok(match self.wait(key, rx).await {
            Ok(value) => Lookup {
                value: Some(value),
                error: None,
                is_refreshing: false,
            },
            Err(err) => Lookup {
                value: None,
                error: Some(err),
                is_refreshing: false,
            },
        })
    }

    /// Unconditionally fetch `key`, regardless of staleness, coalescing with
    /// any fetch already in flight. Waits for the result.
    pub async fn refresh<F, Fut>(&self, key: &str, fetcher: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let rx = {
            let mut entries = self.entries();
            let entry = entries.entry(key.to_string()).or_default();
            match &entry.inflight {
                Some(rx) => rx.clone(),
                None => self.start_fetch(entry, key, fetcher),
            }
        };
        self.wait(key, rx).await
    }

    /// Delete the entry for `key`; the next `get` starts fresh.
    pub fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Delete every entry whose key matches `predicate`.
    pub fn invalidate_all<P>(&self, predicate: P)
    where
        P: Fn(&str) -> bool,
    {
        self.entries().retain(|key, _| !predicate(key));
    }

    /// Drop every entry scoped to `user_id` (see [`Self::scoped_key`]).
    /// Called by the session manager when that identity signs out.
    pub fn invalidate_scope(&self, user_id: &str) {
        let prefix = Self::scope_prefix(user_id);
        self.invalidate_all(|key| key.starts_with(&prefix));
    }

    /// Number of entries currently held (including valueless placeholders).
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Persist completed entries so cached data survives a process restart.
    /// In-flight state and errors are never persisted.
    pub async fn save_snapshot(&self, store: &dyn PersistentKeyValueStore) -> anyhow::Result<()> {
        let snapshot: Vec<SnapshotEntry> = self
            .entries()
            .iter()
            .filter_map(|(key, entry)| match (&entry.value, entry.fetched_at) {
                (Some(value), Some(fetched_at)) => Some(SnapshotEntry {
                    key: key.clone(),
                    value: value.clone(),
                    fetched_at,
                }),
                _ => None,
            })
            .collect();
        let json = serde_json::to_string(&snapshot)?;
        store.set_item(SNAPSHOT_KEY, &json).await
    }

    /// Load a previously saved snapshot. Entries that already hold a value
    /// are left alone; a corrupt snapshot is discarded, not fatal.
    pub async fn load_snapshot(&self, store: &dyn PersistentKeyValueStore) -> anyhow::Result<()> {
        let Some(json) = store.get_item(SNAPSHOT_KEY).await? else {
            return Ok(());
        };
        let snapshot: Vec<SnapshotEntry> = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "discarding corrupt cache snapshot");
                return Ok(());
            }
        };
        let mut entries = self.entries();
        for item in snapshot {
            let entry = entries.entry(item.key).or_default();
            if entry.value.is_none() {
                entry.value = Some(item.value);
                entry.fetched_at = Some(item.fetched_at);
            }
        }
        Ok(())
    }

    /// Start the single in-flight fetch for `key`. Must be called with the
    /// entry map locked; the spawned task re-locks it on completion.
    fn start_fetch<F, Fut>(&self, entry: &mut Entry, key: &str, fetcher: F) -> InflightRx
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        entry.inflight = Some(rx.clone());

        let store = self.clone();
        let key = key.to_string();
        let fut = fetcher();
        let task_rx = rx.clone();
        tokio::spawn(async move {
            let outcome: FetchOutcome = fut
                .await
                .map_err(|err| Arc::new(FetchError::Failed(err)));
            {
                let mut entries = store.entries();
                // The entry may have been invalidated mid-flight, possibly
                // recreated with a newer fetch already running. Write back
                // only while this fetch is still the entry's current one;
                // waiters attached to this channel receive the result either
                // way.
                let entry = entries.get_mut(&key).filter(|entry| {
                    entry
                        .inflight
                        .as_ref()
                        .is_some_and(|current| current.same_channel(&task_rx))
                });
                if let Some(entry) = entry {
                    match &outcome {
                        Ok(value) => {
                            entry.value = Some(value.clone());
                            entry.fetched_at = Some(Utc::now());
                            entry.last_error = None;
                        }
                        Err(err) => {
                            debug!(key = %key, error = %err, "cache fetch failed");
                            entry.last_error = Some(Arc::clone(err));
                        }
                    }
                    entry.inflight = None;
                }
            }
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    /// Wait for an in-flight fetch to report. A sender dropped without a
    /// result means the fetch task died; the dead in-flight marker is cleared
    /// so the next read can start over.
    async fn wait(&self, key: &str, mut rx: InflightRx) -> FetchOutcome {
        match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => match outcome.as_ref() {
                Some(outcome) => outcome.clone(),
                None => Err(Arc::new(FetchError::Aborted)),
            },
            Err(_) => {
                let mut entries = self.entries();
                if let Some(entry) = entries.get_mut(key) {
                    if entry
                        .inflight
                        .as_ref()
                        .is_some_and(|rx| rx.has_changed().is_err())
                    {
                        entry.inflight = None;
                    }
                }
                Err(Arc::new(FetchError::Aborted))
            }
        }
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, seconds: i64) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            if let Some(at) = entry.fetched_at {
                entry.fetched_at = Some(at - chrono::Duration::seconds(seconds));
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
