//! The keyed query cache.
//!
//! # Design
//! `QueryClient` is an explicit registry handed to every resource module:
//! empty at construction, cleared on logout. Each entry holds the last
//! committed value (as `serde_json::Value`), when it was committed, whether it
//! has been invalidated, the in-flight fetch, the last fetcher registered for
//! the key, and a watch channel for observers.
//!
//! The map sits behind a mutex that is never held across an await. Each fetch
//! is tagged with an id and may only commit while it is still the entry's
//! in-flight fetch, so a cancelled or superseded fetch can never overwrite a
//! newer value. Invalidation detaches the in-flight fetch too: a response
//! that left the server before a write must not mark the entry fresh.
//!
//! Entries without observers or an in-flight fetch are evicted once they are
//! stale and have gone unused for `gc_time`. The sweep runs on every read and
//! subscription.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::{ClientConfig, DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
use crate::error::ApiError;
use crate::query::key::QueryKey;

type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Cache-wide defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    pub stale_time: Duration,
    /// Idle time after which an unobserved stale entry is evicted.
    pub gc_time: Duration,
    /// Extra attempts after a retryable fetch failure.
    pub retry: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            retry: 1,
        }
    }
}

impl From<&ClientConfig> for QueryConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            stale_time: config.stale_time,
            gc_time: config.gc_time,
            retry: config.retry,
        }
    }
}

/// Per-read options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Overrides the cache-wide stale time for this key.
    pub stale_time: Option<Duration>,
    /// Return a stale value immediately while refetching in the background.
    /// When false, a stale read waits for the refetch.
    pub serve_stale: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: None,
            serve_stale: true,
        }
    }
}

impl QueryOptions {
    pub fn with_stale_time(stale_time: Duration) -> Self {
        Self {
            stale_time: Some(stale_time),
            ..Self::default()
        }
    }

    pub fn wait_for_fresh(mut self) -> Self {
        self.serve_stale = false;
        self
    }
}

/// The committed part of an entry. Snapshots and rollbacks operate on this.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub data: Option<Value>,
    pub updated_at: Option<Instant>,
    pub invalidated: bool,
}

impl QueryState {
    fn empty() -> Self {
        Self {
            data: None,
            updated_at: None,
            invalidated: false,
        }
    }

    fn committed(data: Value) -> Self {
        Self {
            data: Some(data),
            updated_at: Some(Instant::now()),
            invalidated: false,
        }
    }

    pub fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.updated_at {
            Some(at) => now.duration_since(at) >= stale_time,
            None => true,
        }
    }
}

/// States of every entry under a prefix, in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, QueryState)>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone)]
struct FetchOutcome {
    result: Result<Value, ApiError>,
    /// False when the fetch was cancelled or superseded before it finished.
    committed: bool,
}

struct InFlight {
    id: u64,
    future: SharedFetch,
}

struct Entry {
    state: QueryState,
    stale_time: Duration,
    in_flight: Option<InFlight>,
    fetcher: Option<Fetcher>,
    notify: watch::Sender<Option<Value>>,
    last_used: Instant,
}

impl Entry {
    fn new(stale_time: Duration) -> Self {
        let (notify, _) = watch::channel(None);
        Self {
            state: QueryState::empty(),
            stale_time,
            in_flight: None,
            fetcher: None,
            notify,
            last_used: Instant::now(),
        }
    }

    fn is_idle(&self, gc_time: Duration, now: Instant) -> bool {
        self.notify.receiver_count() == 0
            && self.in_flight.is_none()
            && self.state.is_stale(self.stale_time, now)
            && now.duration_since(self.last_used) >= gc_time
    }

    fn set_state(&mut self, state: QueryState) {
        self.notify.send_replace(state.data.clone());
        self.state = state;
    }
}

struct Inner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    next_fetch_id: AtomicU64,
    config: QueryConfig,
}

impl Inner {
    /// Store the outcome of fetch `id` if it is still the entry's in-flight
    /// fetch. Failed fetches keep the previous value.
    fn commit(&self, key: &QueryKey, id: u64, result: &Result<Value, ApiError>) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            tracing::debug!(%key, "entry removed before fetch finished");
            return false;
        };
        if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
            tracing::debug!(%key, fetch = id, "discarding superseded fetch");
            return false;
        }
        entry.in_flight = None;
        match result {
            Ok(value) => entry.set_state(QueryState::committed(value.clone())),
            Err(error) => tracing::warn!(%key, %error, "fetch failed"),
        }
        true
    }

    fn evict_idle(&self, entries: &mut HashMap<QueryKey, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_idle(self.config.gc_time, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle queries");
        }
    }
}

enum Lookup {
    Fresh(Value),
    Stale(Value),
    Pending(SharedFetch),
}

/// Process-wide query cache. Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.entries.lock().len())
            .finish()
    }
}

impl QueryClient {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_fetch_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read `key` through the cache.
    ///
    /// Fresh data returns without calling `fetch`. Stale data returns
    /// immediately and schedules one background refetch, unless
    /// `options.serve_stale` is false. Missing data waits for a fetch that is
    /// shared with every concurrent reader of the same key.
    pub async fn query<T, F, Fut>(
        &self,
        key: QueryKey,
        options: QueryOptions,
        fetch: F,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || {
            let pending = fetch();
            async move {
                let value = pending.await?;
                serde_json::to_value(value).map_err(|e| ApiError::SerializationError(e.to_string()))
            }
            .boxed()
        });

        let value = match self.lookup(&key, options, fetcher) {
            Lookup::Fresh(value) => {
                tracing::trace!(%key, "cache hit");
                value
            }
            Lookup::Stale(value) => {
                tracing::debug!(%key, "serving stale value while revalidating");
                value
            }
            Lookup::Pending(fetch) => self.await_fetch(&key, fetch).await?,
        };
        decode(value)
    }

    fn lookup(&self, key: &QueryKey, options: QueryOptions, fetcher: Fetcher) -> Lookup {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        self.inner.evict_idle(&mut entries, now);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(self.inner.config.stale_time));
        entry.last_used = now;
        entry.fetcher = Some(fetcher.clone());
        entry.stale_time = options.stale_time.unwrap_or(self.inner.config.stale_time);

        let stale = entry.state.is_stale(entry.stale_time, now);
        match entry.state.data.clone() {
            Some(data) if !stale => Lookup::Fresh(data),
            Some(data) if options.serve_stale => {
                start_fetch(&self.inner, key, entry, fetcher, true);
                Lookup::Stale(data)
            }
            _ => Lookup::Pending(start_fetch(&self.inner, key, entry, fetcher, false)),
        }
    }

    async fn await_fetch(&self, key: &QueryKey, fetch: SharedFetch) -> Result<Value, ApiError> {
        let mut fetch = fetch;
        loop {
            let outcome = fetch.await;
            if outcome.committed {
                return outcome.result;
            }
            // Detached while we waited: follow the replacement fetch if there
            // is one, otherwise report what the cache holds now.
            fetch = {
                let entries = self.inner.entries.lock();
                let Some(entry) = entries.get(key) else {
                    return Err(ApiError::Cancelled);
                };
                match &entry.in_flight {
                    Some(next) => next.future.clone(),
                    None => return entry.state.data.clone().ok_or(ApiError::Cancelled),
                }
            };
        }
    }

    /// Subscribe to values committed under `key`.
    pub fn subscribe<T: DeserializeOwned>(&self, key: QueryKey) -> QueryObserver<T> {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        self.inner.evict_idle(&mut entries, now);
        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(self.inner.config.stale_time));
        entry.last_used = now;
        QueryObserver {
            rx: entry.notify.subscribe(),
            _marker: PhantomData,
        }
    }

    // -----------------------------------------------------------------------
    // Direct data access
    // -----------------------------------------------------------------------

    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.inner.entries.lock();
        let value = entries.get(key)?.state.data.clone()?;
        decode(value).ok()
    }

    /// Commit `data` under `key` as if a fetch had just returned it.
    pub fn set_query_data<T: Serialize>(&self, key: QueryKey, data: &T) -> Result<(), ApiError> {
        let value =
            serde_json::to_value(data).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(self.inner.config.stale_time));
        entry.last_used = Instant::now();
        entry.set_state(QueryState::committed(value));
        Ok(())
    }

    /// Data of every entry under `prefix` that decodes as `T`, in key order.
    pub fn get_queries_data<T: DeserializeOwned>(&self, prefix: &QueryKey) -> Vec<(QueryKey, T)> {
        let entries = self.inner.entries.lock();
        let mut found: Vec<(QueryKey, T)> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, entry)| {
                let data = decode(entry.state.data.clone()?).ok()?;
                Some((key.clone(), data))
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Rewrite the data of every entry under `prefix` that decodes as `T`.
    /// Entries holding other shapes are left untouched. Returns how many
    /// entries changed.
    pub fn set_queries_data<T, F>(&self, prefix: &QueryKey, mut update: F) -> usize
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> T,
    {
        let mut entries = self.inner.entries.lock();
        let mut updated = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            let Some(current) = entry.state.data.clone() else {
                continue;
            };
            let Ok(old) = decode::<T>(current) else {
                continue;
            };
            match serde_json::to_value(update(old)) {
                Ok(value) => {
                    entry.set_state(QueryState::committed(value));
                    updated += 1;
                }
                Err(error) => tracing::warn!(%key, %error, "optimistic update not serializable"),
            }
        }
        updated
    }

    pub fn state(&self, key: &QueryKey) -> Option<QueryState> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|entry| entry.state.clone())
    }

    /// Whether the entry would trigger a refetch if read now.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        let entries = self.inner.entries.lock();
        let entry = entries.get(key)?;
        Some(entry.state.is_stale(entry.stale_time, Instant::now()))
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self.inner.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    // -----------------------------------------------------------------------
    // Invalidation, cancellation, snapshots
    // -----------------------------------------------------------------------

    /// Mark every entry under `prefix` stale and detach its in-flight fetch,
    /// which may have been answered before the write that caused this call.
    /// Entries that had a fetch in flight or have live observers are
    /// refetched in the background; readers of a detached fetch wait for the
    /// replacement. Returns how many entries matched.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.entries.lock();
        let mut matched = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            entry.state.invalidated = true;
            matched += 1;
            let detached = entry.in_flight.take();
            if let Some(in_flight) = &detached {
                tracing::debug!(%key, fetch = in_flight.id, "detached fetch on invalidation");
            }
            if detached.is_some() || entry.notify.receiver_count() > 0 {
                if let Some(fetcher) = entry.fetcher.clone() {
                    start_fetch(&self.inner, key, entry, fetcher, true);
                }
            }
        }
        tracing::debug!(%prefix, matched, "invalidated queries");
        matched
    }

    /// Detach every in-flight fetch under `prefix`. Their results are never
    /// committed.
    pub fn cancel_queries(&self, prefix: &QueryKey) {
        let mut entries = self.inner.entries.lock();
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            if let Some(in_flight) = entry.in_flight.take() {
                tracing::debug!(%key, fetch = in_flight.id, "cancelled in-flight fetch");
            }
        }
    }

    pub fn snapshot(&self, prefix: &QueryKey) -> CacheSnapshot {
        let entries = self.inner.entries.lock();
        let mut captured: Vec<_> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.state.clone()))
            .collect();
        captured.sort_by(|a, b| a.0.cmp(&b.0));
        CacheSnapshot { entries: captured }
    }

    /// Put every captured entry back exactly as it was, in key order.
    pub fn restore(&self, snapshot: &CacheSnapshot) {
        let mut entries = self.inner.entries.lock();
        for (key, state) in &snapshot.entries {
            entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(self.inner.config.stale_time))
                .set_state(state.clone());
        }
        tracing::debug!(restored = snapshot.entries.len(), "restored cache snapshot");
    }

    /// Drop every entry. Observers see their channel close.
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        tracing::debug!(entries = entries.len(), "clearing query cache");
        entries.clear();
    }
}

/// Join the entry's in-flight fetch, or start a new one.
fn start_fetch(
    inner: &Arc<Inner>,
    key: &QueryKey,
    entry: &mut Entry,
    fetcher: Fetcher,
    background: bool,
) -> SharedFetch {
    if let Some(in_flight) = &entry.in_flight {
        return in_flight.future.clone();
    }

    let id = inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    let retry = inner.config.retry;
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let fetch_key = key.clone();
    let future = async move {
        let result = fetch_with_retry(&fetch_key, &fetcher, retry).await;
        let committed = match weak.upgrade() {
            Some(inner) => inner.commit(&fetch_key, id, &result),
            None => false,
        };
        FetchOutcome { result, committed }
    }
    .boxed()
    .shared();

    entry.in_flight = Some(InFlight {
        id,
        future: future.clone(),
    });

    if background {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = future.clone();
                handle.spawn(async move {
                    task.await;
                });
            }
            Err(_) => tracing::debug!(%key, "no runtime; refetch runs on next read"),
        }
    }
    future
}

async fn fetch_with_retry(
    key: &QueryKey,
    fetcher: &Fetcher,
    retry: u32,
) -> Result<Value, ApiError> {
    let mut attempt = 0;
    loop {
        tracing::debug!(%key, attempt, "fetching");
        match fetcher().await {
            Err(error) if attempt < retry && error.is_retryable() => {
                tracing::warn!(%key, attempt, %error, "fetch failed, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Receives every value committed under one key.
pub struct QueryObserver<T> {
    rx: watch::Receiver<Option<Value>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> QueryObserver<T> {
    /// The latest committed value, if any.
    pub fn current(&self) -> Option<T> {
        let value = self.rx.borrow().clone()?;
        decode(value).ok()
    }

    /// Wait for the next commit. Fails with `Cancelled` once the cache has
    /// been cleared.
    pub async fn changed(&mut self) -> Result<Option<T>, ApiError> {
        self.rx.changed().await.map_err(|_| ApiError::Cancelled)?;
        Ok(self.current())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::future::join_all;
    use serde_json::json;

    use super::*;

    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<usize, ApiError>> + Send + Sync + 'static {
        move || {
            let calls = calls.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
            }
            .boxed()
        }
    }

    /// Numbers each call when it starts, then answers after 10ms.
    fn numbered_fetcher(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<usize, ApiError>> + Send + Sync + 'static {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(n)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("posts").page(1, 10);

        let reads = (0..5).map(|_| {
            cache.query(
                key.clone(),
                QueryOptions::default(),
                counting_fetcher(calls.clone()),
            )
        });
        let results = join_all(reads).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn fresh_data_skips_fetch() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("messages");

        let first: usize = cache
            .query(key.clone(), QueryOptions::default(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        let second: usize = cache
            .query(key.clone(), QueryOptions::default(), counting_fetcher(calls.clone()))
            .await
            .unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_served_stale_and_refetched_once() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("skills").with("all");
        let options = QueryOptions::with_stale_time(Duration::from_secs(600));

        let first: usize = cache
            .query(key.clone(), options, counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(first, 1);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.is_stale(&key), Some(false));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.is_stale(&key), Some(true));

        let mut observer = cache.subscribe::<usize>(key.clone());
        let stale: usize = cache
            .query(key.clone(), options, counting_fetcher(calls.clone()))
            .await
            .unwrap();
        let again: usize = cache
            .query(key.clone(), options, counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!((stale, again), (1, 1));

        assert_eq!(observer.changed().await.unwrap(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_query_data::<usize>(&key), Some(2));
        assert_eq!(cache.is_stale(&key), Some(false));
    }

    #[tokio::test]
    async fn wait_for_fresh_blocks_on_refetch() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("profile");
        cache.set_query_data(key.clone(), &0usize).unwrap();
        cache.invalidate_queries(&key);

        let value: usize = cache
            .query(
                key.clone(),
                QueryOptions::default().wait_for_fresh(),
                counting_fetcher(calls.clone()),
            )
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn invalidation_is_limited_to_prefix() {
        let cache = QueryClient::default();
        let page = QueryKey::new("posts").page(1, 10);
        let detail = QueryKey::new("posts").with("detail").with("abc");
        let projects = QueryKey::new("projects").page(1, 10);
        cache.set_query_data(page.clone(), &json!({"n": 1})).unwrap();
        cache.set_query_data(detail.clone(), &json!(null)).unwrap();
        cache.set_query_data(projects.clone(), &json!([1, 2])).unwrap();
        let untouched = cache.state(&projects);

        assert_eq!(cache.invalidate_queries(&QueryKey::new("posts")), 2);

        assert_eq!(cache.is_stale(&page), Some(true));
        assert_eq!(cache.is_stale(&detail), Some(true));
        assert_eq!(cache.is_stale(&projects), Some(false));
        assert_eq!(cache.state(&projects), untouched);
        assert_eq!(cache.get_query_data::<serde_json::Value>(&page), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn retries_once_on_transport_failure() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let value: String = cache
            .query(QueryKey::new("messages"), QueryOptions::default(), move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ApiError::Transport("connection reset".into()))
                    } else {
                        Ok("inbox".to_string())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "inbox");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_one_retry() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = cache
            .query::<String, _, _>(QueryKey::new("messages"), QueryOptions::default(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ApiError::HttpError {
                        status: 503,
                        body: "maintenance".into(),
                    })
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_fetching(&QueryKey::new("messages")));
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = cache
            .query::<String, _, _>(QueryKey::new("profile"), QueryOptions::default(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::NotFound) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fetch_never_overwrites() {
        let cache = QueryClient::default();
        let key = QueryKey::new("posts").page(1, 10);

        let reader = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .query(key, QueryOptions::default(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("from server".to_string())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(cache.is_fetching(&key));

        cache.cancel_queries(&QueryKey::new("posts"));
        cache.set_query_data(key.clone(), &"optimistic").unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), "optimistic");
        assert_eq!(cache.get_query_data::<String>(&key).as_deref(), Some("optimistic"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fetch_without_data_reports_cancelled() {
        let cache = QueryClient::default();
        let key = QueryKey::new("messages");

        let reader = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .query(key, QueryOptions::default(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(1u32)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        cache.cancel_queries(&key);

        assert!(matches!(reader.await.unwrap(), Err(ApiError::Cancelled)));
        assert_eq!(cache.get_query_data::<u32>(&key), None);
    }

    #[tokio::test]
    async fn invalidation_refetches_observed_entries() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("messages");
        let _: usize = cache
            .query(key.clone(), QueryOptions::default(), counting_fetcher(calls.clone()))
            .await
            .unwrap();

        let mut observer = cache.subscribe::<usize>(key.clone());
        cache.invalidate_queries(&QueryKey::new("messages"));

        assert_eq!(observer.changed().await.unwrap(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_drops_every_entry() {
        let cache = QueryClient::default();
        cache.set_query_data(QueryKey::new("posts").page(1, 10), &1).unwrap();
        cache.set_query_data(QueryKey::new("profile"), &2).unwrap();
        cache.set_query_data(QueryKey::new("skills").with("all"), &3).unwrap();
        let mut observer = cache.subscribe::<i32>(QueryKey::new("profile"));
        assert_eq!(observer.current(), Some(2));

        cache.clear();

        assert!(cache.keys().is_empty());
        assert_eq!(cache.get_query_data::<i32>(&QueryKey::new("profile")), None);
        assert!(matches!(observer.changed().await, Err(ApiError::Cancelled)));
    }

    #[test]
    fn set_queries_data_skips_other_shapes() {
        let cache = QueryClient::default();
        cache.set_query_data(QueryKey::new("posts").page(1, 10), &vec![1, 2, 3]).unwrap();
        cache
            .set_query_data(QueryKey::new("posts").with("detail").with("x"), &"post x")
            .unwrap();

        let changed = cache.set_queries_data::<Vec<i32>, _>(&QueryKey::new("posts"), |mut v| {
            v.pop();
            v
        });

        assert_eq!(changed, 1);
        assert_eq!(
            cache.get_queries_data::<serde_json::Value>(&QueryKey::new("posts")),
            vec![
                (QueryKey::new("posts").with("detail").with("x"), json!("post x")),
                (QueryKey::new("posts").page(1, 10), json!([1, 2])),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_in_flight_during_invalidation_is_replaced() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("posts").page(1, 10);

        let reader = {
            let cache = cache.clone();
            let key = key.clone();
            let fetch = numbered_fetcher(calls.clone());
            tokio::spawn(async move {
                cache
                    .query::<usize, _, _>(key, QueryOptions::default(), fetch)
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(cache.is_fetching(&key));

        cache.invalidate_queries(&QueryKey::new("posts"));
        assert!(cache.is_fetching(&key));
        assert_eq!(cache.is_stale(&key), Some(true));

        assert_eq!(reader.await.unwrap().unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_query_data::<usize>(&key), Some(2));
        assert!(!cache.is_fetching(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn observed_refetch_restarts_after_invalidation() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new("messages");
        cache.set_query_data(key.clone(), &0usize).unwrap();
        cache.invalidate_queries(&key);
        let mut observer = cache.subscribe::<usize>(key.clone());

        let stale: usize = cache
            .query(key.clone(), QueryOptions::default(), numbered_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(stale, 0);
        cache.invalidate_queries(&key);

        assert_eq!(observer.changed().await.unwrap(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.is_stale(&key), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stale_entries_are_evicted() {
        let cache = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let detail = QueryKey::new("posts").with("detail").with("p1");
        let observed = QueryKey::new("profile");
        let catalog = QueryKey::new("skills").with("all");

        cache.set_query_data(detail.clone(), &json!(null)).unwrap();
        cache.set_query_data(observed.clone(), &1).unwrap();
        let _observer = cache.subscribe::<i32>(observed.clone());
        let _: usize = cache
            .query(
                catalog.clone(),
                QueryOptions::with_stale_time(Duration::from_secs(600)),
                numbered_fetcher(calls.clone()),
            )
            .await
            .unwrap();

        tokio::time::advance(DEFAULT_GC_TIME - Duration::from_secs(1)).await;
        drop(cache.subscribe::<i32>(QueryKey::new("messages")));
        assert!(cache.keys().contains(&detail));

        tokio::time::advance(Duration::from_secs(1)).await;
        drop(cache.subscribe::<i32>(QueryKey::new("messages")));
        let keys = cache.keys();
        assert!(!keys.contains(&detail));
        assert!(keys.contains(&observed));
        assert!(keys.contains(&catalog));
    }
}
