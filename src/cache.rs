//! Time-boxed in-memory cache.
//!
//! Entries are never checked for age on the read path: a background sweep
//! removes them once they are older than the TTL. Between sweeps a reader
//! may still see an entry up to one sweep interval past its TTL.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// How often expired entries are removed unless configured otherwise.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry<T> {
    value: T,
    timestamp: Instant,
}

struct Shared<T> {
    name: String,
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<T>>>,
    sweeper: JoinHandle<()>,
}

/// A named string-keyed cache whose entries expire after `ttl`.
///
/// Cloning yields another handle to the same entries. The sweep task stops
/// when the shutdown future passed at construction resolves, or once every
/// handle has been dropped.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use gantry::TtlCache;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pages: TtlCache<String> =
///     TtlCache::new("pages", Duration::from_secs(300), std::future::pending());
///
/// pages.set("/about", "<h1>About</h1>".to_owned());
/// assert_eq!(pages.get("/about").as_deref(), Some("<h1>About</h1>"));
/// # }
/// ```
pub struct TtlCache<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> TtlCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates the cache and starts its sweep, running every minute.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new<S>(name: impl Into<String>, ttl: Duration, shutdown: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        Self::with_sweep_interval(name, ttl, DEFAULT_SWEEP_INTERVAL, shutdown)
    }

    /// Like [`new`](TtlCache::new) with a custom sweep interval.
    ///
    /// # Panics
    ///
    /// Panics when `every` is zero or when called outside a Tokio runtime.
    pub fn with_sweep_interval<S>(
        name: impl Into<String>,
        ttl: Duration,
        every: Duration,
        shutdown: S,
    ) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        assert!(!every.is_zero(), "cache sweep interval must be non-zero");

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<T>>| Shared {
            name: name.into(),
            ttl,
            entries: RwLock::new(HashMap::new()),
            sweeper: tokio::spawn(sweep(weak.clone(), every, shutdown)),
        });
        Self { shared }
    }

    /// Returns a copy of the cached value, however old it is.
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.read();
        let entry = entries.get(key)?;
        debug!(name = %self.shared.name, key, "returning cached entry");
        Some(entry.value.clone())
    }

    /// Inserts or replaces `key`, restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        debug!(name = %self.shared.name, key = %key, "setting cache entry");
        self.write().insert(key, Entry { value, timestamp: Instant::now() });
    }
}

impl<T> TtlCache<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether the background sweep is still running.
    pub fn is_sweeping(&self) -> bool {
        !self.shared.sweeper.is_finished()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry<T>>> {
        self.shared.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry<T>>> {
        self.shared.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Shared<T> {
    /// Removes entries older than the TTL. An entry exactly `ttl` old stays.
    fn evict_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|key, entry| {
            let expired = now.duration_since(entry.timestamp) > self.ttl;
            if expired {
                debug!(name = %self.name, key = %key, ttl = ?self.ttl, "deleting expired cache entry");
            }
            !expired
        });
    }
}

async fn sweep<T, S>(shared: Weak<Shared<T>>, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut ticker = time::interval_at(Instant::now() + every, every);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => break,

            _ = ticker.tick() => {
                // All handles gone: nothing left to sweep.
                let Some(shared) = shared.upgrade() else { break };
                shared.evict_expired();
            }
        }
    }
    debug!("cache sweep stopped");
}

#[cfg(test)]
mod tests {
    use std::future;

    use tokio::sync::oneshot;
    use tokio::time::sleep;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn set_then_get() {
        let cache = TtlCache::new("users", 5 * MINUTE, future::pending());
        assert_eq!(cache.get("a"), None);

        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 3);

        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.name(), "users");
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_strictly_older_entries() {
        let cache = TtlCache::new("pages", 5 * MINUTE, future::pending());
        cache.set("k", "v".to_owned());

        // Ticks at 1..=5 minutes; at 5 the entry is exactly ttl old.
        sleep(5 * MINUTE + Duration::from_secs(30)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        sleep(MINUTE).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_check_age() {
        let cache = TtlCache::with_sweep_interval("stale", Duration::from_secs(1), 60 * MINUTE, future::pending());
        cache.set("k", 7);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.get("k"), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_refreshes_timestamp() {
        let cache = TtlCache::new("refresh", Duration::from_secs(90), future::pending());
        cache.set("k", 1);

        sleep(Duration::from_secs(50)).await;
        cache.set("k", 2);

        // Tick at 120s: the refreshed entry is 70s old.
        sleep(Duration::from_secs(80)).await;
        assert_eq!(cache.get("k"), Some(2));

        // Tick at 180s: 130s old.
        sleep(MINUTE).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_evicts_everything_older_than_the_tick() {
        let cache = TtlCache::new("zero", Duration::ZERO, future::pending());
        cache.set("k", ());
        assert_eq!(cache.get("k"), Some(()));

        sleep(MINUTE + Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_sweep() {
        let (stop, stopped) = oneshot::channel::<()>();
        let cache = TtlCache::new("stoppable", Duration::ZERO, async move {
            let _ = stopped.await;
        });
        assert!(cache.is_sweeping());

        stop.send(()).unwrap();
        sleep(Duration::from_millis(1)).await;
        assert!(!cache.is_sweeping());

        // No sweep anymore: entries stay.
        cache.set("k", 1);
        sleep(5 * MINUTE).await;
        assert_eq!(cache.get("k"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_entries() {
        let cache = TtlCache::new("shared", 5 * MINUTE, future::pending());
        let other = cache.clone();

        other.set("k", 1);
        drop(other);

        assert_eq!(cache.get("k"), Some(1));
        assert!(cache.is_sweeping());
    }
}
