//! Provides the lazily populated and self refreshing cache of rendered documentation.
//!
//! The [DocCache](DocCache) maps canonical namespace names to their rendered
//! [Artifact](crate::artifact::Artifact). Nothing is rendered upfront. The first
//! [resolve](DocCache::resolve) for a name fetches and renders its documentation, stores the
//! result and starts a [refresher](refresher) which keeps re-rendering the name in the background.
//! All subsequent requests are served from memory.
//!
//! # Miss path
//! The expensive render never runs while the cache lock is held. Instead, the first caller which
//! misses a name leaves an in-flight marker in the map and spawns a load task. Concurrent callers
//! for the same name find this marker and wait for the very same outcome, be it a success or a
//! failure. Requests for other names (and cache hits) are never blocked by a render in progress.
//!
//! Failures are not cached. The marker is removed so that the next request tries again.
//!
//! # Lifetime
//! Entries are never evicted and each of them is watched by exactly one refresher. Refreshers
//! keep running until [shutdown](DocCache::shutdown) is invoked.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use nsdoc::cache::DocCache;
//! # use nsdoc::cache::refresher::SilentListener;
//! # use nsdoc::fetch::Fetcher;
//! # use nsdoc::package::Package;
//! # #[tokio::main]
//! # async fn main() {
//! let inspector = |name: &str| -> anyhow::Result<Option<Package>> {
//!     Ok(Some(Package { name: name.to_owned(), ..Package::default() }))
//! };
//! let renderer = |package: &Package| -> anyhow::Result<Vec<u8>> {
//!     Ok(package.name.clone().into_bytes())
//! };
//!
//! let cache = DocCache::new(
//!     Fetcher::new(Arc::new(inspector), Arc::new(renderer)),
//!     Duration::from_secs(3600),
//!     Arc::new(SilentListener),
//! );
//!
//! let artifact = cache.resolve("acme").await.unwrap();
//! assert_eq!(artifact.payload().as_ref(), b"acme");
//! assert_eq!(cache.len(), 1);
//!
//! cache.shutdown().await;
//! # }
//! ```
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::artifact::Artifact;
use crate::cache::refresher::{RefreshListener, Refresher, Refreshers};
use crate::error::DocError;
use crate::fetch::Fetcher;
use crate::fmt::format_size;

pub mod refresher;

/// The outcome of a load as seen by everyone waiting for it. **None** until the load completes.
type Outcome = Option<Result<Arc<Artifact>, DocError>>;

enum Slot {
    Ready(Arc<Artifact>),
    Loading(watch::Receiver<Outcome>),
}

/// Contains the actual name to artifact mapping.
///
/// The lock is only held for short critical sections and never across an await point.
#[derive(Default)]
pub(crate) struct Store {
    entries: Mutex<HashMap<String, Slot>>,
}

impl Store {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, name: &str) -> Option<Arc<Artifact>> {
        match self.lock().get(name) {
            Some(Slot::Ready(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    /// Replaces the artifact of the given name, unless the new one carries the same payload.
    ///
    /// Returns **true** if the artifact was replaced.
    pub(crate) fn replace_if_changed(&self, name: &str, artifact: Artifact) -> bool {
        match self.lock().get_mut(name) {
            Some(Slot::Ready(current)) => {
                if current.same_contents(&artifact) {
                    false
                } else {
                    *current = Arc::new(artifact);
                    true
                }
            }
            _ => false,
        }
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        names
    }
}

/// Caches the rendered documentation of all requested names.
///
/// Use [DocCache::new] to create an instance. As the cache spawns background tasks which refer to
/// it, it is always wrapped in an **Arc**.
pub struct DocCache {
    fetcher: Fetcher,
    store: Arc<Store>,
    refreshers: Refreshers,
    refresh_interval: Duration,
    listener: Arc<dyn RefreshListener>,
}

impl DocCache {
    /// Creates a new and empty cache.
    ///
    /// The **fetcher** is used on the miss path as well as by all refreshers, which re-render
    /// each cached name once per **refresh_interval** and report to the given **listener**.
    pub fn new(
        fetcher: Fetcher,
        refresh_interval: Duration,
        listener: Arc<dyn RefreshListener>,
    ) -> Arc<Self> {
        Arc::new(DocCache {
            fetcher,
            store: Arc::new(Store::default()),
            refreshers: Refreshers::new(),
            refresh_interval,
            listener,
        })
    }

    /// Returns the rendered documentation for the given name.
    ///
    /// If the name is already cached, the artifact is returned immediately. Otherwise it is
    /// fetched and rendered (at most once, even if several callers ask for the same name at the
    /// same time), stored and a refresher is started for it.
    pub async fn resolve(self: &Arc<Self>, name: &str) -> Result<Arc<Artifact>, DocError> {
        let mut receiver = {
            let mut entries = self.store.lock();
            match entries.get(name) {
                Some(Slot::Ready(artifact)) => return Ok(artifact.clone()),
                Some(Slot::Loading(receiver)) => receiver.clone(),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    let _ = entries.insert(name.to_owned(), Slot::Loading(receiver.clone()));
                    self.load(name.to_owned(), sender);
                    receiver
                }
            }
        };

        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(DocError::render(
                name,
                anyhow::anyhow!("Rendering was aborted"),
            ))
        })
    }

    /// Performs the actual fetch and render for a missed name in its own task.
    ///
    /// Running this as a separate task ensures that the in-flight marker is always resolved, even
    /// if the caller which triggered the load goes away.
    fn load(self: &Arc<Self>, name: String, sender: watch::Sender<Outcome>) {
        let cache = self.clone();
        crate::spawn!(async move {
            log::debug!("Rendering the documentation of '{}'...", name);
            let outcome = match cache.fetcher.fetch_and_render_async(&name).await {
                Ok(artifact) => {
                    log::debug!(
                        "Rendered the documentation of '{}' ({}).",
                        name,
                        format_size(artifact.payload().len())
                    );
                    let artifact = Arc::new(artifact);
                    let _ = cache
                        .store
                        .lock()
                        .insert(name.clone(), Slot::Ready(artifact.clone()));
                    if !cache.start_refresher(&name) {
                        log::debug!(
                            "Not refreshing '{}' as the cache has already been shut down.",
                            name
                        );
                    }
                    Ok(artifact)
                }
                Err(error) => {
                    log::debug!("{}", error);
                    let _ = cache.store.lock().remove(&name);
                    Err(error)
                }
            };

            // This only fails if nobody is waiting anymore, which is fine...
            let _ = sender.send(Some(outcome));
        });
    }

    fn start_refresher(&self, name: &str) -> bool {
        let refresher = Refresher {
            name: name.to_owned(),
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
            interval: self.refresh_interval,
            listener: self.listener.clone(),
        };

        self.refreshers.start(name, move |token| refresher.run(token))
    }

    /// Returns the cached artifact for the given name without triggering a render.
    pub fn get(&self, name: &str) -> Option<Arc<Artifact>> {
        self.store.get(name)
    }

    /// Returns the number of cached artifacts.
    pub fn len(&self) -> usize {
        self.store.names().len()
    }

    /// Determines if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the names of all cached artifacts in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.store.names()
    }

    /// Provides access to the background refreshers.
    pub fn refreshers(&self) -> &Refreshers {
        &self.refreshers
    }

    /// Returns the interval in which cached names are re-rendered.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Stops all refreshers.
    ///
    /// Cached artifacts remain available but will no longer be updated.
    pub async fn shutdown(&self) {
        log::info!(
            "Stopping {} documentation refresher(s)...",
            self.refreshers.count()
        );
        self.refreshers.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::cache::refresher::{RefreshListener, SilentListener};
    use crate::cache::DocCache;
    use crate::error::DocError;
    use crate::fetch::Fetcher;
    use crate::package::Package;

    /// Simulates a source tree whose contents and availability can be changed by a test.
    struct Source {
        version: Mutex<String>,
        available: AtomicBool,
        broken: AtomicBool,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl Source {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Source {
                version: Mutex::new("P1".to_owned()),
                available: AtomicBool::new(true),
                broken: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
                delay,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn change(&self, version: &str) {
            *self.version.lock().unwrap() = version.to_owned();
        }
    }

    #[derive(Default)]
    struct CountingListener {
        unchanged: AtomicUsize,
        changed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl RefreshListener for CountingListener {
        fn refreshed(&self, _name: &str, changed: bool) {
            let counter = if changed {
                &self.changed
            } else {
                &self.unchanged
            };
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        }

        fn refresh_failed(&self, _name: &str, _error: &DocError) {
            let _ = self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cache_for(
        source: &Arc<Source>,
        interval: Duration,
        listener: Arc<dyn RefreshListener>,
    ) -> Arc<DocCache> {
        let inspector_source = source.clone();
        let inspector = move |name: &str| -> anyhow::Result<Option<Package>> {
            let _ = inspector_source.fetches.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(inspector_source.delay);

            if inspector_source.broken.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("Source tree is unreadable"));
            }
            if !inspector_source.available.load(Ordering::SeqCst) {
                return Ok(None);
            }

            Ok(Some(Package {
                name: name.to_owned(),
                doc: inspector_source.version.lock().unwrap().clone(),
                ..Package::default()
            }))
        };
        let renderer = |package: &Package| -> anyhow::Result<Vec<u8>> {
            Ok(format!("{}:{}", package.name, package.doc).into_bytes())
        };

        DocCache::new(
            Fetcher::new(Arc::new(inspector), Arc::new(renderer)),
            interval,
            listener,
        )
    }

    #[test]
    fn concurrent_misses_fetch_only_once() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(200));
            let cache = cache_for(&source, Duration::from_secs(3600), Arc::new(SilentListener));

            let (first, second, third) = tokio::join!(
                cache.resolve("acme"),
                cache.resolve("acme"),
                cache.resolve("acme")
            );

            assert_eq!(source.fetches(), 1);
            assert_eq!(first.unwrap().payload().as_ref(), b"acme:P1");
            assert_eq!(second.unwrap().payload().as_ref(), b"acme:P1");
            assert_eq!(third.unwrap().payload().as_ref(), b"acme:P1");

            // Hits don't fetch at all...
            let _ = cache.resolve("acme").await.unwrap();
            assert_eq!(source.fetches(), 1);

            cache.shutdown().await;
        });
    }

    #[test]
    fn names_cached_after_shutdown_are_not_refreshed() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(0));
            let cache = cache_for(&source, Duration::from_millis(50), Arc::new(SilentListener));
            cache.shutdown().await;

            let artifact = cache.resolve("acme").await.unwrap();
            assert_eq!(artifact.payload().as_ref(), b"acme:P1");
            assert_eq!(cache.names(), vec!["acme".to_owned()]);
            assert_eq!(cache.refreshers().count(), 0);
            assert!(!cache.refreshers().is_active("acme"));

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(source.fetches(), 1);
        });
    }

    #[test]
    fn concurrent_misses_share_failures() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(200));
            source.available.store(false, Ordering::SeqCst);
            let cache = cache_for(&source, Duration::from_secs(3600), Arc::new(SilentListener));

            let (first, second) = tokio::join!(cache.resolve("acme"), cache.resolve("acme"));

            assert_eq!(source.fetches(), 1);
            assert!(first.unwrap_err().is_import());
            assert!(second.unwrap_err().is_import());
            assert!(cache.is_empty());

            cache.shutdown().await;
        });
    }

    #[test]
    fn exactly_one_refresher_runs_per_name() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(0));
            let cache = cache_for(&source, Duration::from_secs(3600), Arc::new(SilentListener));

            for _ in 0..5 {
                let _ = cache.resolve("acme").await.unwrap();
            }
            let _ = cache.resolve("acme/net").await.unwrap();

            assert_eq!(cache.refreshers().count(), 2);
            assert!(cache.refreshers().is_active("acme"));
            assert!(cache.refreshers().is_active("acme/net"));
            assert_eq!(cache.names(), vec!["acme".to_owned(), "acme/net".to_owned()]);

            cache.shutdown().await;
            assert_eq!(cache.refreshers().count(), 0);

            // Artifacts remain available after shutdown...
            assert!(cache.get("acme").is_some());
        });
    }

    #[test]
    fn unresolvable_names_are_not_cached() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(0));
            source.available.store(false, Ordering::SeqCst);
            let cache = cache_for(&source, Duration::from_secs(3600), Arc::new(SilentListener));

            let error = cache.resolve("alpha").await.unwrap_err();
            assert!(error.is_import());
            assert_eq!(error.name(), "alpha");
            assert!(cache.is_empty());
            assert!(cache.get("alpha").is_none());
            assert_eq!(cache.refreshers().count(), 0);

            // A later request retries...
            let _ = cache.resolve("alpha").await.unwrap_err();
            assert_eq!(source.fetches(), 2);

            // ...and succeeds once the sources are present.
            source.available.store(true, Ordering::SeqCst);
            let artifact = cache.resolve("alpha").await.unwrap();
            assert_eq!(artifact.payload().as_ref(), b"alpha:P1");
            assert_eq!(source.fetches(), 3);
            assert_eq!(cache.refreshers().count(), 1);

            cache.shutdown().await;
        });
    }

    #[test]
    fn unchanged_refreshes_keep_the_timestamp() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(0));
            let listener = Arc::new(CountingListener::default());
            let cache = cache_for(&source, Duration::from_millis(100), listener.clone());

            let first = cache.resolve("beta").await.unwrap();
            tokio::time::sleep(Duration::from_millis(450)).await;
            let second = cache.resolve("beta").await.unwrap();

            assert!(source.fetches() >= 3);
            assert!(listener.unchanged.load(Ordering::SeqCst) >= 2);
            assert_eq!(listener.changed.load(Ordering::SeqCst), 0);
            assert_eq!(first.payload(), second.payload());
            assert_eq!(first.created_at(), second.created_at());

            cache.shutdown().await;
        });
    }

    #[test]
    fn changed_refreshes_replace_the_artifact() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(0));
            let listener = Arc::new(CountingListener::default());
            let cache = cache_for(&source, Duration::from_millis(100), listener.clone());

            let first = cache.resolve("gamma").await.unwrap();
            assert_eq!(first.payload().as_ref(), b"gamma:P1");

            source.change("P2");
            tokio::time::sleep(Duration::from_millis(450)).await;

            let second = cache.resolve("gamma").await.unwrap();
            assert_eq!(second.payload().as_ref(), b"gamma:P2");
            assert!(second.created_at() > first.created_at());
            assert_eq!(listener.changed.load(Ordering::SeqCst), 1);

            cache.shutdown().await;
        });
    }

    #[test]
    fn failed_refreshes_keep_the_last_artifact() {
        crate::testing::test_async(async {
            let source = Source::new(Duration::from_millis(0));
            let listener = Arc::new(CountingListener::default());
            let cache = cache_for(&source, Duration::from_millis(100), listener.clone());

            let first = cache.resolve("delta").await.unwrap();

            source.broken.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(350)).await;

            let second = cache.resolve("delta").await.unwrap();
            assert!(listener.failed.load(Ordering::SeqCst) >= 2);
            assert_eq!(first, second);
            assert!(cache.refreshers().is_active("delta"));

            cache.shutdown().await;
        });
    }
}
