//! Keeps cached artifacts up to date by periodically re-rendering them in the background.
//!
//! Each cached name is watched by exactly one [Refresher](Refresher). All of them are supervised
//! by a [Refreshers](Refreshers) task set, which is keyed by name and permits to stop all tasks
//! at once. A refresher sleeps for the configured interval, re-runs fetch and render without
//! holding any lock and then only replaces the cached artifact if the rendered bytes actually
//! differ. Therefore the **created_at** timestamp (which is reported as **Last-Modified**) only
//! moves if the contents changed.
//!
//! Failures are skipped and simply retried in the next cycle. The previously rendered artifact
//! remains in place. The outcome of each cycle is reported to a
//! [RefreshListener](RefreshListener) which does nothing by default.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::Store;
use crate::error::DocError;
use crate::fetch::Fetcher;

/// Receives the outcome of each refresh cycle.
///
/// All methods default to a no-op so that implementors only need to override what they are
/// interested in.
pub trait RefreshListener: Send + Sync {
    /// Invoked once a refresh cycle rendered the given name successfully.
    ///
    /// **changed** indicates whether the cached artifact has been replaced.
    fn refreshed(&self, _name: &str, _changed: bool) {}

    /// Invoked if a refresh cycle failed. The cached artifact is kept as is.
    fn refresh_failed(&self, _name: &str, _error: &DocError) {}
}

/// Ignores all refresh outcomes.
#[derive(Default)]
pub struct SilentListener;

impl RefreshListener for SilentListener {}

/// Reports all refresh outcomes to the log.
#[derive(Default)]
pub struct LogListener;

impl RefreshListener for LogListener {
    fn refreshed(&self, name: &str, changed: bool) {
        if changed {
            log::info!("Documentation of '{}' has changed and was replaced.", name);
        } else {
            log::debug!("Documentation of '{}' is unchanged.", name);
        }
    }

    fn refresh_failed(&self, name: &str, error: &DocError) {
        log::warn!("Failed to refresh the documentation of '{}': {}", name, error);
    }
}

struct Task {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// A set of background tasks with at most one task per name.
///
/// Each task receives its own [CancellationToken] which is a child of a set wide token. Once
/// [shutdown](Refreshers::shutdown) is invoked, all tasks are cancelled and no new ones are
/// accepted.
#[derive(Default)]
pub struct Refreshers {
    tasks: Mutex<HashMap<String, Task>>,
    shutdown: CancellationToken,
}

impl Refreshers {
    /// Creates a new and empty task set.
    pub fn new() -> Self {
        Refreshers::default()
    }

    /// Starts the task created by the given factory for the given name.
    ///
    /// Returns **false** if there is already a task for this name (in which case the factory isn't
    /// invoked at all) or if the set has already been shut down.
    ///
    /// Note that this has to be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, name: &str, factory: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shutdown.is_cancelled() || tasks.contains_key(name) {
            return false;
        }

        let token = self.shutdown.child_token();
        let handle = tokio::spawn(factory(token.clone()));
        let _ = tasks.insert(name.to_owned(), Task { token, handle });

        true
    }

    /// Returns the number of tasks in this set.
    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Determines if a task for the given name is present and still running.
    pub fn is_active(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|task| !task.handle.is_finished() && !task.token.is_cancelled())
            .unwrap_or(false)
    }

    /// Cancels all tasks and waits until they have stopped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, task)| task.handle)
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(error) = result {
                log::error!("A refresh task terminated abnormally: {}", error);
            }
        }
    }
}

/// Periodically re-renders a single name and updates the cache if the output changed.
pub(crate) struct Refresher {
    pub(crate) name: String,
    pub(crate) fetcher: Fetcher,
    pub(crate) store: Arc<Store>,
    pub(crate) interval: Duration,
    pub(crate) listener: Arc<dyn RefreshListener>,
}

impl Refresher {
    /// Runs the refresh loop until the given token is cancelled.
    pub(crate) async fn run(self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            match self.fetcher.fetch_and_render_async(&self.name).await {
                Ok(artifact) => {
                    let changed = self.store.replace_if_changed(&self.name, artifact);
                    self.listener.refreshed(&self.name, changed);
                }
                Err(error) => self.listener.refresh_failed(&self.name, &error),
            }
        }
    }
}
