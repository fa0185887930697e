//! Shared connection and collection provisioning
//!
//! Both primitives hand every caller a clone of one `Shared` future, so the
//! underlying work runs once no matter how many callers await it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::{DbError, DbResult};
use crate::observability::{log_event, Event};

type ConnectFuture<C> = Shared<BoxFuture<'static, DbResult<Arc<C>>>>;
type ProvisionFuture = Shared<BoxFuture<'static, DbResult<()>>>;

/// A connection established once and shared by all operations
pub struct SharedConnection<C> {
    ready: ConnectFuture<C>,
}

impl<C> Clone for SharedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            ready: self.ready.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> SharedConnection<C> {
    /// Start connecting.
    ///
    /// The connect future is spawned on the current tokio runtime when there
    /// is one, otherwise it runs on first use. Exceeding `timeout` fails with
    /// `BackendUnavailable`.
    pub fn spawn<F>(backend: &'static str, timeout: Duration, connect: F) -> Self
    where
        F: Future<Output = DbResult<C>> + Send + 'static,
    {
        log_event(Event::ConnectBegin, &[("backend", backend)]);

        let ready = async move {
            match tokio::time::timeout(timeout, connect).await {
                Ok(Ok(conn)) => {
                    log_event(Event::ConnectReady, &[("backend", backend)]);
                    Ok(Arc::new(conn))
                }
                Ok(Err(e)) => {
                    log_event(
                        Event::ConnectFailed,
                        &[("backend", backend), ("error", &e.to_string())],
                    );
                    Err(e)
                }
                Err(_) => {
                    let ms = timeout.as_millis().to_string();
                    log_event(
                        Event::ConnectFailed,
                        &[("backend", backend), ("timeout_ms", &ms)],
                    );
                    Err(DbError::unavailable(format!(
                        "{} connection timed out after {}ms",
                        backend, ms
                    )))
                }
            }
        }
        .boxed()
        .shared();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(ready.clone());
        }

        Self { ready }
    }

    /// Wait for the shared connection
    pub async fn get(&self) -> DbResult<Arc<C>> {
        self.ready.clone().await
    }
}

/// Memoized per-collection provisioning
#[derive(Default)]
pub struct Provisioner {
    tasks: Mutex<HashMap<String, (u64, ProvisionFuture)>>,
    generation: AtomicU64,
}

impl Provisioner {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, (u64, ProvisionFuture)>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Provision `collection` once.
    ///
    /// The first caller's `make` builds the provisioning future; concurrent
    /// and later callers await the same one. A failure is evicted so the next
    /// call retries.
    pub async fn ensure<F, Fut>(&self, collection: &str, make: F) -> DbResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DbResult<()>> + Send + 'static,
    {
        let (generation, task) = {
            let mut tasks = self.tasks();
            if let Some((generation, task)) = tasks.get(collection) {
                (*generation, task.clone())
            } else {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let task = make().boxed().shared();
                tasks.insert(collection.to_string(), (generation, task.clone()));
                (generation, task)
            }
        };

        let result = task.await;
        if result.is_err() {
            let mut tasks = self.tasks();
            let current = tasks.get(collection).map(|(g, _)| *g);
            if current == Some(generation) {
                tasks.remove(collection);
            }
        }
        result
    }

    /// Wait for a collection that must already be provisioned
    pub async fn wait(&self, collection: &str) -> DbResult<()> {
        let task = self.tasks().get(collection).map(|(_, task)| task.clone());
        match task {
            Some(task) => task.await,
            None => Err(DbError::not_registered(format!(
                "collection '{}' was never provisioned",
                collection
            ))),
        }
    }

    /// Returns true if provisioning was requested for `collection`
    pub fn is_known(&self, collection: &str) -> bool {
        self.tasks().contains_key(collection)
    }
}
