//! Fixed-size pool of execution contexts
//!
//! A context is checked out for a root task's whole subtree and handed back to
//! the idle list when the `PooledContext` is dropped. New contexts are only
//! opened while fewer than the pool size exist.

use crate::driver::{DriverFactory, PageDriver};
use crate::DriverResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Context {
    driver: Box<dyn PageDriver>,
    ready: bool,
}

struct Shared {
    idle: Mutex<Vec<Context>>,
    opened: AtomicUsize,
}

impl Shared {
    fn give_back(&self, context: Context) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context);
    }
}

/// Bounded set of driver contexts
pub struct ContextPool {
    factory: Arc<dyn DriverFactory>,
    semaphore: Arc<Semaphore>,
    shared: Arc<Shared>,
    root_url: String,
}

impl ContextPool {
    pub fn new(factory: Arc<dyn DriverFactory>, size: usize, root_url: impl Into<String>) -> Self {
        Self {
            factory,
            semaphore: Arc::new(Semaphore::new(size.max(1))),
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
            }),
            root_url: root_url.into(),
        }
    }

    /// Waits for a free slot and returns an idle context or a new one
    pub async fn acquire(&self) -> DriverResult<PooledContext> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| crate::DriverError::Closed)?;

        let idle = self
            .shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let context = match idle {
            Some(context) => context,
            None => {
                let driver = self.factory.open_context().await?;
                let total = self.shared.opened.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!("Opened execution context #{}", total);
                Context {
                    driver,
                    ready: false,
                }
            }
        };

        Ok(PooledContext {
            context: Some(context),
            shared: Arc::clone(&self.shared),
            root_url: self.root_url.clone(),
            _permit: permit,
        })
    }

    /// Number of contexts opened over the pool's lifetime
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn idle(&self) -> usize {
        self.shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A checked-out context; returns to the pool on drop
pub struct PooledContext {
    context: Option<Context>,
    shared: Arc<Shared>,
    root_url: String,
    _permit: OwnedSemaphorePermit,
}

impl PooledContext {
    fn inner(&mut self) -> DriverResult<&mut Context> {
        self.context.as_mut().ok_or(crate::DriverError::Closed)
    }

    /// Whether the context sits on the root listing with the panel open
    pub fn is_ready(&self) -> bool {
        self.context.as_ref().map_or(false, |c| c.ready)
    }

    /// Loads the root listing and opens the filter panel
    pub async fn prepare(&mut self) -> DriverResult<()> {
        let root_url = self.root_url.clone();
        let context = self.inner()?;
        context.ready = false;
        context.driver.navigate(&root_url).await?;
        context.driver.open_filter_panel().await?;
        context.ready = true;
        Ok(())
    }

    /// Forces `prepare` before the next use, e.g. after an abandoned call
    pub fn invalidate(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.ready = false;
        }
    }

    pub fn driver(&mut self) -> DriverResult<&mut (dyn PageDriver + 'static)> {
        Ok(self.inner()?.driver.as_mut())
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.shared.give_back(context);
        }
    }
}
