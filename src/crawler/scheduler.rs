//! Crawl scheduler: worker pool over an explicit task queue
//!
//! This module handles:
//! - Listing the first facet once and fanning its values out as root tasks
//! - A shared root queue consumed by a fixed number of workers
//! - Depth-first descent below each root on the worker's own context,
//!   driven by an explicit stack instead of recursion
//! - Retrying failed attempts and abandoning tasks whose budget is spent
//! - Writing a checkpoint after every completed task

use crate::catalog::{FacetCatalog, SelectionKey, Task};
use crate::checkpoint::Checkpointer;
use crate::collector::Collector;
use crate::config::ExtractAt;
use crate::crawler::explorer::list_values;
use crate::crawler::policy::RetryPolicy;
use crate::crawler::pool::{ContextPool, PooledContext};
use crate::state::TaskState;
use crate::CrawlError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

/// Counts gathered over one run
///
/// Task failures never fail the run; they only show up here and in the logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub tasks_succeeded: usize,
    /// Failed attempts that were retried
    pub retries: usize,
    pub tasks_abandoned: usize,
    /// Tasks skipped because their subtree finished in an earlier run
    pub tasks_skipped: usize,
    /// Extractions whose item count differed from the catalog's own count
    pub count_mismatches: usize,
    /// Items whose stable fields differed between sightings
    pub field_mismatches: usize,
    pub checkpoint_failures: usize,
    pub items: usize,
    pub associations: usize,
    /// True once every subtree finished without abandonment
    pub complete: bool,
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicUsize,
    retries: AtomicUsize,
    abandoned: AtomicUsize,
    skipped: AtomicUsize,
    count_mismatches: AtomicUsize,
    field_mismatches: AtomicUsize,
    checkpoint_failures: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// One entry on a worker's stack
enum Step {
    Run(Task),
    /// Pushed beneath a task's children; popped once they all ran
    Seal(SelectionKey),
}

/// Runs a crawl over a facet catalog
pub struct Scheduler {
    catalog: Arc<FacetCatalog>,
    pool: ContextPool,
    collector: Arc<Collector>,
    checkpointer: Arc<Checkpointer>,
    policy: RetryPolicy,
    extract_at: ExtractAt,
    workers: usize,
    /// Selection keys with an abandoned task somewhere beneath them
    dirty: Mutex<HashSet<SelectionKey>>,
    counters: Counters,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `catalog` - The facets to descend through, in order
    /// * `pool` - Execution contexts; its size bounds concurrency
    /// * `collector` - Shared item state (possibly restored from a checkpoint)
    /// * `checkpointer` - Where state is written after every task
    /// * `policy` - Retry budget and per-attempt timeout
    /// * `extract_at` - Which tasks extract items
    /// * `workers` - Number of workers consuming root tasks
    pub fn new(
        catalog: Arc<FacetCatalog>,
        pool: ContextPool,
        collector: Arc<Collector>,
        checkpointer: Arc<Checkpointer>,
        policy: RetryPolicy,
        extract_at: ExtractAt,
        workers: usize,
    ) -> Self {
        Self {
            catalog,
            pool,
            collector,
            checkpointer,
            policy,
            extract_at,
            workers: workers.max(1),
            dirty: Mutex::new(HashSet::new()),
            counters: Counters::default(),
        }
    }

    /// Runs every task reachable from the bootstrap task
    ///
    /// 1. The bootstrap task lists the first facet and yields the root tasks.
    /// 2. Root tasks go onto a shared queue drained by `workers` workers.
    /// 3. Each worker explores its root's subtree depth-first on one context.
    /// 4. Once all workers are done, the whole crawl is marked finished if
    ///    nothing was abandoned.
    pub async fn run(self: Arc<Self>) -> CrawlReport {
        let bootstrap = self.catalog.root_task();
        let bootstrap_key = bootstrap.selection().key();

        if self.collector.is_finished(&bootstrap_key) {
            tracing::info!("Checkpoint already covers the whole catalog, nothing to do");
            Counters::bump(&self.counters.skipped);
            return self.report();
        }

        let roots = match self.acquire(&bootstrap).await {
            Some(mut context) => self.execute(&mut context, &bootstrap).await,
            None => None,
        };
        let Some(roots) = roots else {
            return self.report();
        };

        tracing::info!(
            "Seeding {} root tasks for {} workers",
            roots.len(),
            self.workers
        );

        let (sender, receiver) = mpsc::unbounded_channel();
        for root in roots {
            // receiver is alive until the workers below finish
            let _ = sender.send(root);
        }
        drop(sender);

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let scheduler = Arc::clone(&self);
            let receiver = Arc::clone(&receiver);
            handles.push(tokio::spawn(async move {
                scheduler.worker(worker_id, receiver).await
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker panicked: {}", e);
                self.mark_dirty(&bootstrap_key);
            }
        }

        if self.seal(bootstrap_key) {
            tracing::info!("Every subtree finished");
            self.checkpoint();
        }
        self.report()
    }

    async fn worker(
        &self,
        worker_id: usize,
        queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>>,
    ) {
        loop {
            let next = {
                let mut queue = queue.lock().await;
                queue.recv().await
            };
            let Some(root) = next else {
                tracing::debug!("Worker {} found the root queue empty", worker_id);
                return;
            };

            if self.skip_if_finished(&root) {
                continue;
            }

            tracing::debug!("Worker {} takes root {}", worker_id, root.selection());
            if let Some(mut context) = self.acquire(&root).await {
                self.run_subtree(&mut context, root).await;
            }
        }
    }

    /// Explores `root` and everything below it on one context
    async fn run_subtree(&self, context: &mut PooledContext, root: Task) {
        let mut stack = vec![Step::Run(root)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Seal(key) => {
                    if self.seal(key) {
                        self.checkpoint();
                    }
                }
                Step::Run(task) => {
                    if self.skip_if_finished(&task) {
                        continue;
                    }
                    let Some(children) = self.execute(context, &task).await else {
                        continue;
                    };
                    stack.push(Step::Seal(task.selection().key()));
                    // reversed so the first listed value runs first
                    stack.extend(children.into_iter().rev().map(Step::Run));
                }
            }
        }
    }

    fn skip_if_finished(&self, task: &Task) -> bool {
        if !self.collector.is_finished(&task.selection().key()) {
            return false;
        }
        let mut state = TaskState::Pending;
        advance(&mut state, TaskState::Skipped, task);
        tracing::debug!(
            "Task {} {}: finished in an earlier run",
            task.selection(),
            state
        );
        Counters::bump(&self.counters.skipped);
        true
    }

    /// Checks out a context for `task`, retrying under the task's budget
    ///
    /// Abandons `task` once opening a context keeps failing.
    async fn acquire(&self, task: &Task) -> Option<PooledContext> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.pool.acquire().await {
                Ok(context) => return Some(context),
                Err(e) => CrawlError::from(e),
            };

            if self.policy.after_failure(attempt, &error) == TaskState::Retrying {
                Counters::bump(&self.counters.retries);
                tracing::warn!(
                    "Could not open an execution context for {} (attempt {}/{}): {}; retrying",
                    task.selection(),
                    attempt,
                    self.policy.max_attempts(),
                    error
                );
                continue;
            }

            tracing::error!(
                "Abandoning {}: no execution context after {} attempts: {}",
                task.selection(),
                attempt,
                error
            );
            self.abandon(task);
            self.checkpoint();
            return None;
        }
    }

    /// Runs one task until it succeeds or is abandoned
    ///
    /// Returns the child tasks on success and `None` once abandoned. A
    /// checkpoint is written either way.
    async fn execute(&self, context: &mut PooledContext, task: &Task) -> Option<Vec<Task>> {
        let mut state = TaskState::Pending;
        let mut attempt = 0;

        loop {
            attempt += 1;
            advance(&mut state, TaskState::Running, task);

            let result =
                match tokio::time::timeout(self.policy.timeout, self.attempt(context, task)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(CrawlError::Timeout {
                        path: task.selection().to_string(),
                        millis: self.policy.timeout.as_millis() as u64,
                    }),
                };

            match result {
                Ok(children) => {
                    advance(&mut state, TaskState::Succeeded, task);
                    Counters::bump(&self.counters.succeeded);
                    tracing::debug!(
                        "Finished {} with {} children",
                        task.selection(),
                        children.len()
                    );
                    self.checkpoint();
                    return Some(children);
                }
                Err(e) => {
                    // the context may be mid-navigation or showing an error page
                    context.invalidate();

                    advance(&mut state, self.policy.after_failure(attempt, &e), task);
                    if !state.is_terminal() {
                        Counters::bump(&self.counters.retries);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}; retrying",
                            attempt,
                            self.policy.max_attempts(),
                            task.selection(),
                            e
                        );
                        continue;
                    }

                    tracing::error!(
                        "Abandoning {} after {} attempts: {}",
                        task.selection(),
                        attempt,
                        e
                    );
                    self.abandon(task);
                    self.checkpoint();
                    return None;
                }
            }
        }
    }

    /// One attempt: reset, replay, extract, list the next facet
    async fn attempt(
        &self,
        context: &mut PooledContext,
        task: &Task,
    ) -> Result<Vec<Task>, CrawlError> {
        if !context.is_ready() {
            tracing::debug!("Recycling context before {}", task.selection());
            context.prepare().await?;
        }
        let driver = context.driver()?;

        driver.reset_filters().await?;
        for locator in task.selection().locators() {
            driver.apply_facet_value(locator).await?;
        }

        if self.extracts(task) {
            tracing::info!("Extracting products... {}", task.selection());
            let items = driver.extract_items().await?;
            let extracted = items.len();

            if let Ok(Some(reported)) = driver.reported_count().await {
                if reported != extracted {
                    tracing::warn!(
                        "{} reports {} products but {} were extracted",
                        task.selection(),
                        reported,
                        extracted
                    );
                    Counters::bump(&self.counters.count_mismatches);
                }
            }

            let report = self.collector.ingest(items, task.selection());
            self.counters
                .field_mismatches
                .fetch_add(report.mismatches.len(), Ordering::Relaxed);
            tracing::debug!(
                "{}: {} seen, {} new items, {} new associations",
                task.selection(),
                report.seen,
                report.new_items,
                report.new_associations
            );
        }

        let Some(next) = task.next_facet() else {
            return Ok(Vec::new());
        };
        let values = list_values(&*driver, &next.title).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| task.child(value))
            .collect())
    }

    fn extracts(&self, task: &Task) -> bool {
        if task.is_bootstrap() {
            return false;
        }
        match self.extract_at {
            ExtractAt::EveryLevel => true,
            ExtractAt::LeavesOnly => task.is_leaf(),
        }
    }

    /// Keeps `task` and all its ancestors out of the finished set
    fn abandon(&self, task: &Task) {
        Counters::bump(&self.counters.abandoned);
        for key in task.selection().prefix_keys() {
            self.mark_dirty(&key);
        }
    }

    fn mark_dirty(&self, key: &SelectionKey) {
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
    }

    /// Marks a subtree finished unless something beneath it was abandoned
    fn seal(&self, key: SelectionKey) -> bool {
        let dirty = self
            .dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key);
        !dirty && self.collector.mark_finished(key)
    }

    /// Writes the current state
    ///
    /// The store does blocking I/O; on a multi-threaded runtime the worker
    /// thread hands its other tasks off while the write runs.
    fn checkpoint(&self) {
        let save = || self.checkpointer.save(&self.collector);
        let result = match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(save),
            _ => save(),
        };
        if let Err(e) = result {
            Counters::bump(&self.counters.checkpoint_failures);
            tracing::warn!("Failed to write checkpoint: {}", e);
        }
    }

    fn report(&self) -> CrawlReport {
        let (items, associations, complete) = self.collector.read(|state| {
            (
                state.items().len(),
                state.associations().len(),
                state.is_finished(&Vec::new()),
            )
        });
        let c = &self.counters;
        CrawlReport {
            tasks_succeeded: c.succeeded.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            tasks_abandoned: c.abandoned.load(Ordering::Relaxed),
            tasks_skipped: c.skipped.load(Ordering::Relaxed),
            count_mismatches: c.count_mismatches.load(Ordering::Relaxed),
            field_mismatches: c.field_mismatches.load(Ordering::Relaxed),
            checkpoint_failures: c.checkpoint_failures.load(Ordering::Relaxed),
            items,
            associations,
            complete,
        }
    }
}

fn advance(state: &mut TaskState, to: TaskState, task: &Task) {
    match state.transition(to) {
        Ok(next) => *state = next,
        Err(e) => {
            tracing::error!("{} for {}", e, task.selection());
            *state = to;
        }
    }
}
