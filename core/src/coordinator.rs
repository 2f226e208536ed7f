//! Concurrent dashboard loading.
//!
//! # Overview
//! A [`Coordinator`] runs a set of named [`Descriptor`]s concurrently, each
//! under its own deadline, and merges their outcomes into a
//! [`DashboardResult`]. Four policies are available:
//!
//! - [`Coordinator::wait_all`]: wait for every descriptor, collect failures.
//! - [`Coordinator::wait_all_strict`]: fail with the first error.
//! - [`Coordinator::cancel_on_unauthorized`]: a critical descriptor failing
//!   with 401 cancels everything still running.
//! - [`Coordinator::prioritized`]: hand back the result as soon as every
//!   critical descriptor has settled; secondaries keep merging in the
//!   background.
//!
//! # Design
//! Each descriptor becomes one task in a `JoinSet`. Tasks race their
//! operation against a shared `CancellationToken`, so cancellation is
//! observed at the next suspension point. Tasks only return their outcome;
//! the coordinator is the single writer of the result. Dropping the
//! coordinating future drops the `JoinSet`, which aborts every task.
//!
//! An optional outer deadline wraps the whole call. Per-descriptor deadlines
//! still apply inside it, so the stricter of the two wins for any task.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ErrorKind};
use crate::timeout::with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Must settle before a partial result is released. Also marks the
    /// descriptors whose 401 triggers cancellation.
    Critical,
    Secondary,
}

type Operation<T> = Box<dyn FnOnce(Duration) -> BoxFuture<'static, Result<T, ApiError>> + Send>;

/// One named request in a dashboard load.
///
/// The operation receives the descriptor's deadline so it can forward it to
/// the transport.
pub struct Descriptor<T> {
    name: String,
    priority: Priority,
    timeout: Duration,
    operation: Operation<T>,
}

impl<T> Descriptor<T> {
    pub fn new<F, Fut>(name: impl Into<String>, timeout: Duration, operation: F) -> Self
    where
        F: FnOnce(Duration) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority: Priority::Secondary,
            timeout,
            operation: Box::new(move |deadline| operation(deadline).boxed()),
        }
    }

    pub fn critical<F, Fut>(name: impl Into<String>, timeout: Duration, operation: F) -> Self
    where
        F: FnOnce(Duration) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self::new(name, timeout, operation).with_priority(Priority::Critical)
    }

    pub fn secondary<F, Fut>(name: impl Into<String>, timeout: Duration, operation: F) -> Self
    where
        F: FnOnce(Duration) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self::new(name, timeout, operation)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A failed or cancelled descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub name: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DashboardResult<T> {
    pub data: BTreeMap<String, T>,
    /// In the order the failures were recorded.
    pub errors: Vec<TaskFailure>,
    /// Set exactly once, when the last critical descriptor settles.
    pub critical_complete: bool,
    pub cancelled_by_auth: bool,
    /// Names in the order their outcome was recorded.
    pub completion_order: Vec<String>,
    /// Time from launch until `critical_complete` was set.
    pub critical_elapsed: Option<Duration>,
    submitted: Vec<String>,
}

impl<T> DashboardResult<T> {
    fn new(submitted: Vec<String>) -> Self {
        Self {
            data: BTreeMap::new(),
            errors: Vec::new(),
            critical_complete: false,
            cancelled_by_auth: false,
            completion_order: Vec::new(),
            critical_elapsed: None,
            submitted,
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.data.get(name)
    }

    pub fn error(&self, name: &str) -> Option<&TaskFailure> {
        self.errors.iter().find(|f| f.name == name)
    }

    /// `None` for names that were never submitted.
    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        if !self.submitted.iter().any(|n| n == name) {
            return None;
        }
        Some(if self.data.contains_key(name) {
            TaskStatus::Succeeded
        } else {
            match self.error(name) {
                Some(f) if f.kind == ErrorKind::Cancelled => TaskStatus::Cancelled,
                Some(_) => TaskStatus::Failed,
                None => TaskStatus::Pending,
            }
        })
    }

    /// Names submitted to this load, in submission order.
    pub fn names(&self) -> &[String] {
        &self.submitted
    }

    /// True once every descriptor has settled.
    pub fn is_settled(&self) -> bool {
        self.completion_order.len() == self.submitted.len()
    }
}

/// Which policy [`Coordinator::load_dashboard`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    WaitAll,
    WaitAllStrict,
    CancelOnUnauthorized,
    Prioritized,
}

pub enum DashboardLoad<T> {
    Complete(DashboardResult<T>),
    Partial(PartialDashboard<T>),
}

impl<T: Clone + Send + Sync + 'static> DashboardLoad<T> {
    /// Wait for every descriptor regardless of mode.
    pub async fn finish(self) -> Result<DashboardResult<T>, ApiError> {
        match self {
            DashboardLoad::Complete(result) => Ok(result),
            DashboardLoad::Partial(partial) => partial.finish().await,
        }
    }
}

/// A result released at critical completion, still receiving secondaries.
///
/// Dropping it cancels the secondaries that are still running.
pub struct PartialDashboard<T> {
    updates: watch::Receiver<DashboardResult<T>>,
    background: JoinHandle<DashboardResult<T>>,
    token: CancellationToken,
    guard: DropGuard,
}

impl<T: Clone + Send + Sync + 'static> PartialDashboard<T> {
    /// Snapshot of everything merged so far.
    pub fn current(&self) -> DashboardResult<T> {
        self.updates.borrow().clone()
    }

    /// Wait for the next merge. Returns `false` once no more will arrive.
    pub async fn changed(&mut self) -> bool {
        self.updates.changed().await.is_ok()
    }

    /// Wait for the secondaries and return the final result.
    pub async fn finish(self) -> Result<DashboardResult<T>, ApiError> {
        let PartialDashboard {
            background, guard, ..
        } = self;
        let joined = background.await;
        drop(guard);
        resume_or(joined)
    }

    /// Cancel the secondaries and return the result with them marked
    /// cancelled.
    pub async fn abandon(self) -> Result<DashboardResult<T>, ApiError> {
        self.token.cancel();
        self.finish().await
    }
}

/// Runs dashboard loads. Holds only the optional outer deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coordinator {
    deadline: Option<Duration>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole coordinating call.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Dispatch on `mode`. Every mode but `Prioritized` returns
    /// [`DashboardLoad::Complete`].
    ///
    /// # Errors
    /// `DuplicateDescriptor` if two descriptors share a name; nothing is
    /// launched in that case.
    pub async fn load_dashboard<T>(
        &self,
        descriptors: Vec<Descriptor<T>>,
        mode: LoadMode,
    ) -> Result<DashboardLoad<T>, ApiError>
    where
        T: Clone + Send + Sync + 'static,
    {
        match mode {
            LoadMode::WaitAll => self.wait_all(descriptors).await.map(DashboardLoad::Complete),
            LoadMode::WaitAllStrict => self
                .wait_all_strict(descriptors)
                .await
                .map(DashboardLoad::Complete),
            LoadMode::CancelOnUnauthorized => self
                .cancel_on_unauthorized(descriptors)
                .await
                .map(DashboardLoad::Complete),
            LoadMode::Prioritized => self.prioritized(descriptors).await.map(DashboardLoad::Partial),
        }
    }

    /// Wait until every descriptor has settled. Individual failures are
    /// recorded, never returned.
    pub async fn wait_all<T: Send + 'static>(
        &self,
        descriptors: Vec<Descriptor<T>>,
    ) -> Result<DashboardResult<T>, ApiError> {
        self.bounded(async move {
            let (mut set, mut collector) = launch(descriptors, &CancellationToken::new())?;
            while let Some(joined) = set.join_next().await {
                if let Some((index, outcome)) = settle(joined) {
                    collector.record(index, outcome);
                }
            }
            Ok(collector.result)
        })
        .await
    }

    /// Like `wait_all`, but the first failure is returned as the error and
    /// the remaining tasks are aborted.
    pub async fn wait_all_strict<T: Send + 'static>(
        &self,
        descriptors: Vec<Descriptor<T>>,
    ) -> Result<DashboardResult<T>, ApiError> {
        self.bounded(async move {
            let (mut set, mut collector) = launch(descriptors, &CancellationToken::new())?;
            while let Some(joined) = set.join_next().await {
                let Some((index, outcome)) = settle(joined) else {
                    continue;
                };
                match outcome {
                    Err(err) => {
                        warn!(name = %collector.meta[index].name, error = %err, "strict load failed");
                        return Err(err);
                    }
                    ok => collector.record(index, ok),
                }
            }
            Ok(collector.result)
        })
        .await
    }

    /// Like `wait_all`, except a critical descriptor failing with
    /// `Unauthorized` cancels every task still running. Those are recorded as
    /// `Cancelled` unless they had already succeeded.
    pub async fn cancel_on_unauthorized<T: Send + 'static>(
        &self,
        descriptors: Vec<Descriptor<T>>,
    ) -> Result<DashboardResult<T>, ApiError> {
        self.bounded(async move {
            let token = CancellationToken::new();
            let (mut set, mut collector) = launch(descriptors, &token)?;
            while let Some(joined) = set.join_next().await {
                let Some((index, outcome)) = settle(joined) else {
                    continue;
                };
                let triggers = !token.is_cancelled()
                    && collector.meta[index].priority == Priority::Critical
                    && matches!(outcome, Err(ApiError::Unauthorized));
                collector.record(index, outcome);
                if triggers {
                    warn!(
                        name = %collector.meta[index].name,
                        pending = set.len(),
                        "unauthorized on critical request, cancelling the rest"
                    );
                    collector.result.cancelled_by_auth = true;
                    token.cancel();
                }
            }
            Ok(collector.result)
        })
        .await
    }

    /// Return as soon as every critical descriptor has settled.
    ///
    /// The outer deadline, if any, bounds only the wait for critical
    /// completion. Secondaries keep running and merge into the
    /// [`PartialDashboard`] as they finish.
    pub async fn prioritized<T>(
        &self,
        descriptors: Vec<Descriptor<T>>,
    ) -> Result<PartialDashboard<T>, ApiError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let (mut set, mut collector) = launch(descriptors, &token)?;
        let (tx, mut updates) = watch::channel(collector.result.clone());

        let background = tokio::spawn(async move {
            while let Some(joined) = set.join_next().await {
                if let Some((index, outcome)) = settle(joined) {
                    collector.record(index, outcome);
                    tx.send_replace(collector.result.clone());
                }
            }
            collector.result
        });
        let partial_guard = token.clone().drop_guard();

        self.bounded(async {
            updates
                .wait_for(|r| r.critical_complete)
                .await
                .map(|_| ())
                .map_err(|_| ApiError::Cancelled)
        })
        .await?;

        Ok(PartialDashboard {
            updates,
            background,
            token,
            guard: partial_guard,
        })
    }

    async fn bounded<R, F>(&self, work: F) -> Result<R, ApiError>
    where
        F: Future<Output = Result<R, ApiError>>,
    {
        match self.deadline {
            Some(deadline) => with_timeout("dashboard", deadline, work).await,
            None => work.await,
        }
    }
}

struct TaskMeta {
    name: String,
    priority: Priority,
}

struct Collector<T> {
    meta: Vec<TaskMeta>,
    result: DashboardResult<T>,
    critical_pending: usize,
    started: Instant,
}

impl<T> Collector<T> {
    fn record(&mut self, index: usize, outcome: Result<T, ApiError>) {
        let meta = &self.meta[index];
        match outcome {
            Ok(value) => {
                debug!(name = %meta.name, "settled");
                self.result.data.insert(meta.name.clone(), value);
            }
            Err(err) => {
                debug!(name = %meta.name, kind = %err.kind(), error = %err, "failed");
                self.result.errors.push(TaskFailure {
                    name: meta.name.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
        self.result.completion_order.push(meta.name.clone());

        if meta.priority == Priority::Critical {
            self.critical_pending -= 1;
            if self.critical_pending == 0 {
                self.mark_critical_complete();
            }
        }
    }

    fn mark_critical_complete(&mut self) {
        if self.result.critical_complete {
            return;
        }
        let elapsed = self.started.elapsed();
        self.result.critical_complete = true;
        self.result.critical_elapsed = Some(elapsed);
        info!(elapsed_ms = elapsed.as_millis() as u64, "critical requests complete");
    }
}

/// Spawn one task per descriptor.
fn launch<T: Send + 'static>(
    descriptors: Vec<Descriptor<T>>,
    token: &CancellationToken,
) -> Result<(JoinSet<(usize, Result<T, ApiError>)>, Collector<T>), ApiError> {
    let mut seen = HashSet::new();
    for d in &descriptors {
        if !seen.insert(d.name.as_str()) {
            return Err(ApiError::DuplicateDescriptor(d.name.clone()));
        }
    }

    let started = Instant::now();
    let mut set = JoinSet::new();
    let mut meta = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.into_iter().enumerate() {
        let Descriptor {
            name,
            priority,
            timeout,
            operation,
        } = descriptor;
        meta.push(TaskMeta {
            name: name.clone(),
            priority,
        });
        let token = token.clone();
        set.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::Cancelled),
                result = with_timeout(&name, timeout, operation(timeout)) => result,
            };
            (index, outcome)
        });
    }

    let critical_pending = meta.iter().filter(|m| m.priority == Priority::Critical).count();
    let mut collector = Collector {
        result: DashboardResult::new(meta.iter().map(|m| m.name.clone()).collect()),
        meta,
        critical_pending,
        started,
    };
    if critical_pending == 0 {
        collector.mark_critical_complete();
    }
    Ok((set, collector))
}

/// Unwrap a joined task. Panics inside a descriptor are re-raised; aborted
/// tasks (only possible during shutdown) are skipped.
fn settle<R>(joined: Result<R, JoinError>) -> Option<R> {
    match joined {
        Ok(value) => Some(value),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => None,
    }
}

fn resume_or<R>(joined: Result<R, JoinError>) -> Result<R, ApiError> {
    settle(joined).ok_or(ApiError::Cancelled)
}
