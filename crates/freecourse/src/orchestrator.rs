//! Concurrent multi-site scrape orchestration.
//!
//! Every requested site gets its own orchestration future, driven from a
//! `JoinSet`. Each attempt spawns the site's worker on a fresh
//! [`SiteTask`](crate::SiteTask) and waits on the task's watch channel:
//! first for discovery (bounded by the start window), then for a terminal
//! flag (bounded by the finish window). Failed attempts are retried with a
//! fixed backoff; a site that exhausts its attempts contributes nothing and
//! the run carries on.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::progress::{ProgressSink, TracingProgress};
use crate::task::{site_task, Discovery, SiteTask, SiteTaskWriter};
use crate::types::{AttemptError, CourseRecord, SiteId, WorkerError};

/// Scrapes one site, publishing discovery and progress into `task`.
///
/// Implementations report the course count with
/// [`SiteTaskWriter::discovered`] (or [`SiteTaskWriter::discovery_failed`]),
/// then [`tick`](SiteTaskWriter::tick) per processed item and
/// [`push`](SiteTaskWriter::push) each course found. Returning `Ok` marks
/// the task done; returning `Err` marks it errored.
#[async_trait]
pub trait SiteWorker: Send + Sync {
    async fn scrape(&self, site: &SiteId, task: &SiteTaskWriter) -> Result<(), WorkerError>;
}

/// Orchestrator tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// How long a worker may take to report its course count.
    pub start_timeout_secs: u64,
    /// How long a worker may take to finish after discovery.
    pub finish_timeout_secs: u64,
    /// Total attempts per site, including the first.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_backoff_ms: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: 60,
            finish_timeout_secs: 60,
            max_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ScrapeConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_secs(self.finish_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Configured attempts, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// How a site's attempt sequence settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteOutcome {
    Completed,
    Exhausted { last_error: AttemptError },
    Cancelled,
}

/// Final contribution of one site.
#[derive(Debug, Clone)]
pub struct SiteResult {
    pub site: SiteId,
    pub items: Vec<CourseRecord>,
    pub attempts: u32,
    pub outcome: SiteOutcome,
}

impl SiteResult {
    fn cancelled(site: SiteId) -> Self {
        Self {
            site,
            items: Vec::new(),
            attempts: 0,
            outcome: SiteOutcome::Cancelled,
        }
    }

    fn crashed(site: SiteId, error: &JoinError) -> Self {
        Self {
            site,
            items: Vec::new(),
            attempts: 0,
            outcome: SiteOutcome::Exhausted {
                last_error: AttemptError::WorkerException(error.to_string()),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == SiteOutcome::Completed
    }
}

/// Aggregated scrape output, one entry per requested site in request order.
#[derive(Debug, Clone, Default)]
pub struct ScrapeResults {
    sites: Vec<SiteResult>,
}

impl ScrapeResults {
    /// Result for `site`, if it was requested.
    pub fn get(&self, site: &SiteId) -> Option<&SiteResult> {
        self.sites.iter().find(|r| &r.site == site)
    }

    /// Courses contributed by `site`; empty for failed or unknown sites.
    pub fn courses(&self, site: &SiteId) -> &[CourseRecord] {
        self.get(site).map(|r| r.items.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteResult> {
        self.sites.iter()
    }

    /// Site identifiers in request order.
    pub fn sites(&self) -> impl Iterator<Item = &SiteId> {
        self.sites.iter().map(|r| &r.site)
    }

    /// Every course from every site, in site order then item order.
    pub fn all_courses(&self) -> impl Iterator<Item = &CourseRecord> {
        self.sites.iter().flat_map(|r| r.items.iter())
    }

    /// Like [`all_courses`](Self::all_courses), keeping only the first
    /// listing of each course URL.
    pub fn unique_courses(&self) -> impl Iterator<Item = &CourseRecord> {
        let mut seen = HashSet::new();
        self.all_courses().filter(move |c| seen.insert(c.url.as_str()))
    }

    pub fn total_courses(&self) -> usize {
        self.sites.iter().map(|r| r.items.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Plain `site -> courses` mapping in request order.
    pub fn into_map(self) -> Vec<(SiteId, Vec<CourseRecord>)> {
        self.sites.into_iter().map(|r| (r.site, r.items)).collect()
    }
}

/// Runs one worker per site concurrently and aggregates their courses.
pub struct ScrapeOrchestrator {
    worker: Arc<dyn SiteWorker>,
    progress: Arc<dyn ProgressSink>,
    config: ScrapeConfig,
}

impl ScrapeOrchestrator {
    pub fn new(worker: Arc<dyn SiteWorker>, config: ScrapeConfig) -> Self {
        Self {
            worker,
            progress: Arc::new(TracingProgress),
            config,
        }
    }

    /// Replace the default tracing progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Scrape every site to completion or exhaustion.
    pub async fn run(&self, sites: &[SiteId]) -> ScrapeResults {
        self.run_until(sites, std::future::pending()).await
    }

    /// Scrape every site, abandoning whatever is still in flight once
    /// `shutdown` resolves. Sites that finished before then keep their items.
    pub async fn run_until<F>(&self, sites: &[SiteId], shutdown: F) -> ScrapeResults
    where
        F: Future<Output = ()>,
    {
        tracing::info!(sites = sites.len(), "starting scrape");

        let mut slots: Vec<Option<SiteResult>> = sites.iter().map(|_| None).collect();
        let mut running = JoinSet::new();
        for (index, site) in sites.iter().enumerate() {
            let run = SiteRun {
                site: site.clone(),
                worker: Arc::clone(&self.worker),
                progress: Arc::clone(&self.progress),
                config: self.config.clone(),
            };
            running.spawn(async move {
                let mut site_run = AbortOnDrop(tokio::spawn(run.run()));
                (index, (&mut site_run.0).await)
            });
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                joined = running.join_next() => match joined {
                    Some(Ok((index, Ok(result)))) => slots[index] = Some(result),
                    Some(Ok((index, Err(e)))) => {
                        tracing::error!(site = %sites[index], "site orchestration failed: {e}");
                        slots[index] = Some(SiteResult::crashed(sites[index].clone(), &e));
                    }
                    Some(Err(e)) => tracing::error!("site orchestration task failed: {e}"),
                    None => break,
                },
                () = &mut shutdown => {
                    tracing::warn!(in_flight = running.len(), "scrape interrupted, abandoning in-flight sites");
                    running.abort_all();
                    break;
                }
            }
        }

        let sites: Vec<SiteResult> = sites
            .iter()
            .zip(slots)
            .map(|(site, slot)| slot.unwrap_or_else(|| SiteResult::cancelled(site.clone())))
            .collect();

        let results = ScrapeResults { sites };
        tracing::info!(
            courses = results.total_courses(),
            completed = results.iter().filter(|r| r.is_completed()).count(),
            sites = results.len(),
            "scrape finished"
        );
        results
    }
}

/// Aborts the wrapped worker when an attempt is abandoned.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct SiteRun {
    site: SiteId,
    worker: Arc<dyn SiteWorker>,
    progress: Arc<dyn ProgressSink>,
    config: ScrapeConfig,
}

impl SiteRun {
    async fn run(self) -> SiteResult {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 1;
        loop {
            match self.attempt().await {
                Ok(items) => {
                    tracing::debug!(site = %self.site, attempt, courses = items.len(), "site scraped");
                    self.progress.site_finished(&self.site, items.len(), attempt);
                    return SiteResult {
                        site: self.site,
                        items,
                        attempts: attempt,
                        outcome: SiteOutcome::Completed,
                    };
                }
                Err(error) => {
                    tracing::warn!(site = %self.site, attempt, max_attempts, %error, "scrape attempt failed");
                    self.progress.attempt_failed(&self.site, attempt, max_attempts, &error);

                    if attempt >= max_attempts {
                        tracing::warn!(site = %self.site, "giving up on site, continuing without it");
                        self.progress.site_finished(&self.site, 0, attempt);
                        return SiteResult {
                            site: self.site,
                            items: Vec::new(),
                            attempts: attempt,
                            outcome: SiteOutcome::Exhausted { last_error: error },
                        };
                    }

                    tokio::time::sleep(self.config.retry_backoff()).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self) -> Result<Vec<CourseRecord>, AttemptError> {
        let (writer, mut task) = site_task(self.site.clone());
        let _worker = AbortOnDrop(tokio::spawn(launch(
            Arc::clone(&self.worker),
            self.site.clone(),
            writer,
        )));

        let start_timeout = self.config.start_timeout();
        let discovery = match tokio::time::timeout(
            start_timeout,
            task.wait_for(|t| t.expected != Discovery::Pending),
        )
        .await
        {
            Err(_) => return Err(AttemptError::StartTimeout(start_timeout)),
            Ok(Err(_)) => return Err(worker_vanished()),
            Ok(Ok(state)) => state.expected,
        };

        // Partial items of a failed discovery are discarded with the task.
        if discovery == Discovery::Failed {
            return Err(AttemptError::DiscoveryFailure(error_message(&task.borrow())));
        }

        let finish_timeout = self.config.finish_timeout();
        // `None` when the window is too large to represent: wait unbounded.
        let deadline = Instant::now().checked_add(finish_timeout);
        loop {
            let (completed, total, terminal) = {
                let state = task.borrow_and_update();
                (state.completed, state.total(), state.is_terminal())
            };
            self.progress.update(&self.site, completed, total);
            if terminal {
                break;
            }
            let changed = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, task.changed()).await,
                None => Ok(task.changed().await),
            };
            match changed {
                Err(_) => return Err(AttemptError::FinishTimeout(finish_timeout)),
                Ok(Err(_)) => return Err(worker_vanished()),
                Ok(Ok(())) => {}
            }
        }

        collect(&self.site, &task, self.progress.as_ref())
    }
}

async fn launch(worker: Arc<dyn SiteWorker>, site: SiteId, task: SiteTaskWriter) {
    match worker.scrape(&site, &task).await {
        Ok(()) => {
            task.finish();
        }
        Err(e) => {
            tracing::debug!(%site, error = %e, "worker returned an error");
            task.fail(e.to_string());
        }
    }
}

fn collect(
    site: &SiteId,
    task: &watch::Receiver<SiteTask>,
    progress: &dyn ProgressSink,
) -> Result<Vec<CourseRecord>, AttemptError> {
    let state = task.borrow();
    if state.errored {
        return Err(AttemptError::WorkerException(error_message(&state)));
    }
    let total = state.total();
    progress.update(site, total, total);
    Ok(state.items.clone())
}

fn error_message(state: &SiteTask) -> String {
    state
        .error
        .clone()
        .unwrap_or_else(|| format!("error in {}", state.site))
}

fn worker_vanished() -> AttemptError {
    AttemptError::WorkerException("worker exited without reporting a result".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    struct Fixed(usize);

    #[async_trait]
    impl SiteWorker for Fixed {
        async fn scrape(&self, site: &SiteId, task: &SiteTaskWriter) -> Result<(), WorkerError> {
            task.discovered(self.0 as u64);
            for n in 0..self.0 {
                task.push(CourseRecord::new(site.clone(), format!("c{n}"), format!("https://c.test/{n}")));
                task.tick();
            }
            Ok(())
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.start_timeout(), Duration::from_secs(60));
        assert_eq!(config.finish_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.retry_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_partial_json_keeps_defaults() {
        let config: ScrapeConfig = serde_json::from_str(r#"{"max_attempts": 0}"#).unwrap();
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.start_timeout_secs, 60);
    }

    #[tokio::test]
    async fn test_empty_site_list() {
        let orchestrator = ScrapeOrchestrator::new(Arc::new(Fixed(1)), ScrapeConfig::default())
            .with_progress(Arc::new(NoProgress));
        let results = orchestrator.run(&[]).await;
        assert!(results.is_empty());
        assert_eq!(results.total_courses(), 0);
    }

    #[tokio::test]
    async fn test_results_lookup_helpers() {
        let orchestrator = ScrapeOrchestrator::new(Arc::new(Fixed(2)), ScrapeConfig::default())
            .with_progress(Arc::new(NoProgress));
        let sites = vec![SiteId::from("a"), SiteId::from("b")];
        let results = orchestrator.run(&sites).await;

        assert_eq!(results.sites().collect::<Vec<_>>(), vec![&sites[0], &sites[1]]);
        assert_eq!(results.courses(&sites[1]).len(), 2);
        assert!(results.courses(&SiteId::from("missing")).is_empty());
        assert_eq!(results.all_courses().count(), 4);

        let map = results.into_map();
        assert_eq!(map[0].0, sites[0]);
        assert_eq!(map[0].1[0].site, sites[0]);
    }

    #[tokio::test]
    async fn test_unique_courses_keeps_first_listing() {
        let orchestrator = ScrapeOrchestrator::new(Arc::new(Fixed(2)), ScrapeConfig::default())
            .with_progress(Arc::new(NoProgress));
        let sites = vec![SiteId::from("a"), SiteId::from("b")];
        let results = orchestrator.run(&sites).await;

        let unique: Vec<_> = results.unique_courses().collect();
        assert_eq!(results.total_courses(), 4);
        assert_eq!(unique.len(), 2);
        assert!(unique.iter().all(|c| c.site == sites[0]));
    }
}
