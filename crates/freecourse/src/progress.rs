//! Progress reporting for scrape runs.
//!
//! The orchestrator calls a [`ProgressSink`] whenever it observes a change in
//! a site's task. Calls happen from many sites concurrently and may arrive
//! out of order or repeat, so sinks must be cheap, non-blocking and
//! idempotent per `(site, completed, total)` triple.

use crate::types::{AttemptError, SiteId};

/// Receives per-site progress and failure notifications.
pub trait ProgressSink: Send + Sync {
    /// `completed` out of `total` items processed for `site`.
    fn update(&self, site: &SiteId, completed: u64, total: u64);

    /// An attempt for `site` failed. `attempt` is 1-based.
    fn attempt_failed(&self, _site: &SiteId, _attempt: u32, _max_attempts: u32, _error: &AttemptError) {}

    /// `site` settled with `count` courses after `attempts` attempts.
    fn site_finished(&self, _site: &SiteId, _count: usize, _attempts: u32) {}
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _site: &SiteId, _completed: u64, _total: u64) {}
}

/// Forwards progress to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn update(&self, site: &SiteId, completed: u64, total: u64) {
        tracing::debug!(%site, completed, total, "scrape progress");
    }

    fn attempt_failed(&self, site: &SiteId, attempt: u32, max_attempts: u32, error: &AttemptError) {
        tracing::debug!(%site, attempt, max_attempts, %error, "scrape attempt failed");
    }

    fn site_finished(&self, site: &SiteId, count: usize, attempts: u32) {
        tracing::debug!(%site, count, attempts, "site settled");
    }
}
