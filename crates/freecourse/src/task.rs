//! Per-site status record shared between a worker and the orchestrator.
//!
//! A [`SiteTask`] is published through a `tokio::sync::watch` channel. The
//! worker owns the only [`SiteTaskWriter`]; the orchestrator holds the
//! receiver and only ever reads. Every mutation goes through
//! `send_if_modified`, so no-op calls (a second `finish`, a `push` after a
//! terminal flag) never wake the reader.

use serde::Serialize;
use tokio::sync::watch;

use crate::types::{CourseRecord, SiteId};

/// Discovery state of a site task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "total", rename_all = "snake_case")]
pub enum Discovery {
    /// The worker has not reported a course count yet.
    Pending,
    /// The worker will process this many items.
    Known(u64),
    /// The worker failed before it could count anything.
    Failed,
}

/// Snapshot of one site's scrape progress.
#[derive(Debug, Clone, Serialize)]
pub struct SiteTask {
    pub site: SiteId,
    pub expected: Discovery,
    pub completed: u64,
    pub done: bool,
    pub errored: bool,
    pub error: Option<String>,
    pub items: Vec<CourseRecord>,
}

impl SiteTask {
    /// A fresh task: nothing discovered, nothing completed.
    pub fn new(site: SiteId) -> Self {
        Self {
            site,
            expected: Discovery::Pending,
            completed: 0,
            done: false,
            errored: false,
            error: None,
            items: Vec::new(),
        }
    }

    /// True once either `done` or `errored` is set.
    pub fn is_terminal(&self) -> bool {
        self.done || self.errored
    }

    /// Known total, or zero while pending or failed.
    pub fn total(&self) -> u64 {
        match self.expected {
            Discovery::Known(total) => total,
            Discovery::Pending | Discovery::Failed => 0,
        }
    }
}

/// Create a fresh task for `site` and split it into writer and reader halves.
pub fn site_task(site: SiteId) -> (SiteTaskWriter, watch::Receiver<SiteTask>) {
    let (tx, rx) = watch::channel(SiteTask::new(site));
    (SiteTaskWriter { tx }, rx)
}

/// Write half of a [`SiteTask`]. Deliberately not `Clone`.
#[derive(Debug)]
pub struct SiteTaskWriter {
    tx: watch::Sender<SiteTask>,
}

impl SiteTaskWriter {
    /// The site this task belongs to.
    pub fn site(&self) -> SiteId {
        self.tx.borrow().site.clone()
    }

    /// Report how many items this worker is going to process.
    pub fn discovered(&self, total: u64) {
        self.tx.send_if_modified(|task| {
            if task.is_terminal() || task.expected != Discovery::Pending {
                return false;
            }
            task.expected = Discovery::Known(total);
            task.completed = task.completed.min(total);
            true
        });
    }

    /// Report that discovery failed. Marks the task as errored.
    pub fn discovery_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|task| {
            if task.is_terminal() {
                return false;
            }
            task.expected = Discovery::Failed;
            task.errored = true;
            task.error = Some(reason);
            true
        });
    }

    /// One more item processed.
    pub fn tick(&self) {
        self.advance(1);
    }

    /// `n` more items processed. Clamped to the discovered total.
    pub fn advance(&self, n: u64) {
        self.tx.send_if_modified(|task| {
            if task.is_terminal() || n == 0 {
                return false;
            }
            let next = task.completed.saturating_add(n);
            let next = match task.expected {
                Discovery::Known(total) => next.min(total),
                Discovery::Pending | Discovery::Failed => next,
            };
            if next == task.completed {
                return false;
            }
            task.completed = next;
            true
        });
    }

    /// Append a discovered course. Ignored once the task is terminal.
    pub fn push(&self, course: CourseRecord) {
        self.tx.send_if_modified(|task| {
            if task.is_terminal() {
                return false;
            }
            task.items.push(course);
            true
        });
    }

    /// Mark the task done. Returns false if it was already terminal.
    ///
    /// A task finished without ever reporting discovery is treated as having
    /// discovered exactly what it completed.
    pub fn finish(&self) -> bool {
        self.tx.send_if_modified(|task| {
            if task.is_terminal() {
                return false;
            }
            if task.expected == Discovery::Pending {
                task.expected = Discovery::Known(task.completed);
            }
            task.done = true;
            true
        })
    }

    /// Mark the task errored. Returns false if it was already terminal.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.tx.send_if_modified(|task| {
            if task.is_terminal() {
                return false;
            }
            if task.expected == Discovery::Pending {
                task.expected = Discovery::Failed;
            }
            task.errored = true;
            task.error = Some(reason);
            true
        })
    }

    /// Current state as seen by the writer.
    pub fn snapshot(&self) -> SiteTask {
        self.tx.borrow().clone()
    }
}
