//! Site worker reading a listing site's JSON course feed.
//!
//! A feed is either a bare array of entries or an object with a `courses`
//! array. Each entry needs a `title` and an absolute `url`; entries missing
//! either are counted as processed but produce no course.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use freecourse::{CourseRecord, Settings, SiteId, SiteTaskWriter, SiteWorker, WorkerError};

const USER_AGENT: &str = concat!("freecourse/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedBody {
    List(Vec<FeedEntry>),
    Wrapped { courses: Vec<FeedEntry> },
}

impl FeedBody {
    fn into_entries(self) -> Vec<FeedEntry> {
        match self {
            FeedBody::List(entries) | FeedBody::Wrapped { courses: entries } => entries,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default, alias = "coupon")]
    coupon_code: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl FeedEntry {
    fn into_course(self, site: &SiteId) -> Option<CourseRecord> {
        let title = self.title.trim();
        let url = self.url.trim();
        if title.is_empty() || !(url.starts_with("https://") || url.starts_with("http://")) {
            return None;
        }
        Some(CourseRecord {
            title: title.to_string(),
            url: url.to_string(),
            coupon_code: self.coupon_code.filter(|c| !c.is_empty()),
            language: self.language,
            category: self.category,
            site: site.clone(),
        })
    }
}

/// Scrapes every configured site from its JSON feed.
#[derive(Clone)]
pub struct FeedWorker {
    client: reqwest::Client,
    feeds: HashMap<SiteId, String>,
}

impl FeedWorker {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            feeds: HashMap::new(),
        }
    }

    /// Worker covering every site listed in the settings.
    pub fn from_settings(settings: &Settings) -> Self {
        settings.sites.iter().fold(
            Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            |worker, site| worker.with_feed(SiteId::new(site.name.as_str()), &site.feed_url),
        )
    }

    pub fn with_feed(mut self, site: SiteId, url: impl Into<String>) -> Self {
        self.feeds.insert(site, url.into());
        self
    }

    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, WorkerError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::Http(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WorkerError::Http(format!("{url} returned {status}")));
        }

        let body: FeedBody = resp
            .json()
            .await
            .map_err(|e| WorkerError::Parse(format!("{url}: {e}")))?;
        Ok(body.into_entries())
    }
}

#[async_trait]
impl SiteWorker for FeedWorker {
    async fn scrape(&self, site: &SiteId, task: &SiteTaskWriter) -> Result<(), WorkerError> {
        let Some(url) = self.feeds.get(site) else {
            let error = WorkerError::Other(format!("no feed configured for {site}"));
            task.discovery_failed(error.to_string());
            return Err(error);
        };

        let entries = match self.fetch(url).await {
            Ok(entries) => entries,
            Err(e) => {
                task.discovery_failed(e.to_string());
                return Err(e);
            }
        };

        tracing::debug!(%site, entries = entries.len(), "feed fetched");
        task.discovered(entries.len() as u64);
        for entry in entries {
            match entry.into_course(site) {
                Some(course) => task.push(course),
                None => tracing::debug!(%site, "skipping malformed feed entry"),
            }
            task.tick();
        }
        Ok(())
    }
}
