//! Core data types and error taxonomy shared by every freecourse component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one configured listing site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for SiteId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A free course offer discovered on a listing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub site: SiteId,
}

impl CourseRecord {
    /// Create a record with only the required fields set.
    pub fn new(site: SiteId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            coupon_code: None,
            language: None,
            category: None,
            site,
        }
    }
}

/// Why a single scrape attempt for one site failed.
///
/// These never escape the orchestrator: they are recovered by the per-site
/// retry loop and only surface as warnings and in [`crate::SiteOutcome`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("worker did not report a course count within {0:?}")]
    StartTimeout(std::time::Duration),

    #[error("worker did not finish within {0:?}")]
    FinishTimeout(std::time::Duration),

    #[error("discovery failed: {0}")]
    DiscoveryFailure(String),

    #[error("worker failed: {0}")]
    WorkerException(String),
}

/// Error returned by a [`crate::SiteWorker`] implementation.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while establishing an authenticated session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The credential source was rejected. Recoverable by demotion.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The operator aborted the interactive prompt.
    #[error("Login cancelled by operator")]
    Cancelled,

    #[error("Login failed after {attempts} interactive attempts")]
    Exhausted { attempts: u32 },

    #[error("Login error: {0}")]
    Fatal(String),
}

impl LoginError {
    /// Whether the coordinator may recover by dropping the failing source.
    pub fn is_authentication(&self) -> bool {
        matches!(self, LoginError::Authentication(_))
    }
}

/// Errors from loading, saving or validating settings.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Incomplete settings: {0}")]
    Incomplete(String),
}

/// A single course could not be enrolled.
#[derive(thiserror::Error, Debug)]
pub enum EnrollError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected response: {0}")]
    Response(String),
}

/// Convenience result types.
pub type LoginResult<T> = Result<T, LoginError>;
pub type SettingsResult<T> = Result<T, SettingsError>;
