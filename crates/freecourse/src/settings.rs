//! Run settings and their JSON persistence.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::orchestrator::ScrapeConfig;
use crate::types::{SettingsError, SettingsResult, SiteId};

/// A listing site the operator can enable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub name: String,
    /// Endpoint serving the site's course listing as JSON.
    pub feed_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Where the course platform's account API lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Everything a run needs to know, loaded once and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub use_browser_cookies: bool,
    pub email: String,
    pub password: String,
    /// Cookie export used when `use_browser_cookies` is set.
    pub cookie_file: Option<PathBuf>,
    pub sites: Vec<SiteEntry>,
    pub languages: Vec<String>,
    pub categories: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub account: AccountConfig,
    pub scrape: ScrapeConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_browser_cookies: false,
            email: String::new(),
            password: String::new(),
            cookie_file: None,
            sites: Vec::new(),
            languages: vec!["English".to_string()],
            categories: Vec::new(),
            exclude_keywords: Vec::new(),
            account: AccountConfig::default(),
            scrape: ScrapeConfig::default(),
        }
    }
}

impl Settings {
    /// Both an email and a password are stored.
    pub fn has_saved_credentials(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }

    /// Enabled sites, in configured order.
    pub fn selected_sites(&self) -> Vec<SiteId> {
        self.sites
            .iter()
            .filter(|s| s.enabled)
            .map(|s| SiteId::new(s.name.as_str()))
            .collect()
    }

    /// Feed URL configured for `site`.
    pub fn feed_url(&self, site: &SiteId) -> Option<&str> {
        self.sites
            .iter()
            .find(|s| s.name == site.as_str())
            .map(|s| s.feed_url.as_str())
    }

    /// Reject selections that cannot produce any enrollment.
    pub fn validate(&self) -> SettingsResult<()> {
        if self.selected_sites().is_empty() {
            return Err(SettingsError::Incomplete("select at least one site".into()));
        }
        if self.languages.is_empty() {
            return Err(SettingsError::Incomplete("select at least one language".into()));
        }
        if self.categories.is_empty() {
            return Err(SettingsError::Incomplete("select at least one category".into()));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// Load and save [`Settings`].
pub trait SettingsStore {
    fn load(&self) -> SettingsResult<Settings>;
    fn save(&self, settings: &Settings) -> SettingsResult<()>;
}

/// Settings persisted as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read settings from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> SettingsResult<Settings> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write settings to any writer.
    pub fn write_to<W: Write>(settings: &Settings, writer: &mut W) -> SettingsResult<()> {
        serde_json::to_writer_pretty(&mut *writer, settings)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    /// A missing file yields the defaults.
    fn load(&self) -> SettingsResult<Settings> {
        if !self.path.exists() {
            tracing::info!("No settings file at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }
        let mut file = std::fs::File::open(&self.path)?;
        Self::read_from(&mut file)
    }

    fn save(&self, settings: &Settings) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&self.path)?;
        Self::write_to(settings, &mut file)?;
        tracing::debug!("Saved settings: {}", self.path.display());
        Ok(())
    }
}
