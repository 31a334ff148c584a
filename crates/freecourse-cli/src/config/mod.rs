//! Settings file location.

use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "FREECOURSE_SETTINGS";

const SETTINGS_DIR: &str = ".freecourse";
const SETTINGS_FILE: &str = "settings.json";

/// Where a settings path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    Flag,
    Env,
    WorkingDir,
    Home,
}

impl fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SettingsSource::Flag => "--settings",
            SettingsSource::Env => SETTINGS_ENV,
            SettingsSource::WorkingDir => "working directory",
            SettingsSource::Home => "home directory",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsLocation {
    pub path: PathBuf,
    pub source: SettingsSource,
}

impl SettingsLocation {
    /// Resolve against the real process environment.
    ///
    /// Order: `--settings`, `$FREECOURSE_SETTINGS`, `./.freecourse/settings.json`
    /// if it exists, then `.freecourse/settings.json` under the home directory.
    pub fn resolve(explicit: Option<&str>) -> Self {
        Self::resolve_with(explicit, |key| std::env::var(key).ok(), Path::new("."))
    }

    fn resolve_with(
        explicit: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        cwd: &Path,
    ) -> Self {
        let (path, source) = if let Some(path) = explicit {
            (PathBuf::from(path), SettingsSource::Flag)
        } else if let Some(path) = env(SETTINGS_ENV).filter(|p| !p.is_empty()) {
            (PathBuf::from(path), SettingsSource::Env)
        } else {
            let local = cwd.join(SETTINGS_DIR).join(SETTINGS_FILE);
            if local.is_file() {
                (local, SettingsSource::WorkingDir)
            } else {
                let home = env("HOME")
                    .or_else(|| env("USERPROFILE"))
                    .unwrap_or_else(|| ".".to_string());
                (
                    PathBuf::from(home).join(SETTINGS_DIR).join(SETTINGS_FILE),
                    SettingsSource::Home,
                )
            }
        };
        Self { path, source }
    }
}
