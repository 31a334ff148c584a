//! freecourse command-line front end: HTTP adapters, terminal UI and subcommands.

pub mod account;
pub mod commands;
pub mod config;
pub mod feed;
pub mod progress;
pub mod prompt;
pub mod report;

pub use account::HttpAccount;
pub use config::{SettingsLocation, SettingsSource};
pub use feed::FeedWorker;
pub use progress::TerminalProgress;
pub use prompt::TerminalPrompt;
