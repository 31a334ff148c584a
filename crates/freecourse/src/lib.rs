//! freecourse — concurrent multi-site course scraping, login fallback and enrollment accounting.

pub mod enroll;
pub mod login;
pub mod orchestrator;
pub mod progress;
pub mod settings;
pub mod task;
pub mod types;

pub use enroll::{CourseFilter, EnrollOutcome, Enroller, EnrollmentPhase, EnrollmentSummary};
pub use login::{
    AccountGateway, AccountInfo, CredentialPrompt, Credentials, LoginAttempt, LoginCoordinator,
    LoginMethod, LoginSession, LoginState,
};
pub use orchestrator::{
    ScrapeConfig, ScrapeOrchestrator, ScrapeResults, SiteOutcome, SiteResult, SiteWorker,
};
pub use progress::{NoProgress, ProgressSink, TracingProgress};
pub use settings::{AccountConfig, JsonSettingsStore, Settings, SettingsStore, SiteEntry};
pub use task::{site_task, Discovery, SiteTask, SiteTaskWriter};
pub use types::*;
