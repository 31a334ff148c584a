//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::{json, Value};

use freecourse::{
    CourseFilter, EnrollmentPhase, EnrollmentSummary, JsonSettingsStore, LoginCoordinator,
    ProgressSink, ScrapeOrchestrator, ScrapeResults, Settings, SettingsStore,
};

use crate::account::HttpAccount;
use crate::feed::FeedWorker;
use crate::progress::TerminalProgress;
use crate::prompt::TerminalPrompt;
use crate::report::{outcome_label, render_sites, render_summary};

/// Resolves once the operator presses Ctrl-C. Never resolves if the signal
/// handler cannot be installed.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

fn load(store: &JsonSettingsStore) -> anyhow::Result<Settings> {
    store
        .load()
        .with_context(|| format!("failed to load settings from {}", store.path().display()))
}

/// Scrape every selected site, stopping early on Ctrl-C.
pub async fn scrape_sites(settings: &Settings, progress: Arc<dyn ProgressSink>) -> ScrapeResults {
    let sites = settings.selected_sites();
    let worker = Arc::new(FeedWorker::from_settings(settings));
    ScrapeOrchestrator::new(worker, settings.scrape.clone())
        .with_progress(progress)
        .run_until(&sites, interrupted())
        .await
}

/// Aggregated results as JSON, one object per site in settings order.
pub fn results_json(results: &ScrapeResults) -> Value {
    Value::Array(
        results
            .iter()
            .map(|r| {
                json!({
                    "site": r.site,
                    "status": outcome_label(&r.outcome),
                    "attempts": r.attempts,
                    "courses": r.items,
                })
            })
            .collect(),
    )
}

/// `freecourse run`: log in, scrape, enroll, print the summary.
pub async fn run(store: &JsonSettingsStore) -> anyhow::Result<EnrollmentSummary> {
    let mut settings = load(store)?;
    let account = Arc::new(HttpAccount::from_settings(&settings));

    let mut login = LoginCoordinator::new(account.clone(), Arc::new(TerminalPrompt));
    let session = login.login(&mut settings).await.context("login failed")?;
    store
        .save(&settings)
        .with_context(|| format!("failed to save settings to {}", store.path().display()))?;

    settings
        .validate()
        .context("please select at least one site, language and category in the settings")?;

    let sites = settings.selected_sites();
    let results = scrape_sites(&settings, Arc::new(TerminalProgress::new(&sites))).await;
    eprint!("{}", render_sites(&results));

    let phase = EnrollmentPhase::new(account, CourseFilter::from_settings(&settings));
    let mut summary = EnrollmentSummary::new(session.currency());
    tokio::select! {
        () = phase.run_into(&session, results.unique_courses(), &mut summary) => {}
        () = interrupted() => tracing::warn!("enrollment interrupted, reporting partial results"),
    }

    print!("{}", render_summary(&summary));
    Ok(summary)
}

/// `freecourse scrape`: scrape only and print the courses as JSON.
pub async fn scrape(store: &JsonSettingsStore, pretty: bool) -> anyhow::Result<()> {
    let settings = load(store)?;
    let sites = settings.selected_sites();
    if sites.is_empty() {
        bail!("no sites enabled in {}", store.path().display());
    }

    let results = scrape_sites(&settings, Arc::new(TerminalProgress::new(&sites))).await;
    let value = results_json(&results);
    let out = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{out}");
    Ok(())
}

/// `freecourse validate`: check the settings file.
pub fn validate(store: &JsonSettingsStore) -> anyhow::Result<Settings> {
    let settings = load(store)?;
    settings.validate()?;
    Ok(settings)
}
