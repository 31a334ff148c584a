//! Terminal progress bars, one per site.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use freecourse::{AttemptError, ProgressSink, SiteId};

const TEMPLATE: &str = "{prefix:>16.cyan} [{bar:32}] {pos:>4}/{len:4} {msg}";

/// Renders scrape progress with `indicatif`. Hidden when stderr is not a
/// terminal.
pub struct TerminalProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<SiteId, ProgressBar>>,
    style: ProgressStyle,
}

impl TerminalProgress {
    /// Bars are created up front so they render in site order.
    pub fn new(sites: &[SiteId]) -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let progress = Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            style,
        };
        for site in sites {
            progress.bar(site);
        }
        progress
    }

    fn bar(&self, site: &SiteId) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        bars.entry(site.clone())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(self.style.clone());
                bar.set_prefix(site.to_string());
                bar
            })
            .clone()
    }
}

impl ProgressSink for TerminalProgress {
    fn update(&self, site: &SiteId, completed: u64, total: u64) {
        let bar = self.bar(site);
        bar.set_length(total);
        bar.set_position(completed);
    }

    fn attempt_failed(&self, site: &SiteId, attempt: u32, max_attempts: u32, error: &AttemptError) {
        let bar = self.bar(site);
        bar.set_message(format!("error (attempt {attempt}/{max_attempts}): {error}"));
        if attempt < max_attempts {
            bar.reset();
        }
    }

    fn site_finished(&self, site: &SiteId, count: usize, attempts: u32) {
        self.bar(site)
            .finish_with_message(format!("{count} courses after {attempts} attempt(s)"));
    }
}
