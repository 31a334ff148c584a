//! Enrollment accounting.
//!
//! The enrollment phase walks the aggregated courses, skips the ones the
//! operator's filters exclude, hands the rest to an [`Enroller`] and folds
//! each outcome into an [`EnrollmentSummary`]. Summary fields only ever add,
//! so partial summaries from separate batches can be merged in any order.

use std::ops::{Add, AddAssign};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::login::LoginSession;
use crate::settings::Settings;
use crate::types::{CourseRecord, EnrollError};

/// Result of trying to claim one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollOutcome {
    /// Claimed for free; `price_minor` is the list price in minor units.
    Enrolled { price_minor: u64 },
    AlreadyEnrolled,
    /// The coupon no longer makes the course free.
    Expired,
}

/// Claims a single course for the logged-in account.
#[async_trait]
pub trait Enroller: Send + Sync {
    async fn enroll(
        &self,
        session: &LoginSession,
        course: &CourseRecord,
    ) -> Result<EnrollOutcome, EnrollError>;
}

/// Counters produced by an enrollment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentSummary {
    pub successfully_enrolled: u64,
    pub already_enrolled: u64,
    pub excluded: u64,
    pub expired: u64,
    /// Sum of list prices of enrolled courses, in minor currency units.
    pub amount_saved_minor: u64,
    pub currency: String,
}

impl EnrollmentSummary {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: EnrollOutcome) {
        match outcome {
            EnrollOutcome::Enrolled { price_minor } => {
                self.successfully_enrolled += 1;
                self.amount_saved_minor += price_minor;
            }
            EnrollOutcome::AlreadyEnrolled => self.already_enrolled += 1,
            EnrollOutcome::Expired => self.expired += 1,
        }
    }

    pub fn record_excluded(&mut self) {
        self.excluded += 1;
    }

    /// Amount saved in major units, e.g. `19.99`.
    pub fn amount_saved(&self) -> f64 {
        self.amount_saved_minor as f64 / 100.0
    }

    /// Amount saved with two decimals and the upper-cased currency code.
    pub fn amount_saved_display(&self) -> String {
        format!(
            "{}.{:02} {}",
            self.amount_saved_minor / 100,
            self.amount_saved_minor % 100,
            self.currency.to_uppercase()
        )
    }

    /// Number of courses accounted for.
    pub fn processed(&self) -> u64 {
        self.successfully_enrolled + self.already_enrolled + self.excluded + self.expired
    }

    /// Add `other` field by field. An empty currency adopts `other`'s.
    pub fn merge(&mut self, other: &EnrollmentSummary) {
        self.successfully_enrolled += other.successfully_enrolled;
        self.already_enrolled += other.already_enrolled;
        self.excluded += other.excluded;
        self.expired += other.expired;
        self.amount_saved_minor += other.amount_saved_minor;
        if self.currency.is_empty() {
            self.currency = other.currency.clone();
        }
    }
}

impl AddAssign<&EnrollmentSummary> for EnrollmentSummary {
    fn add_assign(&mut self, other: &EnrollmentSummary) {
        self.merge(other);
    }
}

impl Add for EnrollmentSummary {
    type Output = EnrollmentSummary;

    fn add(mut self, other: EnrollmentSummary) -> EnrollmentSummary {
        self.merge(&other);
        self
    }
}

/// Operator filters deciding which courses are excluded.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    exclude_keywords: Vec<String>,
    languages: Vec<String>,
    categories: Vec<String>,
}

impl CourseFilter {
    pub fn from_settings(settings: &Settings) -> Self {
        let lower = |values: &[String]| -> Vec<String> {
            values.iter().map(|v| v.to_lowercase()).collect()
        };
        Self {
            exclude_keywords: lower(&settings.exclude_keywords),
            languages: lower(&settings.languages),
            categories: lower(&settings.categories),
        }
    }

    /// Excluded when the title hits a keyword, or a known language or
    /// category is outside the selection. Unknown fields never exclude.
    pub fn excludes(&self, course: &CourseRecord) -> bool {
        let title = course.title.to_lowercase();
        if self.exclude_keywords.iter().any(|k| !k.is_empty() && title.contains(k)) {
            return true;
        }
        if let Some(language) = &course.language {
            if !self.languages.is_empty() && !self.languages.contains(&language.to_lowercase()) {
                return true;
            }
        }
        if let Some(category) = &course.category {
            if !self.categories.is_empty() && !self.categories.contains(&category.to_lowercase()) {
                return true;
            }
        }
        false
    }
}

/// Drives an [`Enroller`] over aggregated courses.
pub struct EnrollmentPhase {
    enroller: Arc<dyn Enroller>,
    filter: CourseFilter,
}

impl EnrollmentPhase {
    pub fn new(enroller: Arc<dyn Enroller>, filter: CourseFilter) -> Self {
        Self { enroller, filter }
    }

    /// Enroll every course and return a fresh summary.
    pub async fn run<'a, I>(&self, session: &LoginSession, courses: I) -> EnrollmentSummary
    where
        I: IntoIterator<Item = &'a CourseRecord>,
    {
        let mut summary = EnrollmentSummary::new(session.currency());
        self.run_into(session, courses, &mut summary).await;
        summary
    }

    /// Enroll every course, accumulating into `summary` as it goes so an
    /// interrupted run still leaves an accurate partial summary.
    ///
    /// Each course is handled on its own, so enrolling two batches and
    /// merging their summaries equals enrolling the concatenation. Remove
    /// duplicate listings beforehand with [`ScrapeResults::unique_courses`].
    ///
    /// [`ScrapeResults::unique_courses`]: crate::ScrapeResults::unique_courses
    pub async fn run_into<'a, I>(
        &self,
        session: &LoginSession,
        courses: I,
        summary: &mut EnrollmentSummary,
    ) where
        I: IntoIterator<Item = &'a CourseRecord>,
    {
        for course in courses {
            if self.filter.excludes(course) {
                tracing::debug!(title = %course.title, "course excluded by filters");
                summary.record_excluded();
                continue;
            }
            match self.enroller.enroll(session, course).await {
                Ok(outcome) => {
                    tracing::debug!(title = %course.title, ?outcome, "enrollment outcome");
                    summary.record(outcome);
                }
                Err(e) => {
                    tracing::warn!(title = %course.title, site = %course.site, "enrollment failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteId;

    fn course(title: &str) -> CourseRecord {
        CourseRecord::new(SiteId::from("alpha"), title, format!("https://c.test/{title}"))
    }

    #[test]
    fn test_record_counts_each_outcome() {
        let mut summary = EnrollmentSummary::new("usd");
        summary.record(EnrollOutcome::Enrolled { price_minor: 1999 });
        summary.record(EnrollOutcome::Enrolled { price_minor: 1 });
        summary.record(EnrollOutcome::AlreadyEnrolled);
        summary.record(EnrollOutcome::Expired);
        summary.record_excluded();

        assert_eq!(summary.successfully_enrolled, 2);
        assert_eq!(summary.already_enrolled, 1);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.processed(), 5);
        assert_eq!(summary.amount_saved_display(), "20.00 USD");
        assert!((summary.amount_saved() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_adopts_currency_when_empty() {
        let mut left = EnrollmentSummary::default();
        let mut right = EnrollmentSummary::new("eur");
        right.record(EnrollOutcome::Expired);
        left += &right;
        assert_eq!(left.currency, "eur");
        assert_eq!(left.expired, 1);
    }

    #[test]
    fn test_filter_keywords_are_case_insensitive() {
        let settings = Settings {
            exclude_keywords: vec!["Crypto".into()],
            ..Settings::default()
        };
        let filter = CourseFilter::from_settings(&settings);
        assert!(filter.excludes(&course("Learn CRYPTO trading")));
        assert!(!filter.excludes(&course("Learn Rust")));
    }

    #[test]
    fn test_filter_language_and_category() {
        let settings = Settings {
            languages: vec!["English".into()],
            categories: vec!["Development".into()],
            ..Settings::default()
        };
        let filter = CourseFilter::from_settings(&settings);

        let mut c = course("Rust");
        assert!(!filter.excludes(&c), "unknown language and category never exclude");

        c.language = Some("english".into());
        c.category = Some("Development".into());
        assert!(!filter.excludes(&c));

        c.language = Some("French".into());
        assert!(filter.excludes(&c));

        c.language = Some("English".into());
        c.category = Some("Marketing".into());
        assert!(filter.excludes(&c));
    }
}
