//! Plain-text result tables.

use freecourse::{EnrollmentSummary, ScrapeResults, SiteOutcome};

/// Render rows as a two-column box table.
fn table(title: &str, header: (&str, &str), rows: &[(String, String)]) -> String {
    let left = rows
        .iter()
        .map(|(k, _)| k.chars().count())
        .chain([header.0.chars().count()])
        .max()
        .unwrap_or(0);
    let right = rows
        .iter()
        .map(|(_, v)| v.chars().count())
        .chain([header.1.chars().count()])
        .max()
        .unwrap_or(0);

    let rule = |l: char, m: char, r: char| {
        format!("{l}{}{m}{}{r}\n", "─".repeat(left + 2), "─".repeat(right + 2))
    };
    let row = |k: &str, v: &str| format!("│ {k:<left$} │ {v:<right$} │\n");

    let mut out = format!("{title}\n");
    out.push_str(&rule('┌', '┬', '┐'));
    out.push_str(&row(header.0, header.1));
    out.push_str(&rule('├', '┼', '┤'));
    for (k, v) in rows {
        out.push_str(&row(k, v));
    }
    out.push_str(&rule('└', '┴', '┘'));
    out
}

/// Final enrollment statistics.
pub fn render_summary(summary: &EnrollmentSummary) -> String {
    let rows = [
        ("Successfully Enrolled", summary.successfully_enrolled.to_string()),
        ("Amount Saved", summary.amount_saved_display()),
        ("Already Enrolled", summary.already_enrolled.to_string()),
        ("Excluded Courses", summary.excluded.to_string()),
        ("Expired Courses", summary.expired.to_string()),
    ]
    .map(|(k, v)| (k.to_string(), v));
    table("Enrollment Results", ("Stat", "Value"), &rows)
}

/// Short label for a site outcome.
pub fn outcome_label(outcome: &SiteOutcome) -> &'static str {
    match outcome {
        SiteOutcome::Completed => "ok",
        SiteOutcome::Exhausted { .. } => "failed",
        SiteOutcome::Cancelled => "cancelled",
    }
}

/// Per-site course counts.
pub fn render_sites(results: &ScrapeResults) -> String {
    let rows: Vec<(String, String)> = results
        .iter()
        .map(|r| {
            (
                r.site.to_string(),
                format!("{} ({})", r.items.len(), outcome_label(&r.outcome)),
            )
        })
        .collect();
    table("Courses Found", ("Site", "Courses"), &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freecourse::EnrollOutcome;

    #[test]
    fn test_summary_table_lists_every_stat() {
        let mut summary = EnrollmentSummary::new("usd");
        summary.record(EnrollOutcome::Enrolled { price_minor: 4599 });
        summary.record(EnrollOutcome::Expired);

        let out = render_summary(&summary);
        assert!(out.starts_with("Enrollment Results\n"));
        assert!(out
            .lines()
            .any(|l| l.starts_with("│ Successfully Enrolled │ 1 ")));
        assert!(out.contains("45.99 USD"));
        assert!(out.contains("Expired Courses"));
        assert_eq!(out.lines().count(), 1 + 3 + 5 + 1);
    }

    #[test]
    fn test_rows_are_aligned() {
        let rows = vec![("a".to_string(), "1".to_string()), ("longer".to_string(), "22".to_string())];
        let out = table("T", ("K", "V"), &rows);
        let widths: Vec<usize> = out.lines().skip(1).map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
