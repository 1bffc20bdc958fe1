use super::{PageMatch, RunReport, SkippedRow};
use std::fmt;

/// How many unmatched pages are spelled out in the summary line.
const UNMATCHED_PREVIEW: usize = 5;

/// Fold per-page outcomes into the run summary.
pub fn summarize(results: &[PageMatch], skipped_rows: Vec<SkippedRow>) -> RunReport {
    RunReport {
        total: results.len(),
        matched: results.iter().filter(|r| r.matched).count(),
        unmatched: results
            .iter()
            .filter(|r| !r.matched)
            .map(|r| format!("Page {}", r.page_index + 1))
            .collect(),
        skipped_rows,
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matched {} out of {} labels", self.matched, self.total)?;
        if !self.unmatched.is_empty() {
            let preview: Vec<&str> = self
                .unmatched
                .iter()
                .take(UNMATCHED_PREVIEW)
                .map(String::as_str)
                .collect();
            write!(
                f,
                "; could not match {}: {}",
                self.unmatched.len(),
                preview.join(", ")
            )?;
            if self.unmatched.len() > UNMATCHED_PREVIEW {
                write!(f, ", ...")?;
            }
        }
        if !self.skipped_rows.is_empty() {
            write!(f, "; skipped {} run-sheet row(s)", self.skipped_rows.len())?;
        }
        Ok(())
    }
}
