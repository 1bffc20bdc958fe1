// src/pipeline.rs

use crate::config::PlacementConfig;
use crate::dataset::TabularDataset;
use crate::error::Result;
use crate::labels::{self, BadRowPolicy, ColumnRoles, MatchOrder, PageMatch, RunReport};
use crate::pdf_labels::LabelDocument;
use tracing::{info, info_span, warn};

/// Knobs for one numbering run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberingOptions {
    pub bad_rows: BadRowPolicy,
    pub match_order: MatchOrder,
    pub placement: PlacementConfig,
}

/// Result of a numbering run.
#[derive(Debug)]
pub struct NumberedLabels {
    pub pdf: Vec<u8>,
    pub report: RunReport,
    pub pages: Vec<PageMatch>,
}

/// Stamp every label page of `pdf_bytes` with its stop number.
///
/// The mapping is built before the PDF is opened, so a malformed run sheet
/// fails the run without touching the document. Pages with no known order
/// reference are stamped with `?`.
pub fn number_labels(
    pdf_bytes: &[u8],
    run_sheet: &TabularDataset,
    roles: &ColumnRoles,
    options: &NumberingOptions,
) -> Result<NumberedLabels> {
    let outcome = labels::build_mapping(run_sheet, roles, options.bad_rows)?;
    if outcome.mapping.is_empty() {
        warn!("Run sheet gave no order references, every label will get '?'");
    }
    let mut document = LabelDocument::load_mem(pdf_bytes)?;

    let pages = labels::match_pages(&document.page_texts(), &outcome.mapping, options.match_order);
    for page in &pages {
        let span = info_span!("page", index = page.page_index + 1);
        let _guard = span.enter();
        document.stamp(page.page_index, &page.stop_number, &options.placement)?;
    }

    let pdf = document.save_to_vec()?;
    let report = labels::summarize(&pages, outcome.skipped);
    info!(
        total = report.total,
        matched = report.matched,
        unmatched = report.unmatched.len(),
        "Numbered labels"
    );
    Ok(NumberedLabels { pdf, report, pages })
}
