// src/labels/mod.rs

mod detect;
mod mapping;
mod matcher;
mod normalize;
mod report;

pub use detect::{detect_driver_column, detect_roles, driver_values};
pub use mapping::build_mapping;
pub use matcher::match_pages;
pub use report::summarize;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Restrict the run sheet to one driver's rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverFilter {
    pub column: String,
    pub value: String,
}

/// Which run-sheet columns hold the stop number and the order reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoles {
    pub stop_column: String,
    pub order_column: String,
    pub driver_filter: Option<DriverFilter>,
}

impl ColumnRoles {
    pub fn new(stop_column: impl Into<String>, order_column: impl Into<String>) -> Self {
        Self {
            stop_column: stop_column.into(),
            order_column: order_column.into(),
            driver_filter: None,
        }
    }

    pub fn with_driver(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.driver_filter = Some(DriverFilter {
            column: column.into(),
            value: value.into(),
        });
        self
    }
}

/// What to do with a row whose stop number does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadRowPolicy {
    /// Fail the whole run on the first malformed row.
    #[default]
    Abort,
    /// Leave the row out of the mapping and list it in the report.
    Skip,
}

/// Order in which mapping keys are tried against a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrder {
    /// First row of the run sheet wins.
    #[default]
    Insertion,
    /// Longer references are tried first, ties keep insertion order.
    LongestFirst,
}

/// Order reference -> stop number, remembering first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderToStopMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl OrderToStopMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: String, stop: String) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = stop,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, stop));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries in the order the matcher visits them.
    pub fn ordered(&self, order: MatchOrder) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self.iter().collect();
        if order == MatchOrder::LongestFirst {
            // stable sort keeps insertion order among equal lengths
            entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        }
        entries
    }
}

/// A run-sheet row left out of the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based data row in the loaded run sheet.
    pub row: usize,
    pub value: String,
}

/// Mapping plus the rows that could not be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOutcome {
    pub mapping: OrderToStopMapping,
    pub skipped: Vec<SkippedRow>,
}

/// Outcome of looking one label page up in the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMatch {
    pub page_index: usize,
    pub order_ref: Option<String>,
    pub stop_number: String,
    pub matched: bool,
}

/// Per-run summary shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub matched: usize,
    pub unmatched: Vec<String>,
    pub skipped_rows: Vec<SkippedRow>,
}
