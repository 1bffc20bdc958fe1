use super::ColumnRoles;
use crate::dataset::TabularDataset;
use regex::Regex;

/// Values looked at per column.
const SAMPLE_SIZE: usize = 5;

/// Guess the stop-number and order-reference columns.
///
/// The guess is advisory: callers show it, let the user override it, and
/// pass the final roles to `build_mapping`. Returns `None` only for a table
/// without columns.
pub fn detect_roles(dataset: &TabularDataset) -> Option<ColumnRoles> {
    let columns = dataset.columns();
    let first = columns.first()?;
    let numeric_re = Regex::new(r"^(?:\d+\.?\d*|\.\d+)$").ok()?;

    let samples: Vec<Vec<String>> = columns
        .iter()
        .map(|c| sample_values(dataset, c))
        .collect();

    // Stop numbers: a short run of small integers under a stop/order header.
    let strict_stop = columns.iter().zip(&samples).find(|(name, values)| {
        let lower = name.to_lowercase();
        let numbers = numeric_values(values, &numeric_re);
        numbers.len() >= 3
            && mean(&numbers) < 20.0
            && max(&numbers) < 50.0
            && (lower.contains("stop") || lower.contains("order"))
    });

    let stop = strict_stop
        .or_else(|| {
            columns.iter().zip(&samples).find(|(_, values)| {
                let numbers = numeric_values(values, &numeric_re);
                numbers.len() >= 2 && max(&numbers) < 100.0
            })
        })
        .map(|(name, _)| name)
        .unwrap_or(first);

    // Order references: longer tokens under a ref/order/number header.
    let order = columns
        .iter()
        .zip(&samples)
        .find(|(name, values)| {
            let lower = name.to_lowercase();
            let long_values = values.iter().filter(|v| v.chars().count() > 3).count();
            (lower.contains("ref") || lower.contains("order") || lower.contains("number"))
                && long_values >= 2
        })
        .map(|(name, _)| name)
        .or_else(|| columns.iter().find(|c| *c != stop))
        .unwrap_or(&columns[1.min(columns.len() - 1)]);

    Some(ColumnRoles::new(stop.clone(), order.clone()))
}

/// Guess which column names the driver for each row.
pub fn detect_driver_column(dataset: &TabularDataset) -> Option<String> {
    let columns = dataset.columns();
    columns
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            ["driver", "member", "assigned"]
                .iter()
                .any(|hint| lower.contains(hint))
        })
        .or_else(|| columns.first())
        .cloned()
}

/// Distinct non-empty values of a column, in first-seen order.
pub fn driver_values(dataset: &TabularDataset, column: &str) -> crate::error::Result<Vec<String>> {
    let mut values: Vec<String> = Vec::new();
    for cell in dataset.column_values(column)? {
        let value = cell.to_string().trim().to_string();
        if !value.is_empty() && !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}

fn sample_values(dataset: &TabularDataset, column: &str) -> Vec<String> {
    dataset
        .column_values(column)
        .map(|cells| {
            cells
                .filter(|c| !c.is_empty())
                .take(SAMPLE_SIZE)
                .map(|c| c.to_string().trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn numeric_values(samples: &[String], numeric_re: &Regex) -> Vec<f64> {
    samples
        .iter()
        .filter(|s| numeric_re.is_match(s))
        .filter_map(|s| s.parse::<f64>().ok())
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}
