use super::{BadRowPolicy, ColumnRoles, MappingOutcome, OrderToStopMapping, SkippedRow};
use super::normalize::{normalize_key, normalize_stop_number};
use crate::dataset::TabularDataset;
use crate::error::{LabelError, Result};
use tracing::{debug, info, warn};

/// Build the order-reference -> stop-number table for one run.
///
/// Rows are optionally narrowed to one driver first. Later rows overwrite
/// earlier ones that share an order reference. With `BadRowPolicy::Abort`
/// the first unparseable stop number fails the build; with `Skip` the row
/// is left out and returned in `MappingOutcome::skipped`.
pub fn build_mapping(
    dataset: &TabularDataset,
    roles: &ColumnRoles,
    policy: BadRowPolicy,
) -> Result<MappingOutcome> {
    let stop_idx = dataset.column_index(&roles.stop_column)?;
    let order_idx = dataset.column_index(&roles.order_column)?;
    let driver = match &roles.driver_filter {
        Some(filter) => Some((dataset.column_index(&filter.column)?, filter.value.trim())),
        None => None,
    };

    let mut outcome = MappingOutcome {
        mapping: OrderToStopMapping::new(),
        skipped: Vec::new(),
    };

    for (i, row) in dataset.rows().iter().enumerate() {
        let row_number = i + 1;
        if let Some((driver_idx, wanted)) = driver {
            if row[driver_idx].to_string().trim() != wanted {
                continue;
            }
        }

        let key = normalize_key(&row[order_idx]);
        let stop = match normalize_stop_number(&row[stop_idx]) {
            Ok(stop) => stop,
            Err(value) if policy == BadRowPolicy::Skip => {
                warn!(row = row_number, value = %value, "Skipping row with malformed stop number");
                outcome.skipped.push(SkippedRow {
                    row: row_number,
                    value,
                });
                continue;
            }
            Err(value) => {
                return Err(LabelError::MalformedStopNumber {
                    row: row_number,
                    column: roles.stop_column.clone(),
                    value,
                });
            }
        };

        if let Some(previous) = outcome.mapping.get(&key) {
            debug!(order = %key, previous, stop = %stop, "Order reference repeated, later row wins");
        }
        outcome.mapping.insert(key, stop);
    }

    info!(
        orders = outcome.mapping.len(),
        skipped = outcome.skipped.len(),
        stop_column = %roles.stop_column,
        order_column = %roles.order_column,
        "Built order mapping"
    );
    Ok(outcome)
}
