use crate::dataset::CellValue;

/// Comparable order-reference key: the cell's text, trimmed, case kept.
pub fn normalize_key(raw: &CellValue) -> String {
    raw.to_string().trim().to_string()
}

/// Stop number as a plain integer string ("3.0" -> "3").
///
/// Returns the offending text when the cell is empty or not a finite number.
pub fn normalize_stop_number(raw: &CellValue) -> Result<String, String> {
    let text = raw.to_string();
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        // adding 0.0 turns -0 into 0
        Ok(n) if n.is_finite() => Ok(format!("{:.0}", n.trunc() + 0.0)),
        _ => Err(trimmed.to_string()),
    }
}
