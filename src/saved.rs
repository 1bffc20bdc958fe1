// src/saved.rs

use crate::dataset::{CellValue, TabularDataset};
use crate::error::Result;
use chrono::{Local, NaiveDateTime};
use rust_xlsxwriter::Workbook;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DRIVER_KEYWORDS: [&str; 5] = ["driver", "assigned", "member", "name", "user"];

/// Write a processed run sheet as `<base>[_<driver>]_<YYYYMMDD_HHMMSS>.xlsx`.
pub fn save_processed(
    dataset: &TabularDataset,
    dir: impl AsRef<Path>,
    base: &str,
    driver: Option<&str>,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let driver = driver.map(file_safe).filter(|d| !d.is_empty());
    let file_name = match driver {
        Some(driver) => format!("{base}_{driver}_{stamp}.xlsx"),
        None => format!("{base}_{stamp}.xlsx"),
    };
    let path = dir.join(file_name);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in (0u16..).zip(dataset.columns()) {
        sheet.write_string(0, col, name)?;
    }
    for (row, cells) in (1u32..).zip(dataset.rows()) {
        for (col, cell) in (0u16..).zip(cells) {
            match cell {
                CellValue::Empty => {}
                CellValue::Text(text) => {
                    sheet.write_string(row, col, text)?;
                }
                CellValue::Number(n) => {
                    sheet.write_number(row, col, *n)?;
                }
                CellValue::Bool(b) => {
                    sheet.write_boolean(row, col, *b)?;
                }
            }
        }
    }
    workbook.save(&path)?;

    info!(path = %path.display(), rows = dataset.len(), "Saved processed run sheet");
    Ok(path)
}

fn file_safe(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim().replace(' ', "_")
}

/// Guess whose run sheet this is from the first driver-like column.
pub fn infer_driver_name(dataset: &TabularDataset) -> Option<String> {
    let idx = dataset.columns().iter().position(|c| {
        let lower = c.to_lowercase();
        DRIVER_KEYWORDS.iter().any(|k| lower.contains(k))
    })?;

    let mut unique: Vec<String> = Vec::new();
    for row in dataset.rows() {
        let value = row[idx].to_string().trim().to_string();
        if !value.is_empty() && !unique.contains(&value) {
            unique.push(value);
        }
    }

    let name = match unique.as_slice() {
        [] => return None,
        [only] => only.clone(),
        many => format!("Multiple_Drivers({})", many.len()),
    };
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')'))
        .collect();
    let cleaned = cleaned.trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Saved run sheets in `dir`, newest name first. A missing directory is empty.
pub fn list_saved(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("xlsx"))
        })
        .collect();
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(files)
}

/// Human-readable label for a saved file.
///
/// Driver run sheets named `..._sheet_<Driver>_<YYYYMMDD>_<HHMMSS>` show as
/// "<Driver> - MM/DD/YYYY HH:MM AM"; anything else is its title-cased stem.
pub fn display_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    driver_sheet_label(&stem).unwrap_or_else(|| title_case(&stem.replace('_', " ")))
}

fn driver_sheet_label(stem: &str) -> Option<String> {
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 4 || !stem.to_lowercase().contains("driver") {
        return None;
    }
    let (date, time) = (parts[parts.len() - 2], parts[parts.len() - 1]);
    let digits = |s: &str, n: usize| s.len() == n && s.chars().all(|c| c.is_ascii_digit());
    if !digits(date, 8) || !digits(time, 6) {
        return None;
    }

    let sheet_idx = parts.iter().position(|p| p.to_lowercase().contains("sheet"))?;
    let driver_parts = parts.get(sheet_idx + 1..parts.len() - 2)?;
    if driver_parts.is_empty() {
        return None;
    }
    let driver = title_case(&driver_parts.join(" "));

    let when = match NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S") {
        Ok(when) => when.format("%m/%d/%Y %I:%M %p").to_string(),
        Err(_) => format!("{date}_{time}"),
    };
    Some(format!("{driver} - {when}"))
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::text_table;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_infer_driver_name() {
        let single = text_table(&["Stop", "Driver Name"], &[&["1", "Ann Lee"], &["2", "Ann Lee"]]);
        assert_eq!(infer_driver_name(&single).as_deref(), Some("Ann Lee"));

        let several = text_table(&["Assigned To"], &[&["Ann"], &["Bob"], &["Cy"]]);
        assert_eq!(
            infer_driver_name(&several).as_deref(),
            Some("Multiple_Drivers(3)")
        );

        let odd = text_table(&["user"], &[&["J/R*Smith"]]);
        assert_eq!(infer_driver_name(&odd).as_deref(), Some("JRSmith"));

        let none = text_table(&["Stop", "Order"], &[&["1", "A"]]);
        assert_eq!(infer_driver_name(&none), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            display_name(Path::new("saved/driver_run_sheet_ann_lee_20250314_153005.xlsx")),
            "Ann Lee - 03/14/2025 03:30 PM"
        );
        assert_eq!(
            display_name(Path::new("driver_sheet_bob_20251399_250000.csv")),
            "Bob - 20251399_250000"
        );
        // no "driver" in the name: plain title case
        assert_eq!(
            display_name(Path::new("kitchen_sheet_ann_20250314_153005.xlsx")),
            "Kitchen Sheet Ann 20250314 153005"
        );
        assert_eq!(
            display_name(Path::new("driver_run_sheet_20250314_153005.xlsx")),
            "Driver Run Sheet 20250314 153005"
        );
    }

    #[test]
    fn test_save_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let table = text_table(&["Stop", "Order"], &[&["1", "A-1"], &["2", "B, 2"]]);
        let path = save_processed(&table, dir.path(), "driver_run_sheet", Some("Ann Lee")).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("driver_run_sheet_Ann_Lee_"));
        assert!(name.ends_with(".xlsx"));
        assert!(display_name(&path).starts_with("Ann Lee - "));

        let reloaded = crate::dataset::load_table(&path, &Default::default()).unwrap();
        assert_eq!(reloaded.columns(), ["Stop", "Order"]);
        let cells: Vec<Vec<String>> = reloaded
            .rows()
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        assert_eq!(cells, vec![vec!["1", "A-1"], vec!["2", "B, 2"]]);

        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("zzz_old.csv"), "x").unwrap();
        let listed = list_saved(dir.path()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].ends_with("zzz_old.csv"));

        assert!(list_saved(dir.path().join("missing")).unwrap().is_empty());
    }
}
