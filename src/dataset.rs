// src/dataset.rs

use crate::error::{LabelError, Result};
use calamine::{Data, Reader, Sheets};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{info, warn};

/// How many leading rows of a sheet are tried as the header row.
const HEADER_SCAN_ROWS: usize = 5;

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    fn from_text(raw: &str) -> Self {
        if raw.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(raw.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            // Integral floats print without the ".0" spreadsheet readers add.
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{n:.0}"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::from_text(s),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            other => CellValue::from_text(&other.to_string()),
        }
    }
}

/// An in-memory table: unique column names plus rows aligned to them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularDataset {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl TabularDataset {
    /// Build a dataset from a raw header and raw rows.
    ///
    /// Header names are made unique the way spreadsheet tools do it
    /// (`Unnamed: 3`, `Qty.1`), rows are padded or cut to the header width,
    /// and rows with no values at all are dropped.
    pub fn new(header: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let columns = unique_column_names(header);
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .filter(|row| !row.iter().all(CellValue::is_empty))
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| LabelError::UnknownColumn {
                column: name.to_string(),
                available: self.columns.clone(),
            })
    }

    /// Cells of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<impl Iterator<Item = &CellValue>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Keep the given columns in the given order.
    pub fn select_columns(&self, names: &[String]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Self {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Keep the rows for which `keep` returns true.
    pub fn filter_rows(&self, mut keep: impl FnMut(&[CellValue]) -> bool) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}

fn unique_column_names(header: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(header.len());
    for (i, name) in header.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {i}")
        } else {
            name
        };
        let unique = if used.contains(&base) {
            // a generated "Qty.1" may already be a real header, keep counting
            let suffix = suffixes.entry(base.clone()).or_insert(0);
            loop {
                *suffix += 1;
                let candidate = format!("{base}.{suffix}");
                if !used.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            base
        };
        used.insert(unique.clone());
        names.push(unique);
    }
    names
}

/// Which sheet or archive member to read when a file holds more than one table.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub sheet: Option<String>,
    pub member: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Csv,
    Workbook,
    Archive,
}

fn table_kind(name: &str) -> Result<TableKind> {
    let lower = name.to_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "csv" => Ok(TableKind::Csv),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(TableKind::Workbook),
        "zip" => Ok(TableKind::Archive),
        _ => Err(LabelError::UnsupportedFile(name.to_string())),
    }
}

/// Load a run sheet or order list from CSV, an Excel workbook, or a ZIP
/// archive holding one of those.
pub fn load_table(path: impl AsRef<Path>, options: &LoadOptions) -> Result<TabularDataset> {
    let path = path.as_ref();
    let name = path.to_string_lossy();
    let bytes = std::fs::read(path)?;
    let dataset = load_table_bytes(&name, bytes, options)?;
    info!(
        file = %name,
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "Loaded table"
    );
    if dataset.is_empty() {
        warn!(file = %name, "Table has a header but no data rows");
    }
    Ok(dataset)
}

fn load_table_bytes(name: &str, bytes: Vec<u8>, options: &LoadOptions) -> Result<TabularDataset> {
    match table_kind(name)? {
        TableKind::Csv => read_csv(&bytes),
        TableKind::Workbook => {
            let workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
            read_workbook(workbook, options.sheet.as_deref())
        }
        TableKind::Archive => {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
            let member = pick_member(&archive_tables(&archive), options.member.as_deref())?;
            info!(member = %member, "Reading table from archive");

            let mut content = Vec::new();
            archive.by_name(&member)?.read_to_end(&mut content)?;
            match table_kind(&member)? {
                TableKind::Archive => Err(LabelError::UnsupportedFile(member)),
                _ => load_table_bytes(&member, content, options),
            }
        }
    }
}

fn read_csv(bytes: &[u8]) -> Result<TabularDataset> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            warn!("CSV is not valid UTF-8, decoding as windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => return Err(LabelError::EmptyTable),
    };

    let rows = records
        .map(|record| {
            record.map(|r| r.iter().map(CellValue::from_text).collect::<Vec<_>>())
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(TabularDataset::new(header, rows))
}

fn read_workbook<RS: Read + Seek>(
    mut workbook: Sheets<RS>,
    sheet: Option<&str>,
) -> Result<TabularDataset> {
    let sheet_names = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(name) if sheet_names.iter().any(|s| s == name) => name.to_string(),
        Some(name) => return Err(LabelError::MissingSheet(name.to_string())),
        None => sheet_names
            .first()
            .cloned()
            .ok_or(LabelError::EmptyTable)?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows: Vec<Vec<CellValue>> = range
        .rows()
        .map(|row| row.iter().map(CellValue::from).collect())
        .collect();

    let header_row = best_header_row(&rows).ok_or(LabelError::EmptyTable)?;
    info!(sheet = %sheet_name, header_row, "Detected header row");

    let data = rows.split_off(header_row + 1);
    let header = rows
        .pop()
        .unwrap_or_default()
        .iter()
        .map(|c| c.to_string().trim().to_string())
        .collect();

    Ok(TabularDataset::new(header, data))
}

/// Row 0 is the header unless more than half of its cells are blank; then
/// the first of the leading rows with fewer blank cells takes its place.
fn best_header_row(rows: &[Vec<CellValue>]) -> Option<usize> {
    let blanks = |row: &Vec<CellValue>| row.iter().filter(|c| c.is_empty()).count();
    let first = rows.first()?;
    let first_blanks = blanks(first);
    if first_blanks * 2 <= first.len() {
        return Some(0);
    }
    let better = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| blanks(row) < first_blanks);
    Some(better.unwrap_or(0))
}

/// Sheet names of a workbook, in workbook order.
pub fn list_sheets(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let workbook = calamine::open_workbook_auto(path)?;
    Ok(workbook.sheet_names())
}

/// Table files inside a ZIP archive.
pub fn list_archive_members(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let archive = zip::ZipArchive::new(file)?;
    Ok(archive_tables(&archive))
}

fn archive_tables<R: Read + Seek>(archive: &zip::ZipArchive<R>) -> Vec<String> {
    archive
        .file_names()
        .filter(|name| is_table_member(name))
        .map(str::to_string)
        .collect()
}

fn is_table_member(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let lower = name.to_lowercase();
    !name.ends_with('/')
        && !name.starts_with("__MACOSX/")
        && !file_name.is_empty()
        && !file_name.starts_with('.')
        && (lower.ends_with(".csv") || lower.ends_with(".xlsx") || lower.ends_with(".xls"))
}

fn pick_member(members: &[String], wanted: Option<&str>) -> Result<String> {
    match (wanted, members) {
        (_, []) => Err(LabelError::EmptyArchive),
        (Some(w), _) => members
            .iter()
            .find(|m| *m == w || m.rsplit('/').next() == Some(w))
            .cloned()
            .ok_or_else(|| LabelError::MissingMember(w.to_string())),
        (None, [only]) => Ok(only.clone()),
        (None, _) => Err(LabelError::AmbiguousArchive(members.to_vec())),
    }
}

#[cfg(test)]
pub(crate) fn text_table(header: &[&str], rows: &[&[&str]]) -> TabularDataset {
    TabularDataset::new(
        header.iter().map(|h| h.to_string()).collect(),
        rows.iter()
            .map(|r| r.iter().map(|c| CellValue::from_text(c)).collect())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_duplicate_and_blank_headers() {
        let names = unique_column_names(vec![
            "Stop".into(),
            "".into(),
            "Qty".into(),
            "Qty".into(),
            "Qty".into(),
        ]);
        assert_eq!(names, vec!["Stop", "Unnamed: 1", "Qty", "Qty.1", "Qty.2"]);
    }

    #[test]
    fn test_number_display_drops_trailing_zero() {
        assert_eq!(CellValue::Number(777.0).to_string(), "777");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn test_csv_drops_blank_rows_and_pads_short_ones() {
        let data = b"Stop,Order Ref,Driver\n1,#555,Ann\n,,\n2,777\n";
        let table = read_csv(data).unwrap();
        assert_eq!(table.columns(), ["Stop", "Order Ref", "Driver"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1][2], CellValue::Empty);
    }

    #[test]
    fn test_csv_latin1_fallback() {
        let data = b"Name,Stop\nJos\xe9,1\n";
        let table = read_csv(data).unwrap();
        assert_eq!(table.rows()[0][0], CellValue::Text("José".into()));

        let euro = read_csv(b"Item,Price\nTip,\x805\n").unwrap();
        assert_eq!(euro.rows()[0][1], CellValue::Text("€5".into()));
    }

    #[test]
    fn test_empty_csv_is_an_error() {
        assert!(matches!(read_csv(b""), Err(LabelError::EmptyTable)));
    }

    #[test]
    fn test_header_row_skips_title_rows() {
        let rows = vec![
            vec![CellValue::Text("Run sheet".into()), CellValue::Empty, CellValue::Empty],
            vec![
                CellValue::Text("Stop".into()),
                CellValue::Text("Order".into()),
                CellValue::Text("Driver".into()),
            ],
            vec![CellValue::Number(1.0), CellValue::Text("A1".into()), CellValue::Empty],
        ];
        assert_eq!(best_header_row(&rows), Some(1));
        assert_eq!(best_header_row(&[]), None);
    }

    #[test]
    fn test_header_with_one_blank_cell_stays() {
        let text = |s: &str| CellValue::Text(s.into());
        let rows = vec![
            vec![text("Stop"), text("Order"), text("Driver"), CellValue::Empty],
            vec![CellValue::Number(1.0), text("A1"), text("Sam"), text("note")],
            vec![CellValue::Number(2.0), text("A2"), text("Sam"), text("note")],
        ];
        assert_eq!(best_header_row(&rows), Some(0));
    }

    #[test]
    fn test_generated_names_skip_existing_headers() {
        let names = unique_column_names(vec!["Qty".into(), "Qty.1".into(), "Qty".into()]);
        assert_eq!(names, vec!["Qty", "Qty.1", "Qty.2"]);

        let table = TabularDataset::new(names, vec![]);
        assert_eq!(table.column_index("Qty.2").unwrap(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_archive_member_filtering() {
        assert!(is_table_member("exports/run.csv"));
        assert!(is_table_member("orders.XLSX"));
        assert!(!is_table_member("__MACOSX/exports/run.csv"));
        assert!(!is_table_member("exports/.hidden.csv"));
        assert!(!is_table_member("exports/"));
        assert!(!is_table_member("notes.txt"));
    }

    #[test]
    fn test_pick_member() {
        let members = vec!["a/run.csv".to_string(), "b/orders.xlsx".to_string()];
        assert_eq!(pick_member(&members[..1], None).unwrap(), "a/run.csv");
        assert_eq!(pick_member(&members, Some("orders.xlsx")).unwrap(), "b/orders.xlsx");
        assert!(matches!(
            pick_member(&members, None),
            Err(LabelError::AmbiguousArchive(_))
        ));
        assert!(matches!(pick_member(&[], None), Err(LabelError::EmptyArchive)));
    }

    #[test]
    fn test_load_csv_from_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let opts = zip::write::SimpleFileOptions::default();
            zip.start_file("__MACOSX/run.csv", opts).unwrap();
            zip.write_all(b"junk").unwrap();
            zip.start_file("run.csv", opts).unwrap();
            zip.write_all(b"Stop,Order\n1,A-100\n").unwrap();
            zip.finish().unwrap();
        }

        let table = load_table(&path, &LoadOptions::default()).unwrap();
        assert_eq!(table.columns(), ["Stop", "Order"]);
        assert_eq!(table.rows()[0][1], CellValue::Text("A-100".into()));
    }

    #[test]
    fn test_select_columns_reorders() {
        let table = text_table(&["A", "B", "C"], &[&["1", "2", "3"]]);
        let picked = table.select_columns(&["C".into(), "A".into()]).unwrap();
        assert_eq!(picked.columns(), ["C", "A"]);
        assert_eq!(picked.rows()[0][0].to_string(), "3");
        assert!(table.select_columns(&["Z".into()]).is_err());
    }
}
