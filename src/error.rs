use thiserror::Error;

/// Everything that can stop a run sheet from being loaded, a mapping from
/// being built, or a label PDF from being written.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("row {row}: stop number {value:?} in column '{column}' is not a number")]
    MalformedStopNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("column '{column}' not found (available: {})", available.join(", "))]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("archive contains several tables, pick one with --member: {}", .0.join(", "))]
    AmbiguousArchive(Vec<String>),

    #[error("no CSV or Excel files found in the archive")]
    EmptyArchive,

    #[error("archive member not found: {0}")]
    MissingMember(String),

    #[error("table has no header row")]
    EmptyTable,

    #[error("sheet not found: {0}")]
    MissingSheet(String),

    #[error("template '{0}' already exists")]
    TemplateExists(String),

    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("ZIP archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("could not write PDF: {0}")]
    PdfWrite(String),

    #[error("could not write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("settings file error: {0}")]
    TomlEdit(#[from] toml_edit::TomlError),
}

pub type Result<T> = std::result::Result<T, LabelError>;
