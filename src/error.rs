//! Error types for the resultflow library.
//!
//! A batch either completes or stops at the first failure, so there is a
//! single fatal error type, [`FlowError`]. Whatever was written for earlier
//! records stays on disk; the error names the row or file that stopped the
//! run so the caller can fix the data and rerun.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the resultflow library.
#[derive(Debug, Error)]
pub enum FlowError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source spreadsheet or template was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The template exists but is not a ZIP (OOXML) package.
    #[error("Template is not a DOCX package: '{path}'\nFirst bytes: {magic:?}")]
    NotADocx { path: PathBuf, magic: [u8; 4] },

    // ── Spreadsheet errors ────────────────────────────────────────────────
    /// calamine could not open or decode the workbook.
    #[error("Failed to read spreadsheet '{path}': {detail}")]
    Spreadsheet { path: PathBuf, detail: String },

    /// The requested worksheet does not exist.
    #[error("Sheet '{sheet}' not found. Available sheets: {}", .available.join(", "))]
    SheetNotFound {
        sheet: String,
        available: Vec<String>,
    },

    /// The worksheet has no header row.
    #[error("Spreadsheet '{path}' has no header row")]
    EmptySheet { path: PathBuf },

    /// A mapped column is absent or blank in a data row.
    #[error("Row {row}: required column '{column}' is missing or blank")]
    MissingField { row: usize, column: String },

    /// The spreadsheet stores an error value (`#DIV/0!`, `#REF!`, …) in a mapped cell.
    #[error("Row {row}: column '{column}' holds a spreadsheet error {detail}")]
    CellError {
        row: usize,
        column: String,
        detail: String,
    },

    /// The identifier column value cannot be used as a file name.
    #[error("Row {row}: identifier {value:?} cannot be used as an output file name")]
    InvalidIdentifier { row: usize, value: String },

    /// Two rows share an identifier and the duplicate policy is `Reject`.
    #[error("Row {row}: identifier '{identifier}' was already used by row {first_row}")]
    DuplicateIdentifier {
        identifier: String,
        first_row: usize,
        row: usize,
    },

    // ── Template errors ───────────────────────────────────────────────────
    /// A template part contains an expression tera cannot parse.
    #[error("Template part '{part}' could not be parsed: {detail}")]
    TemplateParse { part: String, detail: String },

    /// Rendering failed for one record (usually a placeholder with no value).
    #[error("Rendering '{identifier}' failed: {detail}")]
    TemplateRender { identifier: String, detail: String },

    /// The template package or one of its XML parts is structurally broken.
    #[error("Template '{path}' is corrupt: {detail}")]
    CorruptTemplate { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The office-suite executable could not be started.
    #[error(
        "Converter '{program}' could not be started.\n\
Install LibreOffice, or point --soffice at the soffice executable."
    )]
    ConverterNotFound { program: String },

    /// The converter exited with a non-zero status.
    #[error("PDF conversion of '{path}' failed ({status}): {stderr}")]
    ConversionFailed {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    /// The converter did not exit within the configured timeout.
    #[error("PDF conversion of '{path}' timed out after {secs}s\nIncrease --convert-timeout.")]
    ConversionTimeout { path: PathBuf, secs: u64 },

    /// The converter reported success but left no usable PDF behind.
    #[error("Converter exited cleanly but no PDF was produced at '{path}'")]
    PdfMissing { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
