//! Spreadsheet input: read one worksheet into [`Record`]s via calamine.
//!
//! The first non-empty row of the sheet's used range is the header. Every
//! later row that has at least one non-blank cell becomes a record, in sheet
//! order. Cells are converted to text here so the rest of the pipeline only
//! deals with strings.

use crate::error::FlowError;
use crate::pipeline::record::{CellText, Record};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rows read from a sheet, plus the header for diagnostics.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub sheet: String,
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

/// Open `path`, pick `sheet` (or the first sheet) and read all records.
///
/// Blocking: call through `spawn_blocking` from async code.
pub fn read_records(
    path: &Path,
    sheet: Option<&str>,
    date_format: &str,
) -> Result<SheetData, FlowError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| FlowError::Spreadsheet {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let available = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(name) => {
            if !available.iter().any(|s| s == name) {
                return Err(FlowError::SheetNotFound {
                    sheet: name.to_string(),
                    available,
                });
            }
            name.to_string()
        }
        None => available.first().cloned().ok_or_else(|| FlowError::EmptySheet {
            path: path.to_path_buf(),
        })?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| FlowError::Spreadsheet {
            path: path.to_path_buf(),
            detail: format!("sheet '{}': {}", sheet_name, e),
        })?;

    let (headers, records) = records_from_range(&range, date_format, path.to_path_buf())?;
    info!(
        "Read {} records from sheet '{}' ({} columns)",
        records.len(),
        sheet_name,
        headers.len()
    );

    Ok(SheetData {
        sheet: sheet_name,
        headers,
        records,
    })
}

/// Split a worksheet range into header names and records.
fn records_from_range(
    range: &Range<Data>,
    date_format: &str,
    path: PathBuf,
) -> Result<(Vec<String>, Vec<Record>), FlowError> {
    // Range::start() is the absolute (row, col) of the used area, 0-based.
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let mut rows = range.rows().enumerate();

    let headers: Vec<String> = loop {
        match rows.next() {
            Some((_, row)) if row.iter().all(is_blank) => continue,
            Some((_, row)) => {
                break row
                    .iter()
                    .map(|c| cell_text(c, date_format).map(into_plain).unwrap_or_default())
                    .collect()
            }
            None => return Err(FlowError::EmptySheet { path }),
        }
    };
    debug!("Header: {:?}", headers);

    let mut records = Vec::new();
    for (offset, row) in rows {
        if row.iter().all(is_blank) {
            continue;
        }
        let mut record = Record::new(first_row + offset + 1);
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() {
                continue;
            }
            if let Some(text) = cell_text(cell, date_format) {
                record.insert(header.clone(), text);
            }
        }
        records.push(record);
    }

    Ok((headers, records))
}

fn into_plain(text: CellText) -> String {
    match text {
        CellText::Value(v) | CellText::Error(v) => v,
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render one cell as text. Returns None for blank cells.
pub fn cell_text(cell: &Data, date_format: &str) -> Option<CellText> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.to_string()
        }
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => match format_datetime(ndt, date_format) {
                Ok(text) => text,
                Err(_) => {
                    return Some(CellText::Error(format!(
                        "date cannot be formatted with '{date_format}'"
                    )))
                }
            },
            None => format_number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => return Some(CellText::Error(e.to_string())),
    };
    Some(CellText::Value(text))
}

/// Whole numbers print without a fractional part (`30.0` → `30`).
///
/// Spreadsheets store every number as a float, so an age of 30 or a
/// sequence number of 1 would otherwise appear as `30.0` / `1.0`.
pub fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Format a date cell; the time is appended only when it is not midnight.
///
/// Fails instead of panicking when `date_format` holds an unknown specifier.
pub fn format_datetime(dt: NaiveDateTime, date_format: &str) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write!(out, "{}", dt.format(date_format))?;
    if dt.time() != NaiveTime::MIN {
        write!(out, " {}", dt.format("%H:%M:%S"))?;
    }
    Ok(out)
}
