//! Records and their binding into a template context.
//!
//! A [`Record`] is one spreadsheet row keyed by header text. Binding it
//! through a [`FieldMapping`] yields a [`RecordContext`]: the values the
//! template will see, plus the identifier that names the output files.

use crate::config::FieldMapping;
use crate::error::FlowError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Value of a cell after conversion to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellText {
    /// Ordinary value, already formatted.
    Value(String),
    /// The spreadsheet stores an error here (`#N/A`, `#DIV/0!`, …).
    Error(String),
}

/// One data row of the source sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based row number in the worksheet, as shown by spreadsheet apps.
    pub row: usize,
    fields: BTreeMap<String, CellText>,
}

impl Record {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            fields: BTreeMap::new(),
        }
    }

    /// Set a non-blank cell. Blank cells are simply never inserted.
    pub fn insert(&mut self, column: impl Into<String>, value: CellText) {
        self.fields.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&CellText> {
        self.fields.get(column)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convenience constructor for plain text rows.
    pub fn from_pairs<C, V>(row: usize, pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::new(row);
        for (column, value) in pairs {
            record.insert(column, CellText::Value(value.into()));
        }
        record
    }

    /// Text of `column`, failing on absent/blank cells unless `allow_blank`.
    fn text(&self, column: &str, allow_blank: bool) -> Result<String, FlowError> {
        match self.fields.get(column) {
            Some(CellText::Value(v)) => Ok(v.clone()),
            Some(CellText::Error(e)) => Err(FlowError::CellError {
                row: self.row,
                column: column.to_string(),
                detail: e.clone(),
            }),
            None if allow_blank => Ok(String::new()),
            None => Err(FlowError::MissingField {
                row: self.row,
                column: column.to_string(),
            }),
        }
    }
}

/// Placeholder values for one record plus its output identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordContext {
    pub row: usize,
    /// Sanitised file stem, e.g. `12` for `12.docx`.
    pub identifier: String,
    pub values: BTreeMap<String, String>,
}

impl RecordContext {
    /// Convert into a tera context. Values are inserted as strings.
    pub fn to_tera(&self) -> tera::Context {
        let mut ctx = tera::Context::new();
        for (placeholder, value) in &self.values {
            ctx.insert(placeholder.as_str(), value);
        }
        ctx
    }
}

impl FieldMapping {
    /// Bind a record through this mapping.
    ///
    /// Bindings are resolved in mapping order, so the first unusable column
    /// named in the mapping is the one reported. The identifier column is
    /// always required, even with `allow_blank`.
    pub fn bind(
        &self,
        record: &Record,
        id_column: &str,
        allow_blank: bool,
    ) -> Result<RecordContext, FlowError> {
        let mut values = BTreeMap::new();
        for binding in self.bindings() {
            let value = record.text(&binding.column, allow_blank)?;
            values.insert(binding.placeholder.clone(), value);
        }

        let raw_id = record.text(id_column, false)?;
        let identifier = sanitize_identifier(&raw_id).ok_or(FlowError::InvalidIdentifier {
            row: record.row,
            value: raw_id.clone(),
        })?;

        Ok(RecordContext {
            row: record.row,
            identifier,
            values,
        })
    }
}

static RE_UNSAFE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]+"#).unwrap());

/// Turn an identifier cell into a file stem.
///
/// Path separators and characters Windows refuses in file names become `_`;
/// leading/trailing whitespace and dots are stripped. Returns None when
/// nothing usable is left (empty, `.`, `..`).
pub fn sanitize_identifier(raw: &str) -> Option<String> {
    let replaced = RE_UNSAFE_FILENAME.replace_all(raw.trim(), "_");
    let stem = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if stem.is_empty() || stem.chars().all(|c| c == '_') {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_row(row: usize) -> Record {
        Record::from_pairs(
            row,
            [
                ("TT", "1"),
                ("Họ và tên", "Nguyen Van A"),
                ("Tuổi", "30"),
                ("GT", "Nam"),
                ("Điện thoại", "0900000000"),
                ("Chẩn đoán", "Binh thuong"),
                ("Đơn vị yêu cầu", "Benh vien X"),
                ("Ngày lấy mẫu", "2024-01-01"),
                ("Ngày thực hiện XN", "2024-01-02"),
                ("Kết quả", "Am tinh"),
            ],
        )
    }

    #[test]
    fn bind_default_mapping() {
        let ctx = FieldMapping::default()
            .bind(&full_row(2), "TT", false)
            .unwrap();
        assert_eq!(ctx.identifier, "1");
        assert_eq!(ctx.row, 2);
        assert_eq!(ctx.values.len(), 10);
        assert_eq!(ctx.values["HoVaTen"], "Nguyen Van A");
        assert_eq!(ctx.values["KetQua"], "Am tinh");
    }

    #[test]
    fn bind_missing_column_names_row_and_column() {
        let mut record = full_row(5);
        record.fields.remove("Kết quả");
        let err = FieldMapping::default()
            .bind(&record, "TT", false)
            .unwrap_err();
        match err {
            FlowError::MissingField { row, column } => {
                assert_eq!(row, 5);
                assert_eq!(column, "Kết quả");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bind_allow_blank_fills_empty_string() {
        let mut record = full_row(3);
        record.fields.remove("Điện thoại");
        let ctx = FieldMapping::default().bind(&record, "TT", true).unwrap();
        assert_eq!(ctx.values["DienThoai"], "");
    }

    #[test]
    fn bind_identifier_required_even_when_blank_allowed() {
        let mut record = full_row(3);
        record.fields.remove("TT");
        let err = FieldMapping::default().bind(&record, "TT", true).unwrap_err();
        assert!(matches!(err, FlowError::MissingField { .. }));
    }

    #[test]
    fn bind_error_cell_is_reported() {
        let mut record = full_row(4);
        record.insert("Tuổi", CellText::Error("#VALUE!".into()));
        let err = FieldMapping::default()
            .bind(&record, "TT", false)
            .unwrap_err();
        assert!(matches!(err, FlowError::CellError { row: 4, .. }));
    }

    #[test]
    fn sanitize_identifier_rules() {
        assert_eq!(sanitize_identifier("12"), Some("12".into()));
        assert_eq!(sanitize_identifier("  BN-07 "), Some("BN-07".into()));
        assert_eq!(sanitize_identifier("a/b\\c"), Some("a_b_c".into()));
        assert_eq!(sanitize_identifier("../etc"), Some("_etc".into()));
        assert_eq!(sanitize_identifier(".."), None);
        assert_eq!(sanitize_identifier("   "), None);
        assert_eq!(sanitize_identifier("///"), None);
    }

    #[test]
    fn to_tera_contains_all_values() {
        let ctx = FieldMapping::default()
            .bind(&full_row(2), "TT", false)
            .unwrap();
        let tera_ctx = ctx.to_tera();
        assert_eq!(
            tera_ctx.get("GT").and_then(|v| v.as_str()),
            Some("Nam")
        );
    }
}
