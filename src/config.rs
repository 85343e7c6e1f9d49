//! Configuration types for a merge-and-convert batch.
//!
//! Every input the batch needs is carried by [`BatchConfig`]: where the
//! spreadsheet and template live, where results go, how columns bind to
//! template placeholders, and how the PDF converter is invoked. Nothing is
//! read from hard-coded paths.
//!
//! Build it with [`BatchConfig::builder`]; only the three paths are
//! mandatory, everything else has a default.

use crate::error::FlowError;
use crate::pipeline::pdf::PdfConverter;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Column holding the record identifier in the default mapping.
pub const DEFAULT_ID_COLUMN: &str = "TT";

/// Default `strftime` format for date cells.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use resultflow::BatchConfig;
///
/// let config = BatchConfig::builder("patients.xlsx", "report.docx", "out/")
///     .sheet("Sheet1")
///     .convert_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.mapping.len(), 10);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Spreadsheet holding one record per row, header in the first row.
    pub source: PathBuf,

    /// DOCX template with `{{ Placeholder }}` expressions.
    pub template: PathBuf,

    /// Directory receiving `<id>.docx` and `<id>.pdf`. Created if missing.
    pub output_dir: PathBuf,

    /// Worksheet name. If None, the first sheet of the workbook is used.
    pub sheet: Option<String>,

    /// Placeholder ↔ column bindings. Default: [`FieldMapping::default`].
    pub mapping: FieldMapping,

    /// Column whose value names the output files. Default: `TT`.
    pub id_column: String,

    /// Bind blank or absent cells to an empty string instead of failing. Default: false.
    pub allow_blank_fields: bool,

    /// What to do when two rows share an identifier. Default: overwrite.
    pub duplicates: DuplicatePolicy,

    /// `strftime` format used for date cells. Default: `%Y-%m-%d`.
    ///
    /// When a date cell also carries a non-midnight time, ` %H:%M:%S` is
    /// appended.
    pub date_format: String,

    /// Only write DOCX files; never start the converter. Default: false.
    pub skip_pdf: bool,

    /// Office-suite executable used for PDF conversion. Default: `soffice`.
    pub soffice_program: String,

    /// Per-document conversion timeout in seconds. Default: 120.
    pub convert_timeout_secs: u64,

    /// Run soffice against a throwaway user profile. Default: true.
    ///
    /// A LibreOffice window already open on the same profile makes a headless
    /// `--convert-to` call return immediately without converting anything.
    pub isolated_profile: bool,

    /// Pre-constructed converter. Takes precedence over the soffice settings.
    pub converter: Option<Arc<dyn PdfConverter>>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("source", &self.source)
            .field("template", &self.template)
            .field("output_dir", &self.output_dir)
            .field("sheet", &self.sheet)
            .field("mapping", &self.mapping)
            .field("id_column", &self.id_column)
            .field("allow_blank_fields", &self.allow_blank_fields)
            .field("duplicates", &self.duplicates)
            .field("date_format", &self.date_format)
            .field("skip_pdf", &self.skip_pdf)
            .field("soffice_program", &self.soffice_program)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("isolated_profile", &self.isolated_profile)
            .field("converter", &self.converter.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl BatchConfig {
    /// Create a builder for the three mandatory paths.
    pub fn builder(
        source: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: BatchConfig {
                source: source.into(),
                template: template.into(),
                output_dir: output_dir.into(),
                sheet: None,
                mapping: FieldMapping::default(),
                id_column: DEFAULT_ID_COLUMN.to_string(),
                allow_blank_fields: false,
                duplicates: DuplicatePolicy::default(),
                date_format: DEFAULT_DATE_FORMAT.to_string(),
                skip_pdf: false,
                soffice_program: "soffice".to_string(),
                convert_timeout_secs: 120,
                isolated_profile: true,
                converter: None,
            },
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn sheet(mut self, name: impl Into<String>) -> Self {
        self.config.sheet = Some(name.into());
        self
    }

    pub fn mapping(mut self, mapping: FieldMapping) -> Self {
        self.config.mapping = mapping;
        self
    }

    /// Bind (or rebind) a single placeholder to a column.
    pub fn field(mut self, placeholder: impl Into<String>, column: impl Into<String>) -> Self {
        self.config.mapping.bind_column(placeholder, column);
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.config.id_column = column.into();
        self
    }

    pub fn allow_blank_fields(mut self, v: bool) -> Self {
        self.config.allow_blank_fields = v;
        self
    }

    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicates = policy;
        self
    }

    pub fn date_format(mut self, fmt: impl Into<String>) -> Self {
        self.config.date_format = fmt.into();
        self
    }

    pub fn skip_pdf(mut self, v: bool) -> Self {
        self.config.skip_pdf = v;
        self
    }

    pub fn soffice_program(mut self, program: impl Into<String>) -> Self {
        self.config.soffice_program = program.into();
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn isolated_profile(mut self, v: bool) -> Self {
        self.config.isolated_profile = v;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn PdfConverter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, FlowError> {
        let c = &self.config;
        if c.mapping.is_empty() {
            return Err(FlowError::InvalidConfig(
                "Field mapping must bind at least one placeholder".into(),
            ));
        }
        if c.id_column.trim().is_empty() {
            return Err(FlowError::InvalidConfig(
                "Identifier column must not be empty".into(),
            ));
        }
        if c.date_format.trim().is_empty() {
            return Err(FlowError::InvalidConfig(
                "Date format must not be empty".into(),
            ));
        }
        if StrftimeItems::new(&c.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(FlowError::InvalidConfig(format!(
                "Date format '{}' is not a valid strftime pattern",
                c.date_format
            )));
        }
        if c.convert_timeout_secs == 0 {
            return Err(FlowError::InvalidConfig(
                "Conversion timeout must be ≥ 1 second".into(),
            ));
        }
        if !c.skip_pdf && c.converter.is_none() && c.soffice_program.trim().is_empty() {
            return Err(FlowError::InvalidConfig(
                "soffice program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Field mapping ────────────────────────────────────────────────────────

/// One placeholder ↔ column binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    /// Name used inside the template, e.g. `HoVaTen` for `{{ HoVaTen }}`.
    pub placeholder: String,
    /// Header text of the spreadsheet column, e.g. `Họ và tên`.
    pub column: String,
}

/// Ordered set of bindings from spreadsheet columns to template placeholders.
///
/// Placeholders are unique; a column may feed several placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    bindings: Vec<FieldBinding>,
}

impl Default for FieldMapping {
    /// The ten laboratory-result fields: sequence number, full name, age,
    /// gender, phone, diagnosis, requesting unit, sample date, test date and
    /// result.
    fn default() -> Self {
        Self::from_pairs([
            ("TT", "TT"),
            ("HoVaTen", "Họ và tên"),
            ("Tuoi", "Tuổi"),
            ("GT", "GT"),
            ("DienThoai", "Điện thoại"),
            ("ChanDoan", "Chẩn đoán"),
            ("DonViYeuCau", "Đơn vị yêu cầu"),
            ("NgayLayMau", "Ngày lấy mẫu"),
            ("NgayThucHienXN", "Ngày thực hiện XN"),
            ("KetQua", "Kết quả"),
        ])
    }
}

impl FieldMapping {
    /// An empty mapping; use [`FieldMapping::bind_column`] to fill it.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Build a mapping from `(placeholder, column)` pairs. Later pairs win.
    pub fn from_pairs<P, C>(pairs: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        let mut mapping = Self::empty();
        for (placeholder, column) in pairs {
            mapping.bind_column(placeholder, column);
        }
        mapping
    }

    /// Bind `placeholder` to `column`, replacing any existing binding for it.
    pub fn bind_column(&mut self, placeholder: impl Into<String>, column: impl Into<String>) {
        let placeholder = placeholder.into();
        let column = column.into();
        match self
            .bindings
            .iter_mut()
            .find(|b| b.placeholder == placeholder)
        {
            Some(existing) => existing.column = column,
            None => self.bindings.push(FieldBinding {
                placeholder,
                column,
            }),
        }
    }

    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Column bound to `placeholder`, if any.
    pub fn column_for(&self, placeholder: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.placeholder == placeholder)
            .map(|b| b.column.as_str())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Behaviour when two rows resolve to the same output file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Later rows overwrite earlier outputs; a warning is logged. (default)
    #[default]
    Overwrite,
    /// Abort the batch with [`FlowError::DuplicateIdentifier`].
    Reject,
}
