//! Result types returned by a batch run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one processed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutput {
    /// 1-based worksheet row.
    pub row: usize,
    /// File stem used for the outputs.
    pub identifier: String,
    pub docx_path: PathBuf,
    /// None when PDF conversion was skipped.
    pub pdf_path: Option<PathBuf>,
    /// True when this record replaced the output of an earlier row.
    pub overwrote: bool,
}

/// Summary of a completed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub sheet: String,
    pub output_dir: PathBuf,
    pub records: Vec<RecordOutput>,
    pub docx_written: usize,
    pub pdf_written: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    /// The one-line completion message printed by the CLI.
    pub fn summary_line(&self) -> String {
        if self.records.is_empty() {
            return format!(
                "No records found; nothing written to {}",
                self.output_dir.display()
            );
        }
        let count = self.records.len();
        format!(
            "Done: {} {}, {} DOCX and {} PDF files in {} ({}ms)",
            count,
            if count == 1 { "record" } else { "records" },
            self.docx_written,
            self.pdf_written,
            self.output_dir.display(),
            self.duration_ms
        )
    }
}

/// What `inspect` found in the inputs, without writing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub sheet: String,
    pub headers: Vec<String>,
    pub record_count: usize,
    pub placeholders: Vec<String>,
    /// Mapped columns that do not appear in the header row.
    pub missing_columns: Vec<String>,
    /// Template placeholders with no binding in the mapping.
    pub unbound_placeholders: Vec<String>,
}
