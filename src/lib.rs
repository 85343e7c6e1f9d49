//! # resultflow
//!
//! Merge spreadsheet rows into a DOCX template and convert each merged
//! document to PDF with a headless office suite.
//!
//! One row in, one `<id>.docx` and one `<id>.pdf` out. Typical use is
//! printing a result sheet per patient, per student or per invoice from a
//! table maintained in Excel or LibreOffice Calc.
//!
//! ## Pipeline Overview
//!
//! ```text
//! spreadsheet + template.docx
//!  │
//!  ├─ 1. Source    read the sheet via calamine (header row + records)
//!  ├─ 2. Template  compile the DOCX text parts once (tera, run-split repair)
//!  ├─ 3. Bind      map columns to placeholders for one record
//!  ├─ 4. Render    new DOCX package per record, saved atomically
//!  └─ 5. Convert   soffice --headless --convert-to pdf, exit status checked
//! ```
//!
//! Records are processed one at a time in sheet order. The first failure
//! stops the batch and is returned as a [`FlowError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resultflow::{run, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder(
//!         "data/patients.xlsx",
//!         "data/result-template.docx",
//!         "data/results",
//!     )
//!     .build()?;
//!     let report = run(&config).await?;
//!     println!("{}", report.summary_line());
//!     Ok(())
//! }
//! ```
//!
//! ## Template syntax
//!
//! Placeholders use Jinja-style expressions, e.g. `{{ HoVaTen }}`. Filters
//! work as well (`{{ HoVaTen | upper }}`). Word may split an expression
//! across formatting runs; the template loader rejoins it.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resultflow` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchConfig, BatchConfigBuilder, DuplicatePolicy, FieldBinding, FieldMapping};
pub use convert::{inspect, process_records, run, run_sync};
pub use error::FlowError;
pub use output::{BatchReport, Inspection, RecordOutput};
pub use pipeline::pdf::{PdfConverter, SofficeConverter};
pub use pipeline::record::{Record, RecordContext};
pub use pipeline::template::{DocxTemplate, RenderedDocument};
