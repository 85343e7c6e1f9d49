//! Batch entry points.
//!
//! [`run`] loads the spreadsheet and the template once, then walks the
//! records strictly in sheet order: bind, render, save, convert. The first
//! error stops the batch; files written for earlier records are left in
//! place and later records are never touched.

use crate::config::{BatchConfig, DuplicatePolicy};
use crate::error::FlowError;
use crate::output::{BatchReport, Inspection, RecordOutput};
use crate::pipeline::pdf::{PdfConverter, SofficeConverter};
use crate::pipeline::record::Record;
use crate::pipeline::source::{self, SheetData};
use crate::pipeline::template::DocxTemplate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Merge every record of the source sheet into the template and convert
/// each result to PDF.
///
/// # Errors
/// Returns `Err(FlowError)` at the first failure:
/// - source or template missing / unreadable / malformed
/// - a record lacks a mapped column, or its identifier is unusable
/// - an output file cannot be written
/// - the converter fails, times out, or produces no PDF
pub async fn run(config: &BatchConfig) -> Result<BatchReport, FlowError> {
    let start = Instant::now();
    info!(
        "Starting batch: {} × {} → {}",
        config.source.display(),
        config.template.display(),
        config.output_dir.display()
    );

    // ── Step 1: Validate inputs ──────────────────────────────────────────
    check_readable(&config.source)?;
    check_readable(&config.template)?;

    // ── Step 2: Load template and records ────────────────────────────────
    let template = load_template(&config.template).await?;
    let sheet = load_sheet(config).await?;

    for name in template.placeholders() {
        if config.mapping.column_for(name).is_none() {
            warn!("Template placeholder '{}' has no bound column", name);
        }
    }

    // ── Step 3: Prepare output ───────────────────────────────────────────
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| FlowError::OutputWriteFailed {
            path: config.output_dir.clone(),
            source: e,
        })?;

    let converter = if config.skip_pdf {
        None
    } else {
        Some(resolve_converter(config)?)
    };

    // ── Step 4: Process records in order ─────────────────────────────────
    let records = process_records(
        &sheet.records,
        &template,
        config,
        converter.as_deref(),
    )
    .await?;

    let docx_written = records.iter().filter(|r| !r.overwrote).count();
    let pdf_written = records
        .iter()
        .filter(|r| !r.overwrote && r.pdf_path.is_some())
        .count();

    let report = BatchReport {
        sheet: sheet.sheet,
        output_dir: config.output_dir.clone(),
        records,
        docx_written,
        pdf_written,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {} records, {}ms",
        report.records.len(),
        report.duration_ms
    );
    Ok(report)
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(config: &BatchConfig) -> Result<BatchReport, FlowError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlowError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(config))
}

/// Read the sheet headers and the template placeholders without writing
/// anything, and report how they line up with the mapping.
pub async fn inspect(config: &BatchConfig) -> Result<Inspection, FlowError> {
    check_readable(&config.source)?;
    check_readable(&config.template)?;

    let template = load_template(&config.template).await?;
    let sheet = load_sheet(config).await?;

    let mut wanted: Vec<&str> = config
        .mapping
        .bindings()
        .iter()
        .map(|b| b.column.as_str())
        .collect();
    wanted.push(config.id_column.as_str());
    let mut missing_columns: Vec<String> = Vec::new();
    for column in wanted {
        if !sheet.headers.iter().any(|h| h == column)
            && !missing_columns.iter().any(|m| m == column)
        {
            missing_columns.push(column.to_string());
        }
    }

    let unbound_placeholders = template
        .placeholders()
        .iter()
        .filter(|p| config.mapping.column_for(p).is_none())
        .cloned()
        .collect();

    Ok(Inspection {
        sheet: sheet.sheet,
        headers: sheet.headers,
        record_count: sheet.records.len(),
        placeholders: template.placeholders().iter().cloned().collect(),
        missing_columns,
        unbound_placeholders,
    })
}

/// Bind, render, save and convert each record, in order.
///
/// Exposed so callers holding records from another source can reuse the
/// loop; [`run`] calls it with the rows of the configured sheet.
pub async fn process_records(
    records: &[Record],
    template: &DocxTemplate,
    config: &BatchConfig,
    converter: Option<&dyn PdfConverter>,
) -> Result<Vec<RecordOutput>, FlowError> {
    let mut outputs = Vec::with_capacity(records.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for record in records {
        let ctx = config
            .mapping
            .bind(record, &config.id_column, config.allow_blank_fields)?;

        let overwrote = match seen.get(&ctx.identifier) {
            Some(&first_row) => match config.duplicates {
                DuplicatePolicy::Reject => {
                    return Err(FlowError::DuplicateIdentifier {
                        identifier: ctx.identifier,
                        first_row,
                        row: record.row,
                    })
                }
                DuplicatePolicy::Overwrite => {
                    warn!(
                        "Row {}: identifier '{}' repeats row {}; overwriting its output",
                        record.row, ctx.identifier, first_row
                    );
                    true
                }
            },
            None => {
                seen.insert(ctx.identifier.clone(), record.row);
                false
            }
        };

        let rendered = template.render(&ctx)?;
        let docx_path = config.output_dir.join(format!("{}.docx", ctx.identifier));
        rendered.save(&docx_path)?;
        debug!("Row {}: wrote {}", record.row, docx_path.display());

        let pdf_path = match converter {
            Some(c) => Some(c.convert(&docx_path, &config.output_dir).await?),
            None => None,
        };

        info!("Row {}: '{}' done", record.row, ctx.identifier);
        outputs.push(RecordOutput {
            row: record.row,
            identifier: ctx.identifier,
            docx_path,
            pdf_path,
            overwrote,
        });
    }

    Ok(outputs)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Fail early with a precise error if `path` is missing or unreadable.
fn check_readable(path: &Path) -> Result<(), FlowError> {
    if !path.exists() {
        return Err(FlowError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(FlowError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(FlowError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

async fn load_template(path: &Path) -> Result<DocxTemplate, FlowError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || DocxTemplate::open(&path))
        .await
        .map_err(|e| FlowError::Internal(format!("Template task panicked: {}", e)))?
}

async fn load_sheet(config: &BatchConfig) -> Result<SheetData, FlowError> {
    let path = config.source.clone();
    let sheet = config.sheet.clone();
    let date_format = config.date_format.clone();
    tokio::task::spawn_blocking(move || {
        source::read_records(&path, sheet.as_deref(), &date_format)
    })
    .await
    .map_err(|e| FlowError::Internal(format!("Spreadsheet task panicked: {}", e)))?
}

/// Use the injected converter if present, otherwise build a soffice one.
fn resolve_converter(config: &BatchConfig) -> Result<Arc<dyn PdfConverter>, FlowError> {
    if let Some(ref converter) = config.converter {
        return Ok(Arc::clone(converter));
    }
    let soffice = SofficeConverter::new(
        config.soffice_program.clone(),
        config.convert_timeout_secs,
        config.isolated_profile,
    )?;
    Ok(Arc::new(soffice))
}
