//! CLI binary for resultflow.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use resultflow::{inspect, run, BatchConfig, DuplicatePolicy};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge every row and convert to PDF
  resultflow -s patients.xlsx -t "KQ XN.docx" -o results/

  # DOCX only, no LibreOffice needed
  resultflow -s patients.xlsx -t template.docx -o results/ --no-pdf

  # Check columns and placeholders before a run
  resultflow -s patients.xlsx -t template.docx -o results/ --inspect-only

  # Bind an extra placeholder and use day-first dates
  resultflow -s data.xlsx -t t.docx -o out/ --field GhiChu="Ghi chú" --date-format %d/%m/%Y

DEFAULT FIELD MAPPING (placeholder = column):
  TT = TT                      HoVaTen = Họ và tên
  Tuoi = Tuổi                  GT = GT
  DienThoai = Điện thoại       ChanDoan = Chẩn đoán
  DonViYeuCau = Đơn vị yêu cầu NgayLayMau = Ngày lấy mẫu
  NgayThucHienXN = Ngày thực hiện XN
  KetQua = Kết quả

ENVIRONMENT VARIABLES:
  RESULTFLOW_SOURCE       Spreadsheet path
  RESULTFLOW_TEMPLATE     DOCX template path
  RESULTFLOW_OUTPUT_DIR   Output directory
  RESULTFLOW_SOFFICE      LibreOffice executable (default: soffice)
  RUST_LOG                Override log filter (e.g. resultflow=debug)
"#;

/// Merge spreadsheet rows into a DOCX template and convert each to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "resultflow",
    version,
    about = "Merge spreadsheet rows into a DOCX template and convert each to PDF",
    long_about = "Reads one record per spreadsheet row, fills the {{ placeholders }} of a DOCX \
template with the record's columns, saves <id>.docx and converts it to <id>.pdf with \
LibreOffice running headless.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Spreadsheet with a header row (.xlsx, .xls, .xlsb, .ods).
    #[arg(short, long, env = "RESULTFLOW_SOURCE")]
    source: PathBuf,

    /// DOCX template containing {{ Placeholder }} expressions.
    #[arg(short, long, env = "RESULTFLOW_TEMPLATE")]
    template: PathBuf,

    /// Directory receiving <id>.docx and <id>.pdf.
    #[arg(short, long, env = "RESULTFLOW_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Worksheet name (default: first sheet).
    #[arg(long, env = "RESULTFLOW_SHEET")]
    sheet: Option<String>,

    /// Column whose value names the output files.
    #[arg(long, env = "RESULTFLOW_ID_COLUMN", default_value = resultflow::config::DEFAULT_ID_COLUMN)]
    id_column: String,

    /// Bind a placeholder to a column: PLACEHOLDER=COLUMN (repeatable).
    #[arg(long = "field", value_name = "PLACEHOLDER=COLUMN")]
    fields: Vec<String>,

    /// Treat blank or missing cells as empty text instead of failing the row.
    #[arg(long, env = "RESULTFLOW_ALLOW_BLANK")]
    allow_blank: bool,

    /// Fail when two rows share an identifier instead of overwriting.
    #[arg(long, env = "RESULTFLOW_REJECT_DUPLICATES")]
    reject_duplicates: bool,

    /// strftime format for date cells.
    #[arg(long, env = "RESULTFLOW_DATE_FORMAT", default_value = resultflow::config::DEFAULT_DATE_FORMAT)]
    date_format: String,

    /// Write DOCX files only; skip PDF conversion.
    #[arg(long, env = "RESULTFLOW_NO_PDF")]
    no_pdf: bool,

    /// LibreOffice executable.
    #[arg(long, env = "RESULTFLOW_SOFFICE", default_value = "soffice")]
    soffice: String,

    /// Per-document conversion timeout in seconds.
    #[arg(long, env = "RESULTFLOW_CONVERT_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    convert_timeout: u64,

    /// Use the default LibreOffice user profile instead of a throwaway one.
    #[arg(long, env = "RESULTFLOW_SHARED_PROFILE")]
    shared_profile: bool,

    /// Output the batch report as JSON instead of a summary line.
    #[arg(long, env = "RESULTFLOW_JSON")]
    json: bool,

    /// Report headers, placeholders and mapping gaps; write nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RESULTFLOW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RESULTFLOW_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || cli.json {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let report = inspect(&config).await.context("Failed to inspect inputs")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise inspection")?
            );
        } else {
            println!("Sheet:         {}", report.sheet);
            println!("Records:       {}", report.record_count);
            println!("Columns:       {}", report.headers.join(" | "));
            println!("Placeholders:  {}", report.placeholders.join(", "));
            if !report.missing_columns.is_empty() {
                println!(
                    "{}  {}",
                    yellow("Missing columns:"),
                    report.missing_columns.join(", ")
                );
            }
            if !report.unbound_placeholders.is_empty() {
                println!(
                    "{}  {}",
                    yellow("Unbound placeholders:"),
                    report.unbound_placeholders.join(", ")
                );
            }
        }
        return Ok(());
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let report = run(&config).await.context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        println!("{} {}", green("✔"), bold(&report.summary_line()));
    }

    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder(&cli.source, &cli.template, &cli.output_dir)
        .id_column(cli.id_column.clone())
        .allow_blank_fields(cli.allow_blank)
        .duplicates(if cli.reject_duplicates {
            DuplicatePolicy::Reject
        } else {
            DuplicatePolicy::Overwrite
        })
        .date_format(cli.date_format.clone())
        .skip_pdf(cli.no_pdf)
        .soffice_program(cli.soffice.clone())
        .convert_timeout_secs(cli.convert_timeout)
        .isolated_profile(!cli.shared_profile);

    if let Some(ref sheet) = cli.sheet {
        builder = builder.sheet(sheet.clone());
    }

    for pair in &cli.fields {
        let (placeholder, column) = parse_field(pair)?;
        builder = builder.field(placeholder, column);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--field PLACEHOLDER=COLUMN`.
fn parse_field(s: &str) -> Result<(String, String)> {
    let (placeholder, column) = s
        .split_once('=')
        .with_context(|| format!("Invalid --field '{s}': expected PLACEHOLDER=COLUMN"))?;
    let placeholder = placeholder.trim();
    let column = column.trim();

    if placeholder.is_empty() || column.is_empty() {
        anyhow::bail!("Invalid --field '{}': placeholder and column must be non-empty", s);
    }
    if !placeholder
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || placeholder.starts_with(|c: char| c.is_ascii_digit())
    {
        anyhow::bail!(
            "Invalid placeholder '{}': use letters, digits and '_' (not starting with a digit)",
            placeholder
        );
    }

    Ok((placeholder.to_string(), column.to_string()))
}
