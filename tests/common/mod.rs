//! Shared fixtures for the integration tests.
//!
//! Workbooks and templates are assembled in-process with `zip`, so the tests
//! need no binary fixtures and no office suite.

#![allow(dead_code)]

use futures::future::BoxFuture;
use resultflow::pipeline::pdf::expected_pdf_path;
use resultflow::{FlowError, PdfConverter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// The ten header names of the default field mapping, in sheet order.
pub const HEADERS: [&str; 10] = [
    "TT",
    "Họ và tên",
    "Tuổi",
    "GT",
    "Điện thoại",
    "Chẩn đoán",
    "Đơn vị yêu cầu",
    "Ngày lấy mẫu",
    "Ngày thực hiện XN",
    "Kết quả",
];

/// One worksheet cell.
#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    Blank,
}

pub fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

pub fn header_row() -> Vec<Cell> {
    HEADERS.iter().map(|h| text(h)).collect()
}

/// A complete patient row; `tt` is stored as a number like Excel does.
pub fn patient_row(tt: f64, name: &str, result: &str) -> Vec<Cell> {
    vec![
        Cell::Number(tt),
        text(name),
        Cell::Number(30.0),
        text("Nam"),
        text("0900000000"),
        text("Viêm gan B"),
        text("Khoa Nội"),
        text("2024-01-01"),
        text("2024-01-02"),
        text(result),
    ]
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

fn write_package(path: &Path, parts: &[(&str, String)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Write a single-sheet `.xlsx` workbook. Strings go through the shared
/// string table; blank cells are omitted from the sheet XML.
pub fn write_xlsx(path: &Path, sheet_name: &str, rows: &[Vec<Cell>]) {
    let mut shared: Vec<String> = Vec::new();
    let mut sheet_rows = String::new();

    for (r, row) in rows.iter().enumerate() {
        let row_no = r + 1;
        sheet_rows.push_str(&format!(r#"<row r="{row_no}">"#));
        for (c, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", column_letter(c), row_no);
            match cell {
                Cell::Text(s) => {
                    let idx = match shared.iter().position(|x| x == s) {
                        Some(i) => i,
                        None => {
                            shared.push(s.clone());
                            shared.len() - 1
                        }
                    };
                    sheet_rows.push_str(&format!(r#"<c r="{cell_ref}" t="s"><v>{idx}</v></c>"#));
                }
                Cell::Number(n) => {
                    sheet_rows.push_str(&format!(r#"<c r="{cell_ref}"><v>{n}</v></c>"#));
                }
                Cell::Blank => {}
            }
        }
        sheet_rows.push_str("</row>");
    }

    let sst_items: String = shared
        .iter()
        .map(|s| format!("<si><t>{}</t></si>", escape(s)))
        .collect();

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#
                .to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
                escape(sheet_name)
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_rows}</sheetData></worksheet>"#
            ),
        ),
        (
            "xl/sharedStrings.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{n}" uniqueCount="{n}">{sst_items}</sst>"#,
                n = shared.len()
            ),
        ),
    ];
    write_package(path, &parts);
}

/// Write a minimal `.docx` whose body holds one paragraph per entry.
/// Each entry is raw run XML, so callers can split placeholders across runs.
pub fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p>{p}</w:p>"))
        .collect();

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#
                .to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "word/document.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
            ),
        ),
    ];
    write_package(path, &parts);
}

/// A single-run paragraph.
pub fn text_run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

/// The lab-result template: every field of the default mapping.
pub fn write_result_template(path: &Path) {
    let lines = [
        text_run("PHIẾU KẾT QUẢ XÉT NGHIỆM"),
        text_run("Số: {{ TT }}"),
        text_run("Họ và tên: {{ HoVaTen }}"),
        text_run("Tuổi: {{ Tuoi }}  Giới tính: {{ GT }}"),
        text_run("Điện thoại: {{ DienThoai }}"),
        text_run("Chẩn đoán: {{ ChanDoan }}"),
        text_run("Đơn vị yêu cầu: {{ DonViYeuCau }}"),
        text_run("Ngày lấy mẫu: {{ NgayLayMau }}"),
        text_run("Ngày thực hiện XN: {{ NgayThucHienXN }}"),
        text_run("Kết quả: {{ KetQua }}"),
    ];
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_docx(path, &refs);
}

/// Converter double: writes a tiny `%PDF` file named like soffice would and
/// records every DOCX it was asked to convert.
#[derive(Default)]
pub struct FakeConverter {
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
}

impl FakeConverter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl PdfConverter for FakeConverter {
    fn name(&self) -> &str {
        "fake"
    }

    fn convert<'a>(
        &'a self,
        docx: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, FlowError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(docx.to_path_buf());
            assert!(docx.exists(), "converter called before DOCX was saved");
            let pdf = expected_pdf_path(docx, out_dir);
            tokio::fs::write(&pdf, b"%PDF-1.4\n%fake\n").await.unwrap();
            Ok(pdf)
        })
    }
}

/// Converter that fails on the n-th call (1-based) and succeeds otherwise.
pub struct FailingConverter {
    pub fail_on: usize,
    inner: FakeConverter,
}

impl FailingConverter {
    pub fn new(fail_on: usize) -> Self {
        Self {
            fail_on,
            inner: FakeConverter::default(),
        }
    }
}

impl PdfConverter for FailingConverter {
    fn name(&self) -> &str {
        "failing"
    }

    fn convert<'a>(
        &'a self,
        docx: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, FlowError>> {
        Box::pin(async move {
            if self.inner.calls() + 1 == self.fail_on {
                self.inner.calls.fetch_add(1, Ordering::SeqCst);
                return Err(FlowError::ConversionFailed {
                    path: docx.to_path_buf(),
                    status: "exit status: 1".into(),
                    stderr: "Error: source file could not be loaded".into(),
                });
            }
            self.inner.convert(docx, out_dir).await
        })
    }
}
