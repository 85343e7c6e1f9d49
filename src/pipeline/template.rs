//! DOCX templating: load a template package once, render it per record.
//!
//! A DOCX file is a ZIP package of XML parts. The parts that carry body
//! text (document, headers, footers, footnotes, endnotes) are repaired by
//! [`crate::pipeline::placeholders::repair`] and compiled into a single
//! [`tera::Tera`] instance when the template is opened. Rendering never
//! touches that state: each call produces a fresh [`RenderedDocument`]
//! holding the complete output package, so one template serves every record.
//!
//! Part names end in `.xml`, which tera autoescapes, so values such as
//! `A & B` or `<5` come out as valid XML.

use crate::error::FlowError;
use crate::pipeline::placeholders;
use crate::pipeline::record::RecordContext;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tera::Tera;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

static RE_TEXT_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^word/(?:document|header\d*|footer\d*|footnotes|endnotes)\.xml$").unwrap()
});

/// Whether a package entry holds body text that may contain placeholders.
pub fn is_text_part(name: &str) -> bool {
    RE_TEXT_PART.is_match(name)
}

/// One entry of the template package.
#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    is_dir: bool,
    /// Raw bytes for pass-through entries; empty for text parts, whose
    /// content lives in the tera instance under the same name.
    data: Vec<u8>,
    templated: bool,
}

/// A loaded, immutable DOCX template.
#[derive(Debug)]
pub struct DocxTemplate {
    path: PathBuf,
    entries: Vec<PackageEntry>,
    tera: Tera,
    placeholders: BTreeSet<String>,
    text: String,
}

impl DocxTemplate {
    /// Load a template from disk.
    ///
    /// Blocking: call through `spawn_blocking` from async code.
    pub fn open(path: &Path) -> Result<Self, FlowError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlowError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => FlowError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => FlowError::CorruptTemplate {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        })?;
        Self::from_bytes(path, &bytes)
    }

    /// Load a template from an in-memory package. `path` is used in errors only.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self, FlowError> {
        if bytes.len() < 4 || &bytes[..4] != b"PK\x03\x04" {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(FlowError::NotADocx {
                path: path.to_path_buf(),
                magic,
            });
        }

        let corrupt = |detail: String| FlowError::CorruptTemplate {
            path: path.to_path_buf(),
            detail,
        };

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
        let mut entries = Vec::with_capacity(archive.len());
        let mut tera = Tera::default();
        let mut placeholders = BTreeSet::new();
        let mut text = String::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let mut data = Vec::with_capacity(file.size() as usize);
            if !is_dir {
                file.read_to_end(&mut data)
                    .map_err(|e| corrupt(format!("{name}: {e}")))?;
            }

            if !is_dir && is_text_part(&name) {
                let xml = String::from_utf8(data)
                    .map_err(|_| corrupt(format!("{name} is not valid UTF-8")))?;
                let repaired = placeholders::repair(&xml);

                let part_text = placeholders::paragraph_text(&repaired)
                    .map_err(|e| corrupt(format!("{name}: {e}")))?;
                placeholders.extend(placeholders::variables(&part_text));
                if name == "word/document.xml" {
                    text = part_text;
                }

                tera.add_raw_template(&name, &repaired)
                    .map_err(|e| FlowError::TemplateParse {
                        part: name.clone(),
                        detail: tera_detail(&e),
                    })?;
                debug!("Compiled template part {}", name);

                entries.push(PackageEntry {
                    name,
                    is_dir,
                    data: Vec::new(),
                    templated: true,
                });
            } else {
                entries.push(PackageEntry {
                    name,
                    is_dir,
                    data,
                    templated: false,
                });
            }
        }

        if !entries.iter().any(|e| e.name == "word/document.xml") {
            return Err(corrupt("package has no word/document.xml".into()));
        }

        info!(
            "Loaded template {} ({} parts, {} placeholders)",
            path.display(),
            entries.len(),
            placeholders.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            tera,
            placeholders,
            text,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bare `{{ name }}` variables used anywhere in the template's text parts.
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    /// Body text of the template before rendering.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Render one record into a new DOCX package.
    pub fn render(&self, ctx: &RecordContext) -> Result<RenderedDocument, FlowError> {
        let tera_ctx = ctx.to_tera();
        let render_err = |detail: String| FlowError::TemplateRender {
            identifier: ctx.identifier.clone(),
            detail,
        };

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), options)
                    .map_err(|e| render_err(e.to_string()))?;
                continue;
            }

            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| render_err(e.to_string()))?;

            if entry.templated {
                let xml = self
                    .tera
                    .render(&entry.name, &tera_ctx)
                    .map_err(|e| render_err(tera_detail(&e)))?;
                zip.write_all(xml.as_bytes())
                    .map_err(|e| render_err(e.to_string()))?;
            } else {
                zip.write_all(&entry.data)
                    .map_err(|e| render_err(e.to_string()))?;
            }
        }

        let bytes = zip
            .finish()
            .map_err(|e| render_err(e.to_string()))?
            .into_inner();
        debug!("Rendered '{}' ({} bytes)", ctx.identifier, bytes.len());

        Ok(RenderedDocument { bytes })
    }
}

/// tera nests the useful message (e.g. "Variable `X` not found") in the
/// error's source chain; flatten it into one line.
fn tera_detail(e: &tera::Error) -> String {
    use std::error::Error as _;
    let mut detail = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        detail.push_str(": ");
        detail.push_str(&s.to_string());
        source = s.source();
    }
    detail
}

/// A rendered DOCX package, held in memory until saved.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    bytes: Vec<u8>,
}

impl RenderedDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the package to `path`.
    ///
    /// Uses atomic write (temp file + rename) so a reader never sees a
    /// half-written DOCX. An existing file at `path` is replaced.
    pub fn save(&self, path: &Path) -> Result<(), FlowError> {
        let write_err = |e: std::io::Error| FlowError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let tmp_path = path.with_extension("docx.tmp");
        std::fs::write(&tmp_path, &self.bytes).map_err(write_err)?;
        std::fs::rename(&tmp_path, path).map_err(write_err)?;
        Ok(())
    }

    /// Body text (`word/document.xml`), one line per paragraph.
    pub fn text(&self) -> Result<String, FlowError> {
        document_text(&self.bytes)
    }
}

/// Extract the body text of any DOCX package held in memory.
pub fn document_text(bytes: &[u8]) -> Result<String, FlowError> {
    let corrupt = |detail: String| FlowError::CorruptTemplate {
        path: PathBuf::from("<memory>"),
        detail,
    };
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
    let mut file = archive
        .by_name("word/document.xml")
        .map_err(|e| corrupt(e.to_string()))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| corrupt(e.to_string()))?;
    placeholders::paragraph_text(&xml).map_err(|e| corrupt(e.to_string()))
}
