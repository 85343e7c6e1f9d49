//! PDF conversion through an external office suite.
//!
//! [`PdfConverter`] is the seam between the batch loop and whatever turns a
//! DOCX into a PDF. The production implementation, [`SofficeConverter`],
//! runs LibreOffice headless:
//!
//! ```text
//! soffice --headless [-env:UserInstallation=file:///tmp/…] \
//!         --convert-to pdf --outdir <dir of docx> <docx>
//! ```
//!
//! The exit status is checked and the produced file is verified to start
//! with the `%PDF` magic bytes; a clean exit with nothing on disk is an
//! error, not a silent success.

use crate::error::FlowError;
use futures::future::BoxFuture;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Converts a saved DOCX into a PDF next to it.
///
/// Implementations must be `Send + Sync` so a converter can be shared
/// through [`crate::config::BatchConfig`].
pub trait PdfConverter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Convert `docx` and return the path of the PDF written into `out_dir`.
    fn convert<'a>(
        &'a self,
        docx: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, FlowError>>;
}

/// Path soffice writes for `docx` in `out_dir`: same stem, `.pdf` extension.
pub fn expected_pdf_path(docx: &Path, out_dir: &Path) -> PathBuf {
    // Not `with_extension`: a stem like `BN.07` must keep its inner dot.
    let mut name = docx.file_stem().unwrap_or(docx.as_os_str()).to_os_string();
    name.push(".pdf");
    out_dir.join(name)
}

/// Bytes escaped in the path of a `file://` URL. Non-ASCII is always escaped.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// `file://` URL for a local directory, as soffice expects for
/// `-env:UserInstallation`.
pub fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let encoded = utf8_percent_encode(&raw, PATH_SEGMENT).to_string();
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

/// Check that `path` exists and starts with `%PDF`.
pub async fn verify_pdf(path: &Path) -> Result<(), FlowError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(_) => {
            return Err(FlowError::PdfMissing {
                path: path.to_path_buf(),
            })
        }
    };
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(FlowError::PdfMissing {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// LibreOffice headless converter.
pub struct SofficeConverter {
    program: String,
    timeout: Duration,
    /// Kept alive for the converter's lifetime; deleted on drop.
    profile: Option<TempDir>,
}

impl SofficeConverter {
    /// Create a converter for `program` with a per-document timeout.
    ///
    /// With `isolated_profile`, soffice runs against a fresh user profile in
    /// a temporary directory that lives as long as the converter.
    pub fn new(
        program: impl Into<String>,
        timeout_secs: u64,
        isolated_profile: bool,
    ) -> Result<Self, FlowError> {
        let profile = if isolated_profile {
            Some(TempDir::new().map_err(|e| {
                FlowError::Internal(format!("Failed to create soffice profile dir: {e}"))
            })?)
        } else {
            None
        };
        Ok(Self {
            program: program.into(),
            timeout: Duration::from_secs(timeout_secs),
            profile,
        })
    }

    /// Command-line arguments for converting `docx` into `out_dir`.
    pub fn args(&self, docx: &Path, out_dir: &Path) -> Vec<String> {
        let mut args = vec!["--headless".to_string()];
        if let Some(ref profile) = self.profile {
            args.push(format!(
                "-env:UserInstallation={}",
                file_url(profile.path())
            ));
        }
        args.extend([
            "--convert-to".to_string(),
            "pdf".to_string(),
            "--outdir".to_string(),
            out_dir.display().to_string(),
            docx.display().to_string(),
        ]);
        args
    }

    async fn run(&self, docx: &Path, out_dir: &Path) -> Result<PathBuf, FlowError> {
        let args = self.args(docx, out_dir);
        debug!("Running {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    FlowError::ConverterNotFound {
                        program: self.program.clone(),
                    }
                }
                _ => FlowError::Internal(format!("Failed to start {}: {}", self.program, e)),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| FlowError::ConversionTimeout {
                path: docx.to_path_buf(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| FlowError::Internal(format!("Waiting for {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(FlowError::ConversionFailed {
                path: docx.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pdf = expected_pdf_path(docx, out_dir);
        verify_pdf(&pdf).await?;
        info!("Converted {} → {}", docx.display(), pdf.display());
        Ok(pdf)
    }
}

impl PdfConverter for SofficeConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn convert<'a>(
        &'a self,
        docx: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, FlowError>> {
        Box::pin(self.run(docx, out_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_pdf_path_replaces_extension() {
        assert_eq!(
            expected_pdf_path(Path::new("/out/12.docx"), Path::new("/out")),
            PathBuf::from("/out/12.pdf")
        );
        assert_eq!(
            expected_pdf_path(Path::new("/tmp/BN.07.docx"), Path::new("/pdf")),
            PathBuf::from("/pdf/BN.07.pdf")
        );
    }

    #[test]
    fn args_with_isolated_profile() {
        let c = SofficeConverter::new("soffice", 30, true).unwrap();
        let args = c.args(Path::new("/out/1.docx"), Path::new("/out"));
        assert_eq!(args[0], "--headless");
        assert!(args[1].starts_with("-env:UserInstallation=file:///"));
        assert_eq!(
            &args[2..],
            &["--convert-to", "pdf", "--outdir", "/out", "/out/1.docx"]
        );
    }

    #[test]
    fn file_url_escapes_spaces_and_non_ascii() {
        assert_eq!(file_url(Path::new("/tmp/.tmpAb12")), "file:///tmp/.tmpAb12");
        assert_eq!(
            file_url(Path::new("/home/Nguyễn Văn/tmp #1")),
            "file:///home/Nguy%E1%BB%85n%20V%C4%83n/tmp%20%231"
        );
        assert_eq!(
            file_url(Path::new(r"C:\Users\lab\Temp")),
            "file:///C:/Users/lab/Temp"
        );
    }

    #[test]
    fn args_with_shared_profile() {
        let c = SofficeConverter::new("soffice", 30, false).unwrap();
        let args = c.args(Path::new("/out/1.docx"), Path::new("/out"));
        assert_eq!(
            args,
            vec!["--headless", "--convert-to", "pdf", "--outdir", "/out", "/out/1.docx"]
        );
    }

    #[test]
    fn verify_pdf_checks_magic() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&good, b"%PDF-1.7\n").unwrap();
        std::fs::write(&bad, b"<html>").unwrap();

        tokio_test::block_on(async {
            assert!(verify_pdf(&good).await.is_ok());
            assert!(matches!(
                verify_pdf(&bad).await,
                Err(FlowError::PdfMissing { .. })
            ));
            assert!(matches!(
                verify_pdf(&dir.path().join("absent.pdf")).await,
                Err(FlowError::PdfMissing { .. })
            ));
        });
    }

    #[tokio::test]
    async fn missing_program_is_converter_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("1.docx");
        std::fs::write(&docx, b"PK\x03\x04").unwrap();

        let c = SofficeConverter::new("resultflow-no-such-soffice", 5, false).unwrap();
        let err = c.convert(&docx, dir.path()).await.unwrap_err();
        assert!(matches!(err, FlowError::ConverterNotFound { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_conversion_failed() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("1.docx");
        std::fs::write(&docx, b"PK\x03\x04").unwrap();

        // `false` ignores its arguments and exits 1.
        let c = SofficeConverter::new("false", 5, false).unwrap();
        let err = c.convert(&docx, dir.path()).await.unwrap_err();
        assert!(matches!(err, FlowError::ConversionFailed { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_without_pdf_is_pdf_missing() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("1.docx");
        std::fs::write(&docx, b"PK\x03\x04").unwrap();

        // `true` exits 0 and writes nothing: the silent failure mode.
        let c = SofficeConverter::new("true", 5, false).unwrap();
        let err = c.convert(&docx, dir.path()).await.unwrap_err();
        assert!(matches!(err, FlowError::PdfMissing { .. }), "got: {err}");
    }
}
