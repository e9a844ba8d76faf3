//! Input validation, output naming and atomic file writes.
//!
//! ## Naming
//!
//! ```text
//! <dir>/<stem>[_<lang>].epub|.pdf      final artifact
//! <dir>/<stem>[_<lang>]_kindle.epub    after a round-trip
//! <dir>/.<stem>[_<lang>].work.md       flattened text, removed after rendering
//! ```
//!
//! `<dir>` is the configured output directory, else the input's directory.
//! Working files are job-specific, so two jobs never share one.

use crate::config::OutputFormat;
use crate::error::Pdf2EpubError;
use crate::pipeline::extract::has_pdf_magic;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Check that `path` is an existing, readable regular file.
///
/// A missing `%PDF` header is only logged: extraction degrades such a file
/// to an error block instead of failing the job.
pub fn validate_input(path: &Path) -> Result<(), Pdf2EpubError> {
    if !path.exists() {
        return Err(Pdf2EpubError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(Pdf2EpubError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut head = Vec::with_capacity(1024);
            let _ = (&mut f).take(1024).read_to_end(&mut head);
            if !has_pdf_magic(&head) {
                warn!(
                    "'{}' has no %PDF header; extraction will likely degrade",
                    path.display()
                );
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2EpubError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2EpubError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated input: {}", path.display());
    Ok(())
}

/// Where one job writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dir: PathBuf,
    /// `<stem>[_<lang>]`
    pub base: String,
    pub output: PathBuf,
    pub working: PathBuf,
}

/// Compute output paths for `input`. `lang` is set only when translating.
pub fn output_paths(
    input: &Path,
    output_dir: Option<&Path>,
    lang: Option<&str>,
    format: OutputFormat,
) -> OutputPaths {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    let base = match lang.map(str::trim).filter(|l| !l.is_empty()) {
        Some(lang) => format!("{stem}_{lang}"),
        None => stem,
    };

    let dir = match output_dir {
        Some(d) => d.to_path_buf(),
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    OutputPaths {
        output: dir.join(format!("{base}.{}", format.extension())),
        working: dir.join(format!(".{base}.work.md")),
        base,
        dir,
    }
}

/// Create `dir` (and parents) if missing.
pub async fn ensure_dir(dir: &Path) -> Result<(), Pdf2EpubError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Pdf2EpubError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Write `bytes` to `path` via a sibling temp file and a rename, so readers
/// never see a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2EpubError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let write_failed = |e: std::io::Error| Pdf2EpubError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}

/// Delete a working file; a failure is logged, never returned.
pub async fn remove_working_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed working file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove working file '{}': {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_without_translation() {
        let p = output_paths(Path::new("/in/book.pdf"), None, None, OutputFormat::Epub);
        assert_eq!(p.output, PathBuf::from("/in/book.epub"));
        assert_eq!(p.working, PathBuf::from("/in/.book.work.md"));
        assert_eq!(p.base, "book");
    }

    #[test]
    fn names_with_language_and_output_dir() {
        let p = output_paths(
            Path::new("/in/book.pdf"),
            Some(Path::new("/out")),
            Some("fr"),
            OutputFormat::Pdf,
        );
        assert_eq!(p.output, PathBuf::from("/out/book_fr.pdf"));
        assert_eq!(p.working, PathBuf::from("/out/.book_fr.work.md"));
    }

    #[test]
    fn bare_file_name_uses_current_dir() {
        let p = output_paths(Path::new("book.pdf"), None, Some(" "), OutputFormat::Epub);
        assert_eq!(p.dir, PathBuf::from("."));
        assert_eq!(p.output, PathBuf::from("./book.epub"));
    }

    #[test]
    fn missing_input_is_not_found() {
        let err = validate_input(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2EpubError::FileNotFound { .. }));
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_input(dir.path()).unwrap_err();
        assert!(matches!(err, Pdf2EpubError::NotAFile { .. }));
    }

    #[test]
    fn non_pdf_bytes_still_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello").unwrap();
        assert!(validate_input(&path).is_ok());
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.epub");
        write_atomic(&path, b"data").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert!(!dir.path().join("nested/out.epub.tmp").exists());
    }

    #[tokio::test]
    async fn removing_a_missing_working_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        remove_working_file(&dir.path().join(".x.work.md")).await;
    }
}
