pub mod pdf;
pub mod transliterate;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const TEXT_FILE_NAME: &str = "reddit_research_report.txt";
pub const TEXT_MEDIA_TYPE: &str = "text/plain";
pub const PDF_FILE_NAME: &str = "reddit_research_report.pdf";
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to load PDF font: {0}")]
    Font(String),

    #[error("Failed to render PDF: {0}")]
    Render(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The report as plain UTF-8 bytes, unchanged.
pub fn to_text(report: &str) -> Vec<u8> {
    report.as_bytes().to_vec()
}

pub fn to_pdf(report: &str) -> Result<Vec<u8>, ExportError> {
    pdf::render(report)
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub media_type: &'static str,
    pub bytes: usize,
}

/// Result of writing both downloads. The text file is always written first,
/// so a PDF failure still leaves a usable report on disk.
#[derive(Debug)]
pub struct ExportOutcome {
    pub text: Artifact,
    pub pdf: Result<Artifact, ExportError>,
}

pub fn write_artifacts(report: &str, out_dir: &Path) -> Result<ExportOutcome, ExportError> {
    fs::create_dir_all(out_dir).map_err(|source| ExportError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let text = write_file(out_dir.join(TEXT_FILE_NAME), TEXT_MEDIA_TYPE, &to_text(report))?;
    info!(path = %text.path.display(), bytes = text.bytes, "wrote text report");

    let pdf = to_pdf(report)
        .and_then(|bytes| write_file(out_dir.join(PDF_FILE_NAME), PDF_MEDIA_TYPE, &bytes));
    if let Ok(artifact) = &pdf {
        info!(path = %artifact.path.display(), bytes = artifact.bytes, "wrote pdf report");
    }

    Ok(ExportOutcome { text, pdf })
}

fn write_file(path: PathBuf, media_type: &'static str, bytes: &[u8]) -> Result<Artifact, ExportError> {
    fs::write(&path, bytes).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(Artifact {
        path,
        media_type,
        bytes: bytes.len(),
    })
}
