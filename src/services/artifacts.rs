//! PDF listings of issued marking codes.

use chrono::Utc;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::path::{Path, PathBuf};
use thiserror::Error;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const LINES_PER_PAGE: usize = 30;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("pdf rendering failed: {0}")]
    Render(String),
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stored artifact; `file_name` is what gets persisted and served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub path: PathBuf,
}

impl Artifact {
    pub fn public_path(file_name: &str) -> String {
        format!("/api/artifacts/{}", file_name)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Renders the codes off the async runtime and writes
    /// `kizs_<order>_<timestamp>.pdf` into the artifact directory.
    pub async fn write_codes_pdf(
        &self,
        order_id: i64,
        codes: &[String],
    ) -> Result<Artifact, ArtifactError> {
        let title = format!("Marking codes, order #{}", order_id);
        let lines = codes.to_vec();
        let bytes = tokio::task::spawn_blocking(move || render_codes_pdf(&title, &lines))
            .await
            .map_err(|e| ArtifactError::Render(e.to_string()))??;

        self.ensure_dir().await?;
        let file_name = format!(
            "kizs_{}_{}.pdf",
            order_id,
            Utc::now().format("%Y%m%d-%H%M%S%3f")
        );
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(order_id, file = %file_name, codes = codes.len(), "Artifact written");
        Ok(Artifact { file_name, path })
    }
}

/// Plain numbered listing, one code per line.
pub fn render_codes_pdf(title: &str, codes: &[String]) -> Result<Vec<u8>, ArtifactError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "codes");
    let heading = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ArtifactError::Render(e.to_string()))?;
    let body = doc
        .add_builtin_font(BuiltinFont::Courier)
        .map_err(|e| ArtifactError::Render(e.to_string()))?;

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    layer.use_text(title, 16.0, Mm(20.0), Mm(277.0), &heading);

    for (index, code) in codes.iter().enumerate() {
        let slot = index % LINES_PER_PAGE;
        if index > 0 && slot == 0 {
            let (page, page_layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "codes");
            layer = doc.get_page(page).get_layer(page_layer);
        }
        let y = 265.0 - (slot as f32) * 8.0;
        // printable subset only; raw codes may carry GS separators
        let printable: String = code.chars().filter(|c| !c.is_control()).collect();
        layer.use_text(format!("{}. {}", index + 1, printable), 11.0, Mm(20.0), Mm(y), &body);
    }

    doc.save_to_bytes()
        .map_err(|e| ArtifactError::Render(e.to_string()))
}
