use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Directory holding finished report documents.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<report id>_<YYYYmmdd_HHMMSS>.html`
    pub fn artifact_path(&self, report_id: &str, at: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("{}_{}.html", report_id, at.format("%Y%m%d_%H%M%S")))
    }

    #[tracing::instrument(
        name = "pipeline_stage write",
        skip(self, bytes),
        fields(pipeline.stage = "write", path = %path.display(), bytes = bytes.len())
    )]
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, bytes).await?;
        tracing::info!("Report document saved");
        Ok(())
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}
