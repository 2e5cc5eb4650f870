use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tabular_contract::{ArtifactCodec, Dataset, ExportFormat};

use crate::error::WriteError;
use crate::text::TextCodec;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub path: PathBuf,
    pub bytes: usize,
    pub format: ExportFormat,
}

/// Serializes a dataset to a file without exposing a partially written target.
#[derive(Clone)]
pub struct ArtifactWriter {
    codec: Arc<dyn ArtifactCodec>,
}

impl fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactWriter").finish_non_exhaustive()
    }
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactWriter {
    /// Writer backed by the built-in [`TextCodec`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(Arc::new(TextCodec))
    }

    #[must_use]
    pub fn with_codec(codec: Arc<dyn ArtifactCodec>) -> Self {
        Self { codec }
    }

    /// Encodes `dataset` on the blocking pool, then replaces `path` atomically.
    ///
    /// Parent directories are created as needed. The bytes go to a sibling
    /// temporary file first and are renamed over the target.
    pub async fn write(
        &self,
        dataset: Arc<Dataset>,
        path: &Path,
        format: ExportFormat,
        encoding: &str,
    ) -> Result<WriteReport, WriteError> {
        let codec = Arc::clone(&self.codec);
        let label = encoding.to_string();
        let bytes =
            tokio::task::spawn_blocking(move || codec.encode(&dataset, format, &label)).await??;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| WriteError::io("creating artifact directory", parent, source))?;
        }

        let temp = temp_sibling(path);
        if let Err(source) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(WriteError::io("writing temporary artifact", temp, source));
        }
        if let Err(source) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(WriteError::io("replacing artifact", path, source));
        }

        tracing::debug!(path = %path.display(), %format, bytes = bytes.len(), "artifact written");
        Ok(WriteReport {
            path: path.to_path_buf(),
            bytes: bytes.len(),
            format,
        })
    }
}

/// `.{file_name}.{pid}.{n}.tmp` next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}
