use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FALLBACK_NAME: &str = "image";

/// An upload written to the staging directory so it can be re-read as a
/// stream for the outbound request.
///
/// Each staged file is keyed by a fresh request id, never by the client's
/// filename alone. The file is deleted when the value is dropped, including
/// when the request is cancelled mid-forward.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    filename: String,
}

impl StagedUpload {
    pub async fn write(upload_dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<Self> {
        let filename = base_name(filename).to_string();
        let path = upload_dir.join(format!("{}-{}", Uuid::new_v4(), sanitize(&filename)));

        write_or_remove(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Staged upload");

        Ok(Self { path, filename })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Client filename (final path component) forwarded to the inference service.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

/// No partial file is left behind when the write fails.
async fn write_or_remove(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let written = tokio::fs::write(path, bytes).await;
    if written.is_err() {
        let _ = tokio::fs::remove_file(path).await;
    }
    written
}

/// Last path component of a client-supplied filename.
fn base_name(filename: &str) -> &str {
    match filename.rsplit(['/', '\\']).next().unwrap_or_default() {
        "" | "." | ".." => FALLBACK_NAME,
        base => base,
    }
}

/// Restrict a filename to characters that are safe on any filesystem.
fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
