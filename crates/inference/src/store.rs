use schema::DetectionResponse;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const ARTIFACT_SUFFIX: &str = "_detections.json";
const FALLBACK_STEM: &str = "image";

/// Writes the last detection result for each uploaded filename to
/// `<output_dir>/<stem>_detections.json`.
///
/// Writes to the same artifact are serialized and land through a rename, so
/// concurrent uploads sharing a filename never interleave; the last one wins.
#[derive(Debug, Clone)]
pub struct ResultStore {
    output_dir: PathBuf,
    locks: LockMap,
}

impl ResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            locks: Arc::default(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(artifact_name(filename))
    }

    pub async fn persist(
        &self,
        filename: &str,
        response: &DetectionResponse,
    ) -> io::Result<PathBuf> {
        let path = self.artifact_path(filename);
        let bytes = serde_json::to_vec(response).map_err(io::Error::other)?;

        let entry = self.acquire(&path);
        let result = {
            let _guard = entry.mutex.lock().await;
            write_atomic(&path, &bytes).await
        };
        drop(entry);

        result.map(|()| path)
    }

    fn acquire(&self, path: &Path) -> PathLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let mutex = locks.entry(path.to_path_buf()).or_default().clone();
        PathLock {
            locks: Arc::clone(&self.locks),
            path: path.to_path_buf(),
            mutex,
        }
    }
}

type LockMap = Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>;

/// A handle on one artifact's write lock. Dropping it, also when the
/// request future is cancelled, prunes the map entry once nobody else holds it.
struct PathLock {
    locks: LockMap,
    path: PathBuf,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under the map lock: two owners means the map and us.
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.path);
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = match tokio::fs::write(&tmp, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    written
}

/// `photos/cat.jpg` -> `cat_detections.json`.
///
/// Only the final path component of the client-supplied name is used, with
/// its last extension stripped.
pub fn artifact_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match base {
        "" | "." | ".." => FALLBACK_STEM,
        base => Path::new(base)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(FALLBACK_STEM),
    };
    format!("{stem}{ARTIFACT_SUFFIX}")
}
