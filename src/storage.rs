//! Filesystem sink for download tasks.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Creates `dir` if missing and writes `bytes` to `dir/name`.
///
/// Writes to a sibling temp file first and renames into place, so a reader
/// never observes a partially-written file.
pub async fn save_image(bytes: &[u8], dir: &str, name: &str) -> EngineResult<()> {
    let dir_path = Path::new(dir);
    tokio::fs::create_dir_all(dir_path).await?;

    let final_path = dir_path.join(name);
    let tmp_path = dir_path.join(format!(".{name}.part"));

    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, &final_path).await.map_err(EngineError::from)
}
