//! File discovery for the import pipeline (C8 step 1, spec §4.8).
//!
//! A plain recursive walk; every file is returned regardless of size so the
//! decision maker (not the scanner) is the single place that rejects samples.

use reelforge_core::{CoreError, Result};
use std::path::{Path, PathBuf};

/// Extensions the import pipeline will consider as video files.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "wmv", "m4v", "webm", "ts", "m2ts", "flv"];

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub parent_dir_name: String,
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn fs_err(path: &Path, err: std::io::Error) -> CoreError {
    CoreError::FileSystemError {
        path: path.display().to_string(),
        error: err.to_string(),
    }
}

/// Recursively walks `root`, returning every file with a video extension.
pub async fn scan(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| fs_err(&dir, e))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| fs_err(&dir, e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| fs_err(&path, e))?;

            if file_type.is_dir() {
                stack.push(path);
                continue;
            }

            if !has_video_extension(&path) {
                continue;
            }

            let metadata = entry.metadata().await.map_err(|e| fs_err(&path, e))?;

            let parent_dir_name = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();

            out.push(DiscoveredFile {
                path,
                size: metadata.len(),
                parent_dir_name,
            });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_video_files_recursively_and_skips_others() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"data").unwrap();
        std::fs::write(dir.path().join("readme.nfo"), b"data").unwrap();
        let sub = dir.path().join("Extras");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("featurette.mp4"), b"data").unwrap();

        let found = scan(dir.path()).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|f| f.path.ends_with("movie.mkv")));
        assert!(found.iter().any(|f| f.path.ends_with("featurette.mp4")));
    }

    #[tokio::test]
    async fn empty_directory_yields_no_files() {
        let dir = TempDir::new().unwrap();
        let found = scan(dir.path()).await.unwrap();
        assert!(found.is_empty());
    }
}
