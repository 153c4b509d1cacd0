//! Upgrade Checker (C10, spec §4.10): decides whether a newly imported
//! release supersedes the currently recorded quality, and what to do with
//! the superseded file.

use chrono::Utc;
use reelforge_core::models::quality::MediaQualityStatus;
use reelforge_core::models::release::{ParsedRelease, QualityTier};
use reelforge_core::{CoreError, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeDecision {
    pub upgrade: bool,
    pub reason: &'static str,
}

/// Compares the currently recorded quality (C12) against a freshly parsed
/// candidate release, per the 4-step priority in spec §4.10.
pub fn should_upgrade(existing: &MediaQualityStatus, new: &ParsedRelease) -> UpgradeDecision {
    let existing_tier = QualityTier::from_resolution(existing.resolution);
    let new_tier = new.tier();

    if new_tier > existing_tier {
        return UpgradeDecision {
            upgrade: true,
            reason: "higher_tier",
        };
    }
    if new_tier == existing_tier {
        if new.is_proper && !existing.is_proper {
            return UpgradeDecision {
                upgrade: true,
                reason: "proper",
            };
        }
        if new.is_repack && !existing.is_repack {
            return UpgradeDecision {
                upgrade: true,
                reason: "repack",
            };
        }
        if new.audio_format.rank() > existing.audio_format.rank() {
            return UpgradeDecision {
                upgrade: true,
                reason: "audio_rank",
            };
        }
    }
    UpgradeDecision {
        upgrade: false,
        reason: "not_an_upgrade",
    }
}

#[derive(Debug, Clone)]
pub struct OldFilePolicy {
    pub keep_old_files: bool,
    pub recycle_bin_path: Option<PathBuf>,
}

/// Disposes of a file superseded by an upgrade, per §4.10's keep/recycle/delete policy.
pub async fn handle_old_file(policy: &OldFilePolicy, old_path: &Path) -> Result<()> {
    if policy.keep_old_files {
        return Ok(());
    }

    let Some(recycle_bin) = &policy.recycle_bin_path else {
        if old_path.is_dir() {
            tokio::fs::remove_dir_all(old_path).await
        } else {
            tokio::fs::remove_file(old_path).await
        }
        .map_err(|e| CoreError::FileSystemError {
            path: old_path.display().to_string(),
            error: e.to_string(),
        })?;
        return Ok(());
    };

    tokio::fs::create_dir_all(recycle_bin).await.map_err(|e| CoreError::FileSystemError {
        path: recycle_bin.display().to_string(),
        error: e.to_string(),
    })?;

    let basename = old_path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown");
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let dest = recycle_bin.join(format!("{timestamp}_{basename}"));

    tokio::fs::rename(old_path, &dest).await.map_err(|e| CoreError::FileSystemError {
        path: old_path.display().to_string(),
        error: e.to_string(),
    })?;
    Ok(())
}

/// Removes recycle-bin entries older than `max_age` by mtime.
pub async fn clean_recycle_bin(recycle_bin_path: &Path, max_age: chrono::Duration) -> Result<usize> {
    let mut removed = 0;
    let cutoff = std::time::SystemTime::now() - max_age.to_std().unwrap_or_default();

    let mut entries = match tokio::fs::read_dir(recycle_bin_path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(CoreError::FileSystemError {
                path: recycle_bin_path.display().to_string(),
                error: e.to_string(),
            })
        }
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::FileSystemError {
        path: recycle_bin_path.display().to_string(),
        error: e.to_string(),
    })? {
        let metadata = entry.metadata().await.map_err(|e| CoreError::FileSystemError {
            path: entry.path().display().to_string(),
            error: e.to_string(),
        })?;
        let modified = metadata.modified().map_err(|e| CoreError::FileSystemError {
            path: entry.path().display().to_string(),
            error: e.to_string(),
        })?;

        if modified < cutoff {
            let path = entry.path();
            if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            }
            .map_err(|e| CoreError::FileSystemError {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_core::models::quality::MediaType;
    use reelforge_core::models::release::{Hdr, Resolution, Source};
    use reelforge_decision::parse_release_title;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn status(resolution: Resolution, is_proper: bool, is_repack: bool) -> MediaQualityStatus {
        MediaQualityStatus {
            media_id: Uuid::new_v4(),
            media_type: MediaType::Movie,
            resolution,
            source: Source::WebDl,
            hdr: Hdr::None,
            audio_format: reelforge_core::models::release::AudioFormat::Aac,
            is_proper,
            is_repack,
            target_met: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn higher_tier_is_always_an_upgrade() {
        let existing = status(Resolution::Hd720p, false, false);
        let new = parse_release_title("Movie.2020.2160p.BluRay.x265-GROUP");
        let decision = should_upgrade(&existing, &new);
        assert!(decision.upgrade);
        assert_eq!(decision.reason, "higher_tier");
    }

    #[test]
    fn same_tier_proper_is_an_upgrade() {
        let existing = status(Resolution::Hd1080p, false, false);
        let new = parse_release_title("Movie.2020.1080p.PROPER.WEB-DL.x264-GROUP");
        let decision = should_upgrade(&existing, &new);
        assert!(decision.upgrade);
        assert_eq!(decision.reason, "proper");
    }

    #[test]
    fn same_tier_same_everything_is_not_an_upgrade() {
        let existing = status(Resolution::Hd1080p, false, false);
        let new = parse_release_title("Movie.2020.1080p.WEB-DL.x264-OTHERGROUP");
        let decision = should_upgrade(&existing, &new);
        assert!(!decision.upgrade);
        assert_eq!(decision.reason, "not_an_upgrade");
    }

    #[tokio::test]
    async fn keep_old_files_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("old.mkv");
        std::fs::write(&file, b"data").unwrap();

        let policy = OldFilePolicy {
            keep_old_files: true,
            recycle_bin_path: None,
        };
        handle_old_file(&policy, &file).await.unwrap();
        assert!(file.exists());
    }

    #[tokio::test]
    async fn recycle_bin_moves_file_with_timestamp_prefix() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("old.mkv");
        std::fs::write(&file, b"data").unwrap();
        let recycle_bin = dir.path().join("recycle");

        let policy = OldFilePolicy {
            keep_old_files: false,
            recycle_bin_path: Some(recycle_bin.clone()),
        };
        handle_old_file(&policy, &file).await.unwrap();
        assert!(!file.exists());

        let entries: Vec<_> = std::fs::read_dir(&recycle_bin).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        assert!(name.to_str().unwrap().ends_with("_old.mkv"));
    }

    #[tokio::test]
    async fn no_recycle_bin_deletes_file_outright() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("old.mkv");
        std::fs::write(&file, b"data").unwrap();

        let policy = OldFilePolicy {
            keep_old_files: false,
            recycle_bin_path: None,
        };
        handle_old_file(&policy, &file).await.unwrap();
        assert!(!file.exists());
    }
}
