//! Import pipeline (C8 + C9 + C10 + placement): implements
//! `core::ports::ImportExecutor`, invoked by the acquisition service's
//! `OnReadyForImport` once a download reaches `importing` (spec §4.11).
//!
//! Steps 6 ("write ImportHistory row") and 8 (notify request collaborator)
//! of the spec's algorithm are the caller's responsibility: the acquisition
//! service already records the transition into `imported` (with
//! `import_path` as event detail) and the notifier call. This pipeline owns
//! steps 1-5 and 7, plus the C12 update that step 6 also calls for.

use crate::decision::{get_extras, get_main_file, ImportDecisionMaker};
use crate::episode_matcher::{season_hint_from_dir, EpisodeMatcher, EpisodeMatcherConfig};
use crate::file_scanner::scan;
use crate::placement::{episode_destination, is_subtitle_file, movie_destination, move_file, place_extra, place_subtitle};
use crate::upgrade::{handle_old_file, should_upgrade, OldFilePolicy};
use async_trait::async_trait;
use reelforge_core::models::download::TrackedDownload;
use reelforge_core::models::quality::{MediaQualityStatus, MediaType, QualityProfile};
use reelforge_core::ports::{ImportExecutor, ImportOutcome, QualityStatusStore};
use reelforge_core::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Library roots and import policy, composed at the binary's entry point
/// from configuration (spec §6).
#[derive(Debug, Clone)]
pub struct ImportPipelineConfig {
    pub movies_library: PathBuf,
    pub tv_library: PathBuf,
    pub sample_threshold_bytes: u64,
    pub episode_matcher: EpisodeMatcherConfig,
    pub old_file_policy: OldFilePolicy,
}

pub struct ImportPipeline {
    config: ImportPipelineConfig,
    quality_status: Arc<dyn QualityStatusStore>,
}

impl ImportPipeline {
    pub fn new(config: ImportPipelineConfig, quality_status: Arc<dyn QualityStatusStore>) -> Self {
        Self { config, quality_status }
    }

    fn library_for(&self, media_type: MediaType) -> &Path {
        match media_type {
            MediaType::Movie => &self.config.movies_library,
            MediaType::Show | MediaType::Episode => &self.config.tv_library,
        }
    }
}

#[async_trait]
impl ImportExecutor for ImportPipeline {
    #[instrument(skip(self, td, profile), fields(download_id = %td.id))]
    async fn run(&self, td: &TrackedDownload, profile: &QualityProfile) -> Result<ImportOutcome> {
        let media_id = td.media_id.ok_or_else(|| CoreError::ImportError {
            operation: "run".to_string(),
            message: "tracked download has no associated media_id".to_string(),
        })?;
        let media_type = td.media_type.ok_or_else(|| CoreError::ImportError {
            operation: "run".to_string(),
            message: "tracked download has no associated media_type".to_string(),
        })?;
        let download_path = td.download_path.as_deref().ok_or_else(|| CoreError::ImportError {
            operation: "run".to_string(),
            message: "tracked download has no download_path".to_string(),
        })?;
        let parsed = td.parsed_info.as_ref().ok_or_else(|| CoreError::ImportError {
            operation: "run".to_string(),
            message: "tracked download has no parsed release info".to_string(),
        })?;

        // Step 1: resolving the destination library is just picking a root;
        // both roots are always configured so there's no error case here
        // beyond the missing media_type handled above.
        let library = self.library_for(media_type).to_path_buf();

        let source_root = Path::new(download_path);
        let discovered = scan(source_root).await?;
        let maker = ImportDecisionMaker::new(self.config.sample_threshold_bytes);
        let decisions = maker.decide(&discovered);
        let main = get_main_file(&decisions, source_root)?;
        let extras = get_extras(&decisions);

        let destination = match media_type {
            MediaType::Movie => movie_destination(&library, parsed, &main.path),
            MediaType::Show | MediaType::Episode => {
                let dir_name = source_root.file_name().and_then(|n| n.to_str()).unwrap_or("");
                let season_hint = season_hint_from_dir(dir_name);
                let matcher = EpisodeMatcher::new(self.config.episode_matcher.clone());
                let (matched, _unmatched) = matcher.match_files(&[main.path.clone()], &[], season_hint);
                let (season, episode) = match matched.first() {
                    Some(m) => (m.season, m.episode),
                    None => (parsed.season, parsed.episode),
                };
                episode_destination(&library, parsed, season, episode, &main.path)
            }
        };

        let existing = self.quality_status.get(media_id, media_type).await?;
        let destination_exists = tokio::fs::try_exists(&destination).await.unwrap_or(false);

        if let Some(existing_status) = &existing {
            let decision = should_upgrade(existing_status, parsed);
            if !decision.upgrade && destination_exists {
                return Err(CoreError::ImportBlocked {
                    reason: reelforge_core::models::download::reasons::NOT_AN_UPGRADE.to_string(),
                });
            }
        } else if destination_exists {
            // No recorded quality but a file already occupies the destination:
            // treat conservatively as not an upgrade rather than overwrite silently.
            return Err(CoreError::ImportBlocked {
                reason: reelforge_core::models::download::reasons::NOT_AN_UPGRADE.to_string(),
            });
        }

        if destination_exists {
            handle_old_file(&self.config.old_file_policy, &destination).await?;
        }

        move_file(&main.path, &destination).await?;
        info!(from = %main.path.display(), to = %destination.display(), "placed main file");

        for extra in &extras {
            if let Err(err) = place_extra(destination.parent().unwrap_or(&library), &extra.path).await {
                warn!(path = %extra.path.display(), %err, "failed to place extra");
            }
        }

        if let Ok(siblings) = scan_subtitles(source_root).await {
            for subtitle in siblings {
                if let Err(err) = place_subtitle(&destination, &subtitle).await {
                    warn!(path = %subtitle.display(), %err, "failed to place subtitle");
                }
            }
        }

        let tier = parsed.tier();
        let quality_status = MediaQualityStatus {
            media_id,
            media_type,
            resolution: parsed.resolution,
            source: parsed.source,
            hdr: parsed.hdr,
            audio_format: parsed.audio_format,
            is_proper: parsed.is_proper,
            is_repack: parsed.is_repack,
            target_met: tier >= profile.cutoff_tier,
            updated_at: chrono::Utc::now(),
        };
        self.quality_status.upsert(&quality_status).await?;

        cleanup_download_path(source_root).await;

        Ok(ImportOutcome {
            import_path: destination.display().to_string(),
            quality_status,
        })
    }
}

async fn scan_subtitles(source_root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![source_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::FileSystemError {
            path: dir.display().to_string(),
            error: e.to_string(),
        })? {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_subtitle_file(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}

/// Removes `download_path` entirely once its contents have been placed
/// (spec §4.11 step 7). Best-effort: a failure here doesn't undo a
/// successful import, just leaves the source directory behind for the next
/// sweep to notice.
async fn cleanup_download_path(source_root: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(source_root).await {
        warn!(path = %source_root.display(), %err, "failed to clean up download path after import");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelforge_core::models::download::ClientKind;
    use reelforge_core::models::quality::QualityProfile;
    use reelforge_core::models::release::{AudioFormat, Hdr, Resolution, Source};
    use reelforge_decision::parse_release_title;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct StubQualityStore {
        existing: Option<MediaQualityStatus>,
    }

    #[async_trait]
    impl QualityStatusStore for StubQualityStore {
        async fn get(&self, _media_id: Uuid, _media_type: MediaType) -> Result<Option<MediaQualityStatus>> {
            Ok(self.existing.clone())
        }
        async fn upsert(&self, _status: &MediaQualityStatus) -> Result<()> {
            Ok(())
        }
    }

    fn config(library_root: &Path) -> ImportPipelineConfig {
        ImportPipelineConfig {
            movies_library: library_root.join("movies"),
            tv_library: library_root.join("tv"),
            sample_threshold_bytes: 1024,
            episode_matcher: EpisodeMatcherConfig::default(),
            old_file_policy: OldFilePolicy {
                keep_old_files: false,
                recycle_bin_path: None,
            },
        }
    }

    fn movie_profile() -> QualityProfile {
        QualityProfile::permissive("test")
    }

    #[tokio::test]
    async fn imports_movie_with_no_existing_recorded_quality() {
        let dir = TempDir::new().unwrap();
        let download_dir = dir.path().join("download");
        std::fs::create_dir_all(&download_dir).unwrap();
        std::fs::write(download_dir.join("Movie.Name.2024.1080p.WEB-DL.mkv"), vec![0u8; 2048]).unwrap();

        let store = Arc::new(StubQualityStore { existing: None });
        let pipeline = ImportPipeline::new(config(dir.path()), store);

        let mut td = TrackedDownload::new("client-1", "ext-1", ClientKind::Torrent, "Movie.Name.2024.1080p.WEB-DL.mkv");
        td.media_id = Some(Uuid::new_v4());
        td.media_type = Some(MediaType::Movie);
        td.download_path = Some(download_dir.display().to_string());
        td.parsed_info = Some(parse_release_title("Movie.Name.2024.1080p.WEB-DL.x264-GROUP"));

        let outcome = pipeline.run(&td, &movie_profile()).await.unwrap();
        assert!(outcome.import_path.contains("Movie Name (2024)"));
        assert!(Path::new(&outcome.import_path).exists());
        assert!(!download_dir.exists());
    }

    #[tokio::test]
    async fn sample_only_directory_raises_no_valid_video() {
        let dir = TempDir::new().unwrap();
        let download_dir = dir.path().join("download");
        std::fs::create_dir_all(&download_dir).unwrap();
        std::fs::write(download_dir.join("movie-sample.mkv"), vec![0u8; 10]).unwrap();

        let store = Arc::new(StubQualityStore { existing: None });
        let pipeline = ImportPipeline::new(config(dir.path()), store);

        let mut td = TrackedDownload::new("client-1", "ext-1", ClientKind::Torrent, "movie-sample.mkv");
        td.media_id = Some(Uuid::new_v4());
        td.media_type = Some(MediaType::Movie);
        td.download_path = Some(download_dir.display().to_string());
        td.parsed_info = Some(parse_release_title("Movie.Name.2024.1080p.WEB-DL.x264-GROUP"));

        let err = pipeline.run(&td, &movie_profile()).await.unwrap_err();
        assert!(matches!(err, CoreError::NoValidVideo { .. }));
    }

    #[tokio::test]
    async fn blocks_import_when_not_an_upgrade_and_destination_occupied() {
        let dir = TempDir::new().unwrap();
        let download_dir = dir.path().join("download");
        std::fs::create_dir_all(&download_dir).unwrap();
        std::fs::write(download_dir.join("Movie.Name.2024.1080p.WEB-DL.mkv"), vec![0u8; 2048]).unwrap();

        let dest_dir = dir.path().join("movies").join("Movie Name (2024)");
        std::fs::create_dir_all(&dest_dir).unwrap();
        std::fs::write(dest_dir.join("Movie Name (2024).mkv"), vec![0u8; 4096]).unwrap();

        let existing = MediaQualityStatus {
            media_id: Uuid::new_v4(),
            media_type: MediaType::Movie,
            resolution: Resolution::Hd1080p,
            source: Source::WebDl,
            hdr: Hdr::None,
            audio_format: AudioFormat::Aac,
            is_proper: false,
            is_repack: false,
            target_met: false,
            updated_at: chrono::Utc::now(),
        };
        let store = Arc::new(StubQualityStore { existing: Some(existing) });
        let pipeline = ImportPipeline::new(config(dir.path()), store);

        let mut td = TrackedDownload::new("client-1", "ext-1", ClientKind::Torrent, "Movie.Name.2024.1080p.WEB-DL.mkv");
        td.media_id = Some(Uuid::new_v4());
        td.media_type = Some(MediaType::Movie);
        td.download_path = Some(download_dir.display().to_string());
        td.parsed_info = Some(parse_release_title("Movie.Name.2024.1080p.WEB-DL.x264-GROUP"));

        let err = pipeline.run(&td, &movie_profile()).await.unwrap_err();
        assert!(matches!(err, CoreError::ImportBlocked { .. }));
        assert!(download_dir.exists());
    }
}
