//! Destination path construction and atomic file placement (spec §4.11
//! steps 3 and 5).

use reelforge_core::models::release::ParsedRelease;
use reelforge_core::{CoreError, Result};
use std::path::{Path, PathBuf};

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "vtt"];

fn fs_err(path: &Path, error: std::io::Error) -> CoreError {
    CoreError::FileSystemError {
        path: path.display().to_string(),
        error: error.to_string(),
    }
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("mkv")
}

/// Strips characters filesystems reject so a title is safe to use as a path
/// segment, without otherwise altering it.
fn sanitize_segment(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `<library>/<Title> (<Year>)/<Title> (<Year>).<ext>`.
pub fn movie_destination(library_root: &Path, parsed: &ParsedRelease, source_file: &Path) -> PathBuf {
    let title = sanitize_segment(&parsed.title);
    let folder = match parsed.year {
        Some(year) => format!("{title} ({year})"),
        None => title,
    };
    let ext = extension_of(source_file);
    library_root.join(&folder).join(format!("{folder}.{ext}"))
}

/// `<library>/<Show> (<Year>)/Season <NN>/<Show> - S<NN>E<NN>.<ext>`.
/// Season 0 is normalized to "Season 1" (spec §4.11).
pub fn episode_destination(
    library_root: &Path,
    parsed: &ParsedRelease,
    season: u32,
    episode: u32,
    source_file: &Path,
) -> PathBuf {
    let show = sanitize_segment(&parsed.title);
    let show_folder = match parsed.year {
        Some(year) => format!("{show} ({year})"),
        None => show.clone(),
    };
    let display_season = if season == 0 { 1 } else { season };
    let ext = extension_of(source_file);
    library_root
        .join(&show_folder)
        .join(format!("Season {display_season:02}"))
        .join(format!("{show} - S{display_season:02}E{episode:02}.{ext}"))
}

/// Moves `source` to `destination`, renaming atomically when both paths are
/// on the same filesystem and falling back to copy-then-delete otherwise
/// (e.g. the download and library roots are separate mounts).
pub async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| fs_err(parent, e))?;
    }

    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            tokio::fs::copy(source, destination).await.map_err(|e| fs_err(source, e))?;
            tokio::fs::remove_file(source).await.map_err(|e| fs_err(source, e))?;
            Ok(())
        }
        Err(e) => Err(fs_err(source, e)),
    }
}

/// `EXDEV` (cross-device link), the errno `rename(2)` returns when source
/// and destination are on different filesystems. Linux's value; the
/// fallback copy path above still triggers correctly on other errors since
/// this is only used to special-case the recoverable one.
fn libc_exdev() -> i32 {
    18
}

/// Moves an approved extra file under `<dest_dir>/Extras/`, keeping its
/// original filename.
pub async fn place_extra(dest_dir: &Path, source: &Path) -> Result<PathBuf> {
    let filename = source.file_name().ok_or_else(|| CoreError::FileSystemError {
        path: source.display().to_string(),
        error: "missing file name".to_string(),
    })?;
    let dest = dest_dir.join("Extras").join(filename);
    move_file(source, &dest).await?;
    Ok(dest)
}

/// Infers a trailing `.<lang>` suffix from a subtitle's own filename (a
/// 2- or 3-letter code immediately before the extension, e.g.
/// `Movie.en.srt`), then places it alongside `main_destination` using that
/// suffix, or none if no code was found.
pub async fn place_subtitle(main_destination: &Path, source: &Path) -> Result<PathBuf> {
    let stem = main_destination.file_stem().and_then(|s| s.to_str()).unwrap_or("subtitle");
    let dir = main_destination.parent().unwrap_or(Path::new("."));
    let ext = extension_of(source);
    let lang = subtitle_language_code(source);

    let filename = match lang {
        Some(code) => format!("{stem}.{code}.{ext}"),
        None => format!("{stem}.{ext}"),
    };
    let dest = dir.join(filename);
    move_file(source, &dest).await?;
    Ok(dest)
}

fn subtitle_language_code(path: &Path) -> Option<String> {
    let stem = path.file_stem().and_then(|s| s.to_str())?;
    let code = stem.rsplit('.').next()?;
    if (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_lowercase())
    } else {
        None
    }
}

/// Finds subtitle files discovered alongside the main video (same source
/// directory, excluding anything already classified as video/extra).
pub fn is_subtitle_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUBTITLE_EXTENSIONS.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
