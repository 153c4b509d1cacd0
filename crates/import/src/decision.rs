//! Import Decision Maker (C8, spec §4.8): classifies every discovered file
//! as a sample, extra, or valid main-content candidate.

use crate::file_scanner::DiscoveredFile;
use reelforge_core::{CoreError, Result};
use std::path::PathBuf;

/// Default minimum size for a file to not be treated as a sample.
pub const DEFAULT_SAMPLE_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

const SAMPLE_MARKERS: &[&str] = &["sample", "trailer", "preview", "teaser"];
const EXTRA_MARKERS: &[&str] = &[
    "extras",
    "bonus",
    "featurette",
    "behind the scenes",
    "deleted scene",
    "interview",
];

#[derive(Debug, Clone)]
pub struct FileDecision {
    pub path: PathBuf,
    pub size: u64,
    pub approved: bool,
    pub is_extra: bool,
    pub rejection_reason: Option<&'static str>,
}

pub struct ImportDecisionMaker {
    sample_threshold_bytes: u64,
}

impl Default for ImportDecisionMaker {
    fn default() -> Self {
        Self {
            sample_threshold_bytes: DEFAULT_SAMPLE_THRESHOLD_BYTES,
        }
    }
}

impl ImportDecisionMaker {
    pub fn new(sample_threshold_bytes: u64) -> Self {
        Self { sample_threshold_bytes }
    }

    fn contains_marker(haystack: &str, markers: &[&str]) -> bool {
        let lower = haystack.to_lowercase();
        markers.iter().any(|m| lower.contains(m))
    }

    /// Classifies every discovered file; never errors on its own (the
    /// `NoValidVideo` edge case is raised by the caller once it sees that
    /// every decision came back unapproved or extra-only).
    pub fn decide(&self, files: &[DiscoveredFile]) -> Vec<FileDecision> {
        files
            .iter()
            .map(|file| {
                let filename = file.path.file_name().and_then(|n| n.to_str()).unwrap_or("");

                if Self::contains_marker(filename, SAMPLE_MARKERS) {
                    return FileDecision {
                        path: file.path.clone(),
                        size: file.size,
                        approved: false,
                        is_extra: false,
                        rejection_reason: Some("sample_filename"),
                    };
                }
                if file.size < self.sample_threshold_bytes {
                    return FileDecision {
                        path: file.path.clone(),
                        size: file.size,
                        approved: false,
                        is_extra: false,
                        rejection_reason: Some("below_sample_threshold"),
                    };
                }

                let is_extra = Self::contains_marker(filename, EXTRA_MARKERS) || Self::contains_marker(&file.parent_dir_name, EXTRA_MARKERS);

                FileDecision {
                    path: file.path.clone(),
                    size: file.size,
                    approved: true,
                    is_extra,
                    rejection_reason: None,
                }
            })
            .collect()
    }
}

/// Largest approved, non-extra file. `NoValidVideo` if there is none.
pub fn get_main_file(decisions: &[FileDecision], source_dir: &std::path::Path) -> Result<FileDecision> {
    decisions
        .iter()
        .filter(|d| d.approved && !d.is_extra)
        .max_by_key(|d| d.size)
        .cloned()
        .ok_or_else(|| CoreError::NoValidVideo {
            path: source_dir.display().to_string(),
        })
}

/// Approved extras, for placement under `Extras/`.
pub fn get_extras(decisions: &[FileDecision]) -> Vec<FileDecision> {
    decisions.iter().filter(|d| d.approved && d.is_extra).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn file(name: &str, size: u64, parent: &str) -> DiscoveredFile {
        DiscoveredFile {
            path: PathBuf::from(format!("/downloads/{parent}/{name}")),
            size,
            parent_dir_name: parent.to_string(),
        }
    }

    #[test]
    fn rejects_sample_by_filename_regardless_of_size() {
        let maker = ImportDecisionMaker::default();
        let decisions = maker.decide(&[file("Movie.Name.2024.sample.mkv", 500 * 1024 * 1024, "Movie.Name.2024")]);
        assert!(!decisions[0].approved);
        assert_eq!(decisions[0].rejection_reason, Some("sample_filename"));
    }

    #[test]
    fn rejects_small_files_as_samples() {
        let maker = ImportDecisionMaker::default();
        let decisions = maker.decide(&[file("Movie.Name.2024.mkv", 1024, "Movie.Name.2024")]);
        assert!(!decisions[0].approved);
        assert_eq!(decisions[0].rejection_reason, Some("below_sample_threshold"));
    }

    #[test]
    fn marks_featurette_as_extra_but_still_approved() {
        let maker = ImportDecisionMaker::default();
        let decisions = maker.decide(&[file("Behind.The.Scenes.mkv", 200 * 1024 * 1024, "Extras")]);
        assert!(decisions[0].approved);
        assert!(decisions[0].is_extra);
    }

    #[test]
    fn get_main_file_picks_largest_non_extra_approved_file() {
        let maker = ImportDecisionMaker::default();
        let decisions = maker.decide(&[
            file("Movie.Name.2024.mkv", 4_000_000_000, "Movie.Name.2024"),
            file("Featurette.mkv", 500_000_000, "Extras"),
        ]);
        let main = get_main_file(&decisions, Path::new("/downloads/Movie.Name.2024")).unwrap();
        assert!(main.path.ends_with("Movie.Name.2024.mkv"));
        assert_eq!(get_extras(&decisions).len(), 1);
    }

    #[test]
    fn all_rejected_raises_no_valid_video() {
        let maker = ImportDecisionMaker::default();
        let decisions = maker.decide(&[file("sample.mkv", 500_000_000, "Movie.Name.2024")]);
        let err = get_main_file(&decisions, Path::new("/downloads/Movie.Name.2024")).unwrap_err();
        assert!(matches!(err, CoreError::NoValidVideo { .. }));
    }
}
