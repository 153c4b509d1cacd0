//! Episode Matcher (C9, spec §4.9): maps discovered files within a season
//! pack to (season, episode) positions.
//!
//! Step 2 of the spec's algorithm ("episode.title is a case-insensitive
//! substring of the filename") needs an episode catalog this workspace has
//! no external metadata port for yet; `match_files` takes `episode_titles`
//! as a caller-supplied slice that defaults to empty, so step 1 (filename
//! position parsing) is the effective primary path until such a port
//! exists. Recorded as a deferred Open Question in DESIGN.md.

use reelforge_decision::parse_release_title;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct EpisodeMatcherConfig {
    /// Per spec §9: when false (default), a file naming more than one
    /// episode (e.g. `S01E01E02`) is assigned to its lowest episode number
    /// rather than split into two placement rows.
    pub split_multi_episode_files: bool,
}

/// A known (season, episode, title) triple a caller can supply when an
/// external metadata source is wired up. Empty by default.
#[derive(Debug, Clone)]
pub struct EpisodeRecord {
    pub season: u32,
    pub episode: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchConfidence {
    Position,
    Title,
}

#[derive(Debug, Clone)]
pub struct EpisodeMatch {
    pub path: PathBuf,
    pub season: u32,
    pub episode: u32,
    pub confidence: f32,
    pub kind: MatchConfidence,
}

pub struct EpisodeMatcher {
    config: EpisodeMatcherConfig,
}

impl EpisodeMatcher {
    pub fn new(config: EpisodeMatcherConfig) -> Self {
        Self { config }
    }

    /// Matches `files` against `known_episodes` (restricted to `season_hint`
    /// when the files share a season-pack parent folder). Returns matched
    /// and unmatched files separately so the caller can surface the latter.
    pub fn match_files(
        &self,
        files: &[PathBuf],
        known_episodes: &[EpisodeRecord],
        season_hint: Option<u32>,
    ) -> (Vec<EpisodeMatch>, Vec<PathBuf>) {
        let candidates: Vec<&EpisodeRecord> = match season_hint {
            Some(season) => known_episodes.iter().filter(|e| e.season == season).collect(),
            None => known_episodes.iter().collect(),
        };

        let mut matched = Vec::new();
        let mut unmatched = Vec::new();

        for path in files {
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let parsed = parse_release_title(filename);

            if parsed.season > 0 && parsed.episode > 0 {
                // Multi-episode filenames (S01E01E02) parse to their lowest
                // episode number; `split_multi_episode_files` exists on the
                // config for a future caller to request two placement rows
                // instead, but isn't implemented here (spec §9).
                let episode = parsed.episode;
                let position_matches = candidates
                    .iter()
                    .filter(|e| e.season == parsed.season && e.episode == episode)
                    .count();
                if candidates.is_empty() || position_matches == 1 {
                    matched.push(EpisodeMatch {
                        path: path.clone(),
                        season: parsed.season,
                        episode,
                        confidence: 0.95,
                        kind: MatchConfidence::Position,
                    });
                    continue;
                }
            }

            let title_match = candidates.iter().find(|e| !e.title.is_empty() && filename.to_lowercase().contains(&e.title.to_lowercase()));
            if let Some(record) = title_match {
                matched.push(EpisodeMatch {
                    path: path.clone(),
                    season: record.season,
                    episode: record.episode,
                    confidence: 0.70,
                    kind: MatchConfidence::Title,
                });
                continue;
            }

            unmatched.push(path.clone());
        }

        (matched, unmatched)
    }
}

/// Infers a season-pack hint from a shared parent directory name, e.g.
/// `Season 02` or `S02`.
pub fn season_hint_from_dir(dir_name: &str) -> Option<u32> {
    let parsed = parse_release_title(dir_name);
    if parsed.season > 0 {
        Some(parsed.season)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_season_episode_position() {
        let matcher = EpisodeMatcher::new(EpisodeMatcherConfig::default());
        let files = vec![PathBuf::from("Show.Name.S01E02.1080p.WEB-DL.mkv")];
        let (matched, unmatched) = matcher.match_files(&files, &[], None);
        assert_eq!(matched.len(), 1);
        assert!(unmatched.is_empty());
        assert_eq!(matched[0].season, 1);
        assert_eq!(matched[0].episode, 2);
        assert_eq!(matched[0].kind, MatchConfidence::Position);
        assert_eq!(matched[0].confidence, 0.95);
    }

    #[test]
    fn falls_back_to_title_substring_match() {
        let matcher = EpisodeMatcher::new(EpisodeMatcherConfig::default());
        let files = vec![PathBuf::from("Show.Name.The.Long.Con.mkv")];
        let known = vec![EpisodeRecord {
            season: 1,
            episode: 5,
            title: "The Long Con".to_string(),
        }];
        let (matched, unmatched) = matcher.match_files(&files, &known, None);
        assert_eq!(matched.len(), 1);
        assert!(unmatched.is_empty());
        assert_eq!(matched[0].kind, MatchConfidence::Title);
        assert_eq!(matched[0].confidence, 0.70);
    }

    #[test]
    fn unmatched_when_neither_position_nor_title_found() {
        let matcher = EpisodeMatcher::new(EpisodeMatcherConfig::default());
        let files = vec![PathBuf::from("random_clip.mkv")];
        let (matched, unmatched) = matcher.match_files(&files, &[], None);
        assert!(matched.is_empty());
        assert_eq!(unmatched.len(), 1);
    }

    #[test]
    fn season_hint_parses_season_pack_directory_names() {
        assert_eq!(season_hint_from_dir("Season 02"), Some(2));
        assert_eq!(season_hint_from_dir("Extras"), None);
    }
}
