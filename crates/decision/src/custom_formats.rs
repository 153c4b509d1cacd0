//! Custom format matching: evaluates `core::models::quality::FormatCondition`
//! predicates against a parsed release and its originating search result.
//!
//! Grounded on the teacher's `FormatSpecification::matches` dispatch, adapted
//! to the condition vocabulary `core::models::quality` already defines rather
//! than a string-typed `spec_type`/`value` pair.

use reelforge_core::models::quality::{CustomFormat, FormatCondition};
use reelforge_core::models::release::ParsedRelease;
use reelforge_core::models::search::SearchResult;
use regex::Regex;

/// Evaluate a single condition against a parsed release and its search result.
pub fn condition_matches(condition: &FormatCondition, parsed: &ParsedRelease, result: &SearchResult) -> bool {
    match condition {
        FormatCondition::TitleContains(needle) => {
            result.title.to_lowercase().contains(&needle.to_lowercase())
        }
        FormatCondition::TitleRegex(pattern) => Regex::new(&format!("(?i){pattern}"))
            .map(|re| re.is_match(&result.title))
            .unwrap_or(false),
        FormatCondition::ReleaseGroupIn(groups) => parsed
            .release_group
            .as_deref()
            .map(|g| groups.iter().any(|candidate| candidate.eq_ignore_ascii_case(g)))
            .unwrap_or(false),
        FormatCondition::Codec(codec) => parsed.codec == *codec,
        FormatCondition::Source(source) => parsed.source == *source,
        FormatCondition::Hdr(hdr) => parsed.hdr == *hdr,
        FormatCondition::MinSeeders(min) => result.seeders.map(|s| s as i64 >= *min).unwrap_or(false),
        FormatCondition::MaxSizeBytes(max) => result.size <= *max,
        FormatCondition::MinSizeBytes(min) => result.size >= *min,
        FormatCondition::Freeleech => false, // no indexer in this pack surfaces a freeleech flag on SearchResult yet.
    }
}

/// Whether a custom format as a whole matches, per its `require_all` policy.
pub fn format_matches(format: &CustomFormat, parsed: &ParsedRelease, result: &SearchResult) -> bool {
    if !format.enabled || format.conditions.is_empty() {
        return false;
    }
    if format.require_all {
        format.conditions.iter().all(|c| condition_matches(c, parsed, result))
    } else {
        format.conditions.iter().any(|c| condition_matches(c, parsed, result))
    }
}

/// Sum the score of every matching custom format (spec §4.2 step 3).
pub fn custom_format_score(formats: &[CustomFormat], parsed: &ParsedRelease, result: &SearchResult) -> i64 {
    formats
        .iter()
        .filter(|f| format_matches(f, parsed, result))
        .map(|f| {
            tracing::debug!(format = %f.name, score = f.score, "custom format matched");
            f.score as i64
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reelforge_core::models::quality::FormatCondition;
    use reelforge_core::models::release::{AudioFormat, Codec, Hdr, Resolution, Source};
    use reelforge_core::models::search::{IndexerProtocol, ReleaseProtocol};

    fn sample_parsed() -> ParsedRelease {
        ParsedRelease {
            title: "Movie Name".to_string(),
            year: Some(2024),
            season: 0,
            episode: 0,
            is_season_pack: false,
            resolution: Resolution::Uhd2160p,
            source: Source::Remux,
            codec: Codec::H265,
            audio_format: AudioFormat::TrueHd,
            hdr: Hdr::DolbyVision,
            release_group: Some("GROUP".to_string()),
            is_proper: false,
            is_repack: false,
        }
    }

    fn sample_result(title: &str, seeders: i32, size: i64) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            guid: "abc".to_string(),
            link: "http://example.test/1".to_string(),
            magnet_link: None,
            size,
            seeders: Some(seeders),
            leechers: Some(1),
            indexer_id: "idx1".to_string(),
            indexer_type: IndexerProtocol::Torznab,
            indexer_priority: 0,
            protocol: ReleaseProtocol::Torrent,
            categories: vec![2000],
            publish_date: Utc::now(),
        }
    }

    #[test]
    fn matches_codec_and_hdr_conditions() {
        let parsed = sample_parsed();
        let result = sample_result("Movie.Name.2024.2160p.REMUX.x265.DV-GROUP", 10, 20_000_000_000);
        let format = CustomFormat::new(
            "Remux HDR",
            vec![FormatCondition::Source(Source::Remux), FormatCondition::Hdr(Hdr::DolbyVision)],
            25,
        );
        assert!(format_matches(&format, &parsed, &result));
    }

    #[test]
    fn require_any_matches_on_single_condition() {
        let parsed = sample_parsed();
        let result = sample_result("Movie.Name.2024.2160p.REMUX.x265.DV-GROUP", 10, 20_000_000_000);
        let mut format = CustomFormat::new("Scene or x265", vec![FormatCondition::Codec(Codec::H265)], 5);
        format.require_all = false;
        assert!(format_matches(&format, &parsed, &result));
    }

    #[test]
    fn disabled_format_never_matches() {
        let parsed = sample_parsed();
        let result = sample_result("Movie.Name.2024.2160p.REMUX.x265.DV-GROUP", 10, 20_000_000_000);
        let mut format = CustomFormat::new("Remux", vec![FormatCondition::Source(Source::Remux)], 25);
        format.enabled = false;
        assert!(!format_matches(&format, &parsed, &result));
    }

    #[test]
    fn sums_scores_across_matching_formats() {
        let parsed = sample_parsed();
        let result = sample_result("Movie.Name.2024.2160p.REMUX.x265.DV-GROUP", 10, 20_000_000_000);
        let formats = vec![
            CustomFormat::new("Remux", vec![FormatCondition::Source(Source::Remux)], 25),
            CustomFormat::new("x265", vec![FormatCondition::Codec(Codec::H265)], 5),
            CustomFormat::new("Scene", vec![FormatCondition::ReleaseGroupIn(vec!["SCENE".to_string()])], -10),
        ];
        assert_eq!(custom_format_score(&formats, &parsed, &result), 30);
    }
}
