//! Quality Scorer (C2): scores a parsed release against a quality profile
//! and produces a fully-ranked `ScoredSearchResult` (spec §4.2).
//!
//! Grounded on the teacher's `DecisionEngine::evaluate_release` shape
//! (hard-constraint check, then component scoring, then select-best), with
//! the component formula replaced by the spec's deterministic
//! tier/audio/proper/repack/allow-list base score plus custom format score.

use crate::custom_formats::custom_format_score;
use reelforge_core::models::quality::QualityProfile;
use reelforge_core::models::release::ParsedRelease;
use reelforge_core::models::search::{ScoredSearchResult, SearchResult};

/// Score one search result's parsed release against a profile (spec §4.2).
///
/// `runtime_minutes` comes from the caller's `SearchParams` (the
/// metadata-enrichment collaborator resolves a media item's runtime
/// externally); it's `None` for searches where that's unavailable, in
/// which case the per-runtime-minute size constraint is skipped.
pub fn score_release(
    result: SearchResult,
    parsed: ParsedRelease,
    profile: &QualityProfile,
    runtime_minutes: Option<u32>,
) -> ScoredSearchResult {
    let mut rejection_reasons = Vec::new();

    let tier = parsed.tier();
    if !profile.is_tier_allowed(tier) {
        rejection_reasons.push(format!("tier {tier:?} not in allowed_tiers"));
    }
    if !profile.is_source_allowed(parsed.source) {
        rejection_reasons.push(format!("source {:?} not in allowed_sources", parsed.source));
    }
    if !profile.is_codec_allowed(parsed.codec) {
        rejection_reasons.push(format!("codec {:?} not in allowed_codecs", parsed.codec));
    }
    if let Some(group) = parsed.release_group.as_deref() {
        if profile.is_group_denied(group) {
            rejection_reasons.push(format!("release group {group} is denied"));
        }
    }
    if let Some(violation) = check_size_constraints(&result, profile, runtime_minutes) {
        rejection_reasons.push(violation);
    }

    let rejected = !rejection_reasons.is_empty();

    if rejected {
        return ScoredSearchResult {
            result,
            parsed,
            base_score: 0,
            custom_format_score: 0,
            total_score: 0,
            rejected: true,
            rejection_reasons,
        };
    }

    let base_score = base_score(&parsed, profile);
    let format_score = custom_format_score(&profile.custom_formats, &parsed, &result);
    let total_score = base_score + format_score;

    ScoredSearchResult {
        result,
        parsed,
        base_score,
        custom_format_score: format_score,
        total_score,
        rejected: false,
        rejection_reasons,
    }
}

/// `tier_rank * 1000 + audio_rank * 10 + (proper ? 5 : 0) + (repack ? 3 : 0)
/// + (group_on_allow ? 2 : 0)` — spec §4.2 step 2.
fn base_score(parsed: &ParsedRelease, profile: &QualityProfile) -> i64 {
    let tier_rank = parsed.tier().rank() as i64;
    let audio_rank = parsed.audio_format.rank() as i64;
    let proper_bonus = if parsed.is_proper { 5 } else { 0 };
    let repack_bonus = if parsed.is_repack { 3 } else { 0 };
    let allow_list_bonus = parsed
        .release_group
        .as_deref()
        .map(|g| profile.is_group_allowed_listed(g))
        .unwrap_or(false);
    let allow_list_bonus = if allow_list_bonus { 2 } else { 0 };

    tier_rank * 1000 + audio_rank * 10 + proper_bonus + repack_bonus + allow_list_bonus
}

/// Rejects a result whose size-per-runtime-minute falls outside the
/// profile's configured band (spec §4.2 step 1). `runtime_minutes` is
/// `None` for season packs or searches with no externally-resolved
/// runtime; such results skip this check rather than reject on data that
/// isn't available.
fn check_size_constraints(result: &SearchResult, profile: &QualityProfile, runtime_minutes: Option<u32>) -> Option<String> {
    let (min, max) = (profile.min_size_per_minute_bytes, profile.max_size_per_minute_bytes);
    if min.is_none() && max.is_none() {
        return None;
    }
    let runtime_minutes = runtime_minutes? as i64;
    if runtime_minutes == 0 {
        return None;
    }

    let size_per_minute = result.size / runtime_minutes;

    if let Some(min) = min {
        if size_per_minute < min {
            return Some(format!("size/minute {size_per_minute} below minimum {min}"));
        }
    }
    if let Some(max) = max {
        if size_per_minute > max {
            return Some(format!("size/minute {size_per_minute} exceeds maximum {max}"));
        }
    }
    None
}

/// Rank a batch of already-scored results per the spec §4.2 tie-break:
/// total_score DESC, seeders DESC, size ASC, indexer_priority DESC,
/// publish_date DESC. Rejected results are retained, sorted to the back.
pub fn rank(mut scored: Vec<ScoredSearchResult>) -> Vec<ScoredSearchResult> {
    scored.sort_by(|a, b| a.ranking_key().cmp(&b.ranking_key()));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reelforge_core::models::release::{AudioFormat, Codec, Hdr, Resolution, Source};
    use reelforge_core::models::search::{IndexerProtocol, ReleaseProtocol};

    fn sample_result(seeders: i32, size: i64) -> SearchResult {
        SearchResult {
            title: "Movie.Name.2024.1080p.BluRay.x264-GROUP".to_string(),
            guid: "g1".to_string(),
            link: "http://example.test/1".to_string(),
            magnet_link: None,
            size,
            seeders: Some(seeders),
            leechers: Some(0),
            indexer_id: "idx1".to_string(),
            indexer_type: IndexerProtocol::Torznab,
            indexer_priority: 0,
            protocol: ReleaseProtocol::Torrent,
            categories: vec![2000],
            publish_date: Utc::now(),
        }
    }

    fn sample_parsed(resolution: Resolution, source: Source, codec: Codec) -> ParsedRelease {
        ParsedRelease {
            title: "Movie Name".to_string(),
            year: Some(2024),
            season: 0,
            episode: 0,
            is_season_pack: false,
            resolution,
            source,
            codec,
            audio_format: AudioFormat::Ac3,
            hdr: Hdr::None,
            release_group: Some("GROUP".to_string()),
            is_proper: false,
            is_repack: false,
        }
    }

    #[test]
    fn rejects_disallowed_tier() {
        let profile = QualityProfile::permissive("default");
        let mut profile = profile;
        profile.allowed_tiers.retain(|t| *t != reelforge_core::models::release::QualityTier::P1080);
        let scored = score_release(
            sample_result(10, 5_000_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            None,
        );
        assert!(scored.rejected);
        assert!(!scored.rejection_reasons.is_empty());
        assert_eq!(scored.total_score, 0);
    }

    #[test]
    fn rejects_denied_release_group() {
        let mut profile = QualityProfile::permissive("default");
        profile.release_group_deny_list.push("GROUP".to_string());
        let scored = score_release(
            sample_result(10, 5_000_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            None,
        );
        assert!(scored.rejected);
    }

    #[test]
    fn computes_base_score_from_tier_and_audio() {
        let profile = QualityProfile::permissive("default");
        let scored = score_release(
            sample_result(10, 5_000_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            None,
        );
        assert!(!scored.rejected);
        // tier P1080 rank 4 -> 4000, audio Ac3 rank 3 -> 30, no proper/repack/allow-list.
        assert_eq!(scored.base_score, 4030);
        assert_eq!(scored.total_score, 4030);
    }

    #[test]
    fn proper_and_repack_add_bonus_points() {
        let profile = QualityProfile::permissive("default");
        let mut parsed = sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264);
        parsed.is_proper = true;
        parsed.is_repack = true;
        let scored = score_release(sample_result(10, 5_000_000_000), parsed, &profile, None);
        assert_eq!(scored.base_score, 4030 + 5 + 3);
    }

    #[test]
    fn custom_format_score_adds_to_total() {
        let mut profile = QualityProfile::permissive("default");
        profile.custom_formats.push(reelforge_core::models::quality::CustomFormat::new(
            "Scene penalty",
            vec![reelforge_core::models::quality::FormatCondition::ReleaseGroupIn(vec!["GROUP".to_string()])],
            -15,
        ));
        let scored = score_release(
            sample_result(10, 5_000_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            None,
        );
        assert_eq!(scored.custom_format_score, -15);
        assert_eq!(scored.total_score, 4030 - 15);
    }

    #[test]
    fn ranking_orders_by_total_score_then_seeders_then_size() {
        let profile = QualityProfile::permissive("default");
        let high = score_release(
            sample_result(50, 5_000_000_000),
            sample_parsed(Resolution::Uhd2160p, Source::Remux, Codec::H265),
            &profile,
            None,
        );
        let low = score_release(
            sample_result(5, 1_000_000_000),
            sample_parsed(Resolution::Sd480p, Source::Dvd, Codec::Xvid),
            &profile,
            None,
        );
        let ranked = rank(vec![low.clone(), high.clone()]);
        assert_eq!(ranked[0].total_score, high.total_score);
    }

    #[test]
    fn rejects_result_below_min_size_per_minute() {
        let mut profile = QualityProfile::permissive("default");
        profile.min_size_per_minute_bytes = Some(20_000_000);
        // 100 minutes at 5 GB total -> 50 MB/minute, well above the minimum.
        let ok = score_release(
            sample_result(10, 5_000_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            Some(100),
        );
        assert!(!ok.rejected);

        // Same runtime, a tiny payload -> far below the minimum.
        let too_small = score_release(
            sample_result(10, 50_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            Some(100),
        );
        assert!(too_small.rejected);
    }

    #[test]
    fn rejects_result_above_max_size_per_minute() {
        let mut profile = QualityProfile::permissive("default");
        profile.max_size_per_minute_bytes = Some(60_000_000);
        let scored = score_release(
            sample_result(10, 5_000_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            Some(100),
        );
        assert!(scored.rejected);
    }

    #[test]
    fn skips_size_constraint_without_a_known_runtime() {
        let mut profile = QualityProfile::permissive("default");
        profile.min_size_per_minute_bytes = Some(20_000_000);
        let scored = score_release(
            sample_result(10, 50_000_000),
            sample_parsed(Resolution::Hd1080p, Source::BluRay, Codec::H264),
            &profile,
            None,
        );
        assert!(!scored.rejected);
    }
}
