//! Release title parser (C1): extracts structured attributes from a release
//! title string. Pattern-driven, deterministic, side-effect free — a missing
//! attribute yields its neutral value rather than a parse failure.
//!
//! Grounded on the teacher's `engine::Release::from_title` string-matching
//! approach, generalized to populate `core::models::release::ParsedRelease`
//! and extended with season/episode/year/hdr/audio/proper/repack extraction.

use once_cell::sync::Lazy;
use reelforge_core::models::release::{AudioFormat, Codec, Hdr, ParsedRelease, Resolution, Source};
use regex::Regex;

static SEASON_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)S(\d{1,2})E(\d{1,3})(?:E\d{1,3})*").unwrap());
static ALT_SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})x(\d{1,3})\b").unwrap());
static SERIES_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Series\s*(\d{1,2})\s*Episode\s*(\d{1,3})").unwrap());
static SEASON_PACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSeason\s*(\d{1,2})\b").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:19|20)\d{2}").unwrap());
static RELEASE_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)(?:\.[A-Za-z0-9]{2,4})?$").unwrap());
static PROPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bPROPER\b").unwrap());
static REPACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bREPACK\b").unwrap());
// Matches the standalone "DV" token release groups use for Dolby Vision, but
// not substrings like "DVDRip" or "DVD".
static DOLBY_VISION_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(^|[.\s_-])dv([.\s_-]|$)").unwrap());

/// Parse a release title into its structured attributes. Never fails.
pub fn parse_release_title(title: &str) -> ParsedRelease {
    let (season, episode, is_season_pack, consumed_start) = parse_season_episode(title);
    let year = parse_year(title, consumed_start);
    let resolution = parse_resolution(title);
    let source = parse_source(title);
    let hdr = parse_hdr(title);
    let codec = parse_codec(title);
    let audio_format = parse_audio(title);
    let is_proper = PROPER.is_match(title);
    let is_repack = REPACK.is_match(title);
    let release_group = parse_release_group(title);
    let clean_title = parse_title(title);

    ParsedRelease {
        title: clean_title,
        year,
        season,
        episode,
        is_season_pack,
        resolution,
        source,
        codec,
        audio_format,
        hdr,
        release_group,
        is_proper,
        is_repack,
    }
}

/// Returns (season, episode, is_season_pack, earliest match offset consumed).
fn parse_season_episode(title: &str) -> (u32, u32, bool, Option<usize>) {
    if let Some(caps) = SEASON_EPISODE.captures(title) {
        let season = caps[1].parse().unwrap_or(0);
        let episode = caps[2].parse().unwrap_or(0);
        return (season, episode, false, caps.get(0).map(|m| m.start()));
    }
    if let Some(caps) = ALT_SEASON_EPISODE.captures(title) {
        let season = caps[1].parse().unwrap_or(0);
        let episode = caps[2].parse().unwrap_or(0);
        return (season, episode, false, caps.get(0).map(|m| m.start()));
    }
    if let Some(caps) = SERIES_EPISODE.captures(title) {
        let season = caps[1].parse().unwrap_or(0);
        let episode = caps[2].parse().unwrap_or(0);
        return (season, episode, false, caps.get(0).map(|m| m.start()));
    }
    if let Some(caps) = SEASON_PACK.captures(title) {
        let season = caps[1].parse().unwrap_or(0);
        return (season, 0, true, caps.get(0).map(|m| m.start()));
    }
    (0, 0, false, None)
}

fn parse_year(title: &str, consumed_start: Option<usize>) -> Option<u16> {
    let current_year = chrono::Utc::now().format("%Y").to_string().parse().unwrap_or(2026u16);
    for m in YEAR.find_iter(title) {
        if let Some(start) = consumed_start {
            if m.start() >= start.saturating_sub(1) && m.end() <= start + 12 {
                continue;
            }
        }
        if let Ok(year) = m.as_str().parse::<u16>() {
            if (1900..=current_year + 2).contains(&year) {
                return Some(year);
            }
        }
    }
    None
}

fn parse_resolution(title: &str) -> Resolution {
    let t = title.to_lowercase();
    if t.contains("2160p") || t.contains("4k") || t.contains("uhd") {
        Resolution::Uhd2160p
    } else if t.contains("1080p") {
        Resolution::Hd1080p
    } else if t.contains("720p") {
        Resolution::Hd720p
    } else if t.contains("480p") {
        Resolution::Sd480p
    } else {
        Resolution::Unknown
    }
}

fn parse_source(title: &str) -> Source {
    let t = title.to_lowercase();
    if t.contains("remux") {
        Source::Remux
    } else if t.contains("bluray") || t.contains("blu-ray") || t.contains("bdrip") {
        Source::BluRay
    } else if t.contains("web-dl") || t.contains("webdl") {
        Source::WebDl
    } else if t.contains("webrip") || t.contains("web-rip") {
        Source::WebRip
    } else if t.contains("hdtv") {
        Source::Hdtv
    } else if t.contains("dvd") {
        Source::Dvd
    } else if t.contains("telesync") || t.contains(".ts.") || t.ends_with(".ts") {
        Source::Telesync
    } else if t.contains("cam") {
        Source::Cam
    } else {
        Source::Unknown
    }
}

fn parse_hdr(title: &str) -> Hdr {
    let t = title.to_lowercase();
    if t.contains("dolby.vision") || t.contains("dolby vision") || DOLBY_VISION_TOKEN.is_match(&t) {
        Hdr::DolbyVision
    } else if t.contains("hdr10+") {
        Hdr::Hdr10Plus
    } else if t.contains("hdr10") || t.contains("hdr") {
        Hdr::Hdr10
    } else {
        Hdr::None
    }
}

fn parse_codec(title: &str) -> Codec {
    let t = title.to_lowercase();
    if t.contains("x265") || t.contains("h265") || t.contains("hevc") || t.contains("h.265") {
        Codec::H265
    } else if t.contains("x264") || t.contains("h264") || t.contains("h.264") || t.contains("avc") {
        Codec::H264
    } else if t.contains("xvid") {
        Codec::Xvid
    } else if t.contains("av1") {
        Codec::Av1
    } else {
        Codec::Unknown
    }
}

fn parse_audio(title: &str) -> AudioFormat {
    let t = title.to_lowercase();
    if t.contains("truehd") {
        AudioFormat::TrueHd
    } else if t.contains("dts-hd") || t.contains("dts.hd") || t.contains("dtshd") {
        AudioFormat::DtsHdMa
    } else if t.contains("atmos") {
        AudioFormat::Atmos
    } else if t.contains("dts") {
        AudioFormat::Dts
    } else if t.contains("dd+") || t.contains("eac3") || t.contains("ddp") {
        AudioFormat::DdPlus
    } else if t.contains("ac3") {
        AudioFormat::Ac3
    } else if t.contains("aac") {
        AudioFormat::Aac
    } else if t.contains("flac") {
        AudioFormat::Flac
    } else if t.contains("mp3") {
        AudioFormat::Mp3
    } else {
        AudioFormat::Unknown
    }
}

fn parse_release_group(title: &str) -> Option<String> {
    RELEASE_GROUP.captures(title).map(|c| c[1].to_string())
}

fn parse_title(title: &str) -> String {
    let cut = [
        SEASON_EPISODE.find(title).map(|m| m.start()),
        ALT_SEASON_EPISODE.find(title).map(|m| m.start()),
        SERIES_EPISODE.find(title).map(|m| m.start()),
        SEASON_PACK.find(title).map(|m| m.start()),
        YEAR.find(title).map(|m| m.start()),
    ]
    .into_iter()
    .flatten()
    .min();

    let raw = match cut {
        Some(idx) => &title[..idx],
        None => title,
    };

    let normalized = raw.replace(['.', '_'], " ");
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_movie_title() {
        let parsed = parse_release_title("Movie.Name.2024.1080p.BluRay.x264-GROUP");
        assert_eq!(parsed.title, "Movie Name");
        assert_eq!(parsed.year, Some(2024));
        assert_eq!(parsed.resolution, Resolution::Hd1080p);
        assert_eq!(parsed.source, Source::BluRay);
        assert_eq!(parsed.codec, Codec::H264);
        assert_eq!(parsed.release_group.as_deref(), Some("GROUP"));
        assert_eq!(parsed.season, 0);
        assert_eq!(parsed.episode, 0);
        assert!(!parsed.is_season_pack);
    }

    #[test]
    fn parses_episode_with_sxxeyy() {
        let parsed = parse_release_title("Show.Name.S02E05.720p.WEB-DL.DD5.1.H264-GROUP");
        assert_eq!(parsed.season, 2);
        assert_eq!(parsed.episode, 5);
        assert!(!parsed.is_season_pack);
        assert_eq!(parsed.resolution, Resolution::Hd720p);
        assert_eq!(parsed.source, Source::WebDl);
    }

    #[test]
    fn parses_multi_episode_range_takes_lowest() {
        let parsed = parse_release_title("Show.Name.S01E02E03.1080p.WEBRip.x265-GROUP");
        assert_eq!(parsed.season, 1);
        assert_eq!(parsed.episode, 2);
    }

    #[test]
    fn parses_season_pack() {
        let parsed = parse_release_title("Show.Name.Season.03.1080p.WEB-DL.x264-GROUP");
        assert!(parsed.is_season_pack);
        assert_eq!(parsed.season, 3);
        assert_eq!(parsed.episode, 0);
    }

    #[test]
    fn detects_proper_and_repack() {
        let parsed = parse_release_title("Movie.Name.2019.PROPER.1080p.BluRay.x264-GROUP");
        assert!(parsed.is_proper);
        assert!(!parsed.is_repack);

        let parsed = parse_release_title("Movie.Name.2019.REPACK.1080p.BluRay.x264-GROUP");
        assert!(!parsed.is_proper);
        assert!(parsed.is_repack);
    }

    #[test]
    fn detects_hdr_variants() {
        assert_eq!(parse_release_title("Movie.2024.2160p.UHD.BluRay.HDR10-GROUP").hdr, Hdr::Hdr10);
        assert_eq!(
            parse_release_title("Movie.2024.2160p.UHD.BluRay.Dolby.Vision-GROUP").hdr,
            Hdr::DolbyVision
        );
    }

    #[test]
    fn dvdrip_is_not_mistaken_for_dolby_vision() {
        let parsed = parse_release_title("Movie.Name.2005.DVDRip.XviD-GROUP");
        assert_eq!(parsed.hdr, Hdr::None);
        assert_eq!(parsed.source, Source::Dvd);
    }

    #[test]
    fn standalone_dv_token_is_dolby_vision() {
        let parsed = parse_release_title("Movie.Name.2024.2160p.UHD.BluRay.DV.HDR-GROUP");
        assert_eq!(parsed.hdr, Hdr::DolbyVision);
    }

    #[test]
    fn missing_attributes_yield_neutral_values() {
        let parsed = parse_release_title("some.release.with.no.known.markers");
        assert_eq!(parsed.resolution, Resolution::Unknown);
        assert_eq!(parsed.source, Source::Unknown);
        assert_eq!(parsed.codec, Codec::Unknown);
        assert_eq!(parsed.hdr, Hdr::None);
        assert_eq!(parsed.year, None);
    }
}
