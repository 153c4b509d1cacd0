//! Quality profile, custom formats (C2 configuration) and per-media quality status (C12).

use super::release::{AudioFormat, Codec, Hdr, QualityTier, Source};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single condition a custom format specification tests against a `ParsedRelease`
/// or its originating `SearchResult`. Pure data; matching logic lives in the
/// decision crate so this crate stays free of scoring behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormatCondition {
    TitleContains(String),
    TitleRegex(String),
    ReleaseGroupIn(Vec<String>),
    Codec(Codec),
    Source(Source),
    Hdr(Hdr),
    MinSeeders(i64),
    MaxSizeBytes(i64),
    MinSizeBytes(i64),
    Freeleech,
}

/// Named predicate over a ParsedRelease that adds or subtracts from a release's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFormat {
    pub id: Uuid,
    pub name: String,
    pub conditions: Vec<FormatCondition>,
    /// All conditions must match.
    pub require_all: bool,
    pub score: i32,
    pub enabled: bool,
}

impl CustomFormat {
    pub fn new(name: impl Into<String>, conditions: Vec<FormatCondition>, score: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            conditions,
            require_all: true,
            score,
            enabled: true,
        }
    }
}

/// User-defined policy ordering acceptable releases by resolution/source/codec
/// plus custom-format weights (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: Uuid,
    pub name: String,
    pub allowed_tiers: Vec<QualityTier>,
    pub cutoff_tier: QualityTier,
    pub allowed_sources: Vec<Source>,
    pub allowed_codecs: Vec<Codec>,
    pub min_size_per_minute_bytes: Option<i64>,
    pub max_size_per_minute_bytes: Option<i64>,
    pub release_group_allow_list: Vec<String>,
    pub release_group_deny_list: Vec<String>,
    pub custom_formats: Vec<CustomFormat>,
    pub upgrade_allowed: bool,
}

impl QualityProfile {
    /// A permissive profile: every tier/source/codec allowed, no custom formats.
    pub fn permissive(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            allowed_tiers: vec![
                QualityTier::Sd,
                QualityTier::P480,
                QualityTier::P720,
                QualityTier::P1080,
                QualityTier::P2160,
            ],
            cutoff_tier: QualityTier::P2160,
            allowed_sources: vec![
                Source::Dvd,
                Source::Hdtv,
                Source::WebRip,
                Source::WebDl,
                Source::BluRay,
                Source::Remux,
            ],
            allowed_codecs: vec![Codec::H264, Codec::H265, Codec::Av1, Codec::Xvid],
            min_size_per_minute_bytes: None,
            max_size_per_minute_bytes: None,
            release_group_allow_list: Vec::new(),
            release_group_deny_list: Vec::new(),
            custom_formats: Vec::new(),
            upgrade_allowed: true,
        }
    }

    pub fn is_tier_allowed(&self, tier: QualityTier) -> bool {
        self.allowed_tiers.contains(&tier)
    }

    pub fn is_source_allowed(&self, source: Source) -> bool {
        self.allowed_sources.contains(&source)
    }

    pub fn is_codec_allowed(&self, codec: Codec) -> bool {
        self.allowed_codecs.contains(&codec)
    }

    pub fn is_group_denied(&self, group: &str) -> bool {
        self.release_group_deny_list
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group))
    }

    pub fn is_group_allowed_listed(&self, group: &str) -> bool {
        self.release_group_allow_list
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group))
    }
}

/// Per-(media_id, media_type) currently-held quality (C12). Unique on that pair.
/// Updated only after a successful import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaQualityStatus {
    pub media_id: Uuid,
    pub media_type: MediaType,
    pub resolution: super::release::Resolution,
    pub source: Source,
    pub hdr: Hdr,
    pub audio_format: AudioFormat,
    pub is_proper: bool,
    pub is_repack: bool,
    pub target_met: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Show,
    Episode,
}

impl MediaQualityStatus {
    pub fn tier(&self) -> QualityTier {
        QualityTier::from_resolution(self.resolution)
    }
}
