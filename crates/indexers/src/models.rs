//! Wire-format DTOs for the indexer adapters. These are the raw shapes each
//! protocol returns; `core::models::search::SearchResult` is what every
//! adapter normalizes into before handing results back to C4.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single result as returned by Prowlarr's `/api/v1/search` JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProwlarrSearchResult {
    pub title: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(rename = "magnetUrl", default)]
    pub magnet_url: Option<String>,
    #[serde(rename = "infoUrl", default)]
    pub info_url: Option<String>,
    #[serde(rename = "indexerId")]
    pub indexer_id: i32,
    pub indexer: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub seeders: Option<i32>,
    #[serde(default)]
    pub leechers: Option<i32>,
    #[serde(rename = "publishDate", default)]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(rename = "guid", default)]
    pub guid: Option<String>,
    #[serde(rename = "protocol", default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i32,
    #[serde(default)]
    pub name: Option<String>,
}

/// A single `<item>` parsed out of a Torznab/Newznab RSS response.
#[derive(Debug, Clone, Default)]
pub struct TorznabItem {
    pub title: String,
    pub guid: String,
    pub link: String,
    pub size: i64,
    pub seeders: Option<i32>,
    pub leechers: Option<i32>,
    pub categories: Vec<i32>,
    pub publish_date: Option<DateTime<Utc>>,
    pub magnet_url: Option<String>,
}
