use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Event category. Scrapers map their own taxonomy onto these six values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Music,
    Theatre,
    Comedy,
    Dance,
    Festival,
    Other,
}

/// Venue details as reported by a scraper. Only the name participates in
/// matching; address and suburb are descriptive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueInfo {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
}

/// The common shape every scraper must emit before records enter the engine.
///
/// `(source, source_id)` is the only pair guaranteed unique; no other field
/// is trustworthy as a key across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub subcategories: BTreeSet<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub venue: VenueInfo,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    #[serde(default)]
    pub price_details: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub booking_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub accessibility: BTreeSet<String>,
    #[serde(default)]
    pub age_restriction: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub source: String,
    pub source_id: String,
}

impl NormalizedRecord {
    /// The `source:sourceId` lineage key recorded in `mergedFrom`.
    pub fn lineage_key(&self) -> String {
        format!("{}:{}", self.source, self.source_id)
    }
}
