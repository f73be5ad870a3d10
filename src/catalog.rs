use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::types::{Category, NormalizedRecord, VenueInfo};

/// Engagement counters owned by other subsystems (web front end, digest
/// mailer). The dedup engine never writes these; `EventPatch` deliberately
/// has no fields for them so a merge can never clobber a concurrent counter
/// bump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub favourite_count: u64,
    #[serde(default)]
    pub clickthrough_count: u64,
}

/// The single persisted, deduplicated representation of a real-world event.
///
/// Superset of `NormalizedRecord` plus provenance: which sources contributed,
/// each source's native id and booking link, and an append-only lineage log
/// of absorbed records. Never physically deleted by this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub id: Option<Uuid>,
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
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub accessibility: BTreeSet<String>,
    #[serde(default)]
    pub age_restriction: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    /// Every source that has ever contributed to this event.
    pub sources: BTreeSet<String>,
    /// The source whose identifiers are the default-facing ones.
    pub primary_source: String,
    /// source name -> that source's native id.
    pub source_ids: HashMap<String, String>,
    /// source name -> that source's booking link.
    #[serde(default)]
    pub booking_urls: HashMap<String, String>,
    /// Append-only `source:sourceId` lineage of absorbed records.
    #[serde(default)]
    pub merged_from: Vec<String>,
    pub last_updated: DateTime<Utc>,
    /// First-seen time.
    pub scraped_at: DateTime<Utc>,
    #[serde(default)]
    pub stats: EventStats,
}

impl CanonicalEvent {
    /// Create a fresh canonical event from a record that matched nothing.
    pub fn from_record(record: &NormalizedRecord, now: DateTime<Utc>) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(record.source.clone());

        let mut source_ids = HashMap::new();
        source_ids.insert(record.source.clone(), record.source_id.clone());

        let mut booking_urls = HashMap::new();
        if let Some(url) = &record.booking_url {
            booking_urls.insert(record.source.clone(), url.clone());
        }

        Self {
            id: None,
            title: record.title.clone(),
            description: record.description.clone(),
            category: record.category,
            subcategories: record.subcategories.clone(),
            start_date: record.start_date,
            end_date: record.end_date,
            venue: record.venue.clone(),
            price_min: record.price_min,
            price_max: record.price_max,
            price_details: record.price_details.clone(),
            is_free: record.is_free,
            image_url: record.image_url.clone(),
            video_url: record.video_url.clone(),
            accessibility: record.accessibility.clone(),
            age_restriction: record.age_restriction.clone(),
            duration: record.duration.clone(),
            sources,
            primary_source: record.source.clone(),
            source_ids,
            booking_urls,
            merged_from: Vec::new(),
            last_updated: now,
            scraped_at: now,
            stats: EventStats::default(),
        }
    }

    /// The booking link of the primary source, if one was recorded.
    pub fn primary_booking_url(&self) -> Option<&String> {
        self.booking_urls.get(&self.primary_source)
    }
}

/// Field-level update produced by the merge engine and applied by storage.
///
/// Scalar fields are `$set`-style (only present when changing); the
/// collection fields are `$addToSet`-style unions. Nothing outside these
/// fields is touched on update, which is what keeps `stats` safe from
/// lost updates against the subsystems that own it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    pub description: Option<String>,
    pub category: Option<Category>,
    pub end_date: Option<NaiveDate>,
    pub venue_address: Option<String>,
    pub venue_suburb: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub price_details: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub age_restriction: Option<String>,
    pub duration: Option<String>,
    pub add_sources: BTreeSet<String>,
    pub add_subcategories: BTreeSet<String>,
    pub add_accessibility: BTreeSet<String>,
    pub add_merged_from: Vec<String>,
    pub set_source_ids: HashMap<String, String>,
    pub set_booking_urls: HashMap<String, String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl EventPatch {
    /// Apply this patch to an in-memory copy of the event. Storage backends
    /// reuse this so the DB representation and the batch pool stay in step.
    pub fn apply_to(&self, event: &mut CanonicalEvent) {
        if let Some(v) = &self.description {
            event.description = Some(v.clone());
        }
        if let Some(v) = self.category {
            event.category = Some(v);
        }
        if let Some(v) = self.end_date {
            event.end_date = Some(v);
        }
        if let Some(v) = &self.venue_address {
            event.venue.address = Some(v.clone());
        }
        if let Some(v) = &self.venue_suburb {
            event.venue.suburb = Some(v.clone());
        }
        if let Some(v) = self.price_min {
            event.price_min = Some(v);
        }
        if let Some(v) = self.price_max {
            event.price_max = Some(v);
        }
        if let Some(v) = &self.price_details {
            event.price_details = Some(v.clone());
        }
        if let Some(v) = &self.image_url {
            event.image_url = Some(v.clone());
        }
        if let Some(v) = &self.video_url {
            event.video_url = Some(v.clone());
        }
        if let Some(v) = &self.age_restriction {
            event.age_restriction = Some(v.clone());
        }
        if let Some(v) = &self.duration {
            event.duration = Some(v.clone());
        }
        for source in &self.add_sources {
            event.sources.insert(source.clone());
        }
        for sub in &self.add_subcategories {
            event.subcategories.insert(sub.clone());
        }
        for acc in &self.add_accessibility {
            event.accessibility.insert(acc.clone());
        }
        for key in &self.add_merged_from {
            if !event.merged_from.contains(key) {
                event.merged_from.push(key.clone());
            }
        }
        for (source, sid) in &self.set_source_ids {
            event.source_ids.insert(source.clone(), sid.clone());
        }
        for (source, url) in &self.set_booking_urls {
            event.booking_urls.insert(source.clone(), url.clone());
        }
        if let Some(ts) = self.last_updated {
            event.last_updated = ts;
        }
    }
}
