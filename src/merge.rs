use chrono::{DateTime, Utc};

use crate::catalog::{CanonicalEvent, EventPatch};
use crate::config::MatcherConfig;
use crate::constants::SIGNIFICANT_KEYWORDS;
use crate::types::NormalizedRecord;

/// Changes worth telling the notification subsystem about, detected by
/// comparing the stored event against an incoming record before the merge
/// is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedChanges {
    pub price_dropped: bool,
    pub price_drop: Option<f64>,
    pub significant_update: Option<String>,
}

impl DetectedChanges {
    pub fn is_notable(&self) -> bool {
        self.price_dropped || self.significant_update.is_some()
    }
}

/// Compare the stored event's pre-merge price and description against the
/// incoming record. Runs before the merge; failures here never block it.
pub fn detect_changes(
    primary: &CanonicalEvent,
    incoming: &NormalizedRecord,
    config: &MatcherConfig,
) -> DetectedChanges {
    let mut changes = DetectedChanges::default();

    let old_price = primary.price_min.filter(|p| *p > 0.0);
    let new_price = incoming.price_min.filter(|p| *p > 0.0);
    match (old_price, new_price) {
        (None, Some(new)) => {
            changes.significant_update = Some(format!("Price now available: ${:.2}", new));
        }
        (Some(old), Some(new)) => {
            let delta = old - new;
            if delta >= config.price_change_threshold {
                changes.price_dropped = true;
                changes.price_drop = Some(delta);
            } else if -delta >= config.price_change_threshold {
                changes.significant_update = Some(format!("Price increased by ${:.2}", -delta));
            }
        }
        _ => {}
    }

    let old_desc = primary
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let new_desc = incoming
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    if changes.significant_update.is_none() {
        for keyword in SIGNIFICANT_KEYWORDS {
            if new_desc.contains(keyword) && !old_desc.contains(keyword) {
                changes.significant_update = Some(format!("Listing updated: {}", keyword));
                break;
            }
        }
    }

    changes
}

/// Same-source fast-path update: fill empty fields, refresh the source's own
/// provenance entries, bump `lastUpdated`. Never touches `sources` or
/// `mergedFrom` (the record is not being absorbed from another source).
pub fn refresh(
    primary: &CanonicalEvent,
    incoming: &NormalizedRecord,
    now: DateTime<Utc>,
) -> (CanonicalEvent, EventPatch) {
    let mut patch = fill_patch(primary, incoming);
    patch.last_updated = Some(now);
    let mut updated = primary.clone();
    patch.apply_to(&mut updated);
    (updated, patch)
}

/// Cross-source merge. Deterministic and intentionally not commutative: the
/// existing catalog record is authoritative, so its fields win on conflict
/// and incoming values only fill genuinely empty ones. Provenance is always
/// unioned regardless of which side's fields won.
pub fn merge(
    primary: &CanonicalEvent,
    incoming: &NormalizedRecord,
    now: DateTime<Utc>,
) -> (CanonicalEvent, EventPatch) {
    let mut patch = fill_patch(primary, incoming);

    if !primary.sources.contains(&incoming.source) {
        patch.add_sources.insert(incoming.source.clone());
    }
    // Lineage records both sides of the first merge, then grows by one key
    // per absorbed record; appends are idempotent.
    if let Some(own_id) = primary.source_ids.get(&primary.primary_source) {
        let own_key = format!("{}:{}", primary.primary_source, own_id);
        if !primary.merged_from.contains(&own_key) {
            patch.add_merged_from.push(own_key);
        }
    }
    let lineage = incoming.lineage_key();
    if !primary.merged_from.contains(&lineage) && !patch.add_merged_from.contains(&lineage) {
        patch.add_merged_from.push(lineage);
    }
    patch.last_updated = Some(now);

    let mut updated = primary.clone();
    patch.apply_to(&mut updated);
    (updated, patch)
}

/// Shared field policy for merges and fast-path updates: scalar descriptive
/// fields are taken from the incoming record only when the primary's value
/// is empty, collections are unioned, and the incoming source's own
/// `sourceIds`/`bookingUrls` entries are always overwritten so per-source
/// provenance tracks each source's latest identifiers.
fn fill_patch(primary: &CanonicalEvent, incoming: &NormalizedRecord) -> EventPatch {
    let mut patch = EventPatch::default();

    if is_blank(&primary.description) && !is_blank(&incoming.description) {
        patch.description = incoming.description.clone();
    }
    if primary.category.is_none() {
        patch.category = incoming.category;
    }
    if primary.end_date.is_none() {
        patch.end_date = incoming.end_date;
    }
    if is_blank(&primary.venue.address) && !is_blank(&incoming.venue.address) {
        patch.venue_address = incoming.venue.address.clone();
    }
    if is_blank(&primary.venue.suburb) && !is_blank(&incoming.venue.suburb) {
        patch.venue_suburb = incoming.venue.suburb.clone();
    }
    if primary.price_min.filter(|p| *p > 0.0).is_none() {
        patch.price_min = incoming.price_min.filter(|p| *p > 0.0);
    }
    if primary.price_max.filter(|p| *p > 0.0).is_none() {
        patch.price_max = incoming.price_max.filter(|p| *p > 0.0);
    }
    if is_blank(&primary.price_details) && !is_blank(&incoming.price_details) {
        patch.price_details = incoming.price_details.clone();
    }
    if is_blank(&primary.image_url) && !is_blank(&incoming.image_url) {
        patch.image_url = incoming.image_url.clone();
    }
    if is_blank(&primary.video_url) && !is_blank(&incoming.video_url) {
        patch.video_url = incoming.video_url.clone();
    }
    if is_blank(&primary.age_restriction) && !is_blank(&incoming.age_restriction) {
        patch.age_restriction = incoming.age_restriction.clone();
    }
    if is_blank(&primary.duration) && !is_blank(&incoming.duration) {
        patch.duration = incoming.duration.clone();
    }
    if primary.accessibility.is_empty() && !incoming.accessibility.is_empty() {
        patch.add_accessibility = incoming.accessibility.clone();
    }

    for sub in &incoming.subcategories {
        if !primary.subcategories.contains(sub) {
            patch.add_subcategories.insert(sub.clone());
        }
    }

    patch
        .set_source_ids
        .insert(incoming.source.clone(), incoming.source_id.clone());
    if let Some(url) = &incoming.booking_url {
        patch
            .set_booking_urls
            .insert(incoming.source.clone(), url.clone());
    }

    patch
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NormalizedRecord, VenueInfo};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn record(source: &str, source_id: &str) -> NormalizedRecord {
        NormalizedRecord {
            title: "Hamilton".to_string(),
            description: None,
            category: None,
            subcategories: BTreeSet::new(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: None,
            venue: VenueInfo {
                name: "Princess Theatre".to_string(),
                address: None,
                suburb: None,
            },
            price_min: None,
            price_max: None,
            price_details: None,
            is_free: false,
            booking_url: None,
            image_url: None,
            video_url: None,
            accessibility: BTreeSet::new(),
            age_restriction: None,
            duration: None,
            source: source.to_string(),
            source_id: source_id.to_string(),
        }
    }

    fn seeded_event() -> CanonicalEvent {
        CanonicalEvent::from_record(&record("ticketmaster", "TM1"), Utc::now())
    }

    #[test]
    fn price_drop_of_ten_dollars_is_flagged() {
        let mut primary = seeded_event();
        primary.price_min = Some(40.0);
        let mut incoming = record("marriner", "MG9");
        incoming.price_min = Some(30.0);

        let changes = detect_changes(&primary, &incoming, &MatcherConfig::default());
        assert!(changes.price_dropped);
        assert_eq!(changes.price_drop, Some(10.0));
        assert!(changes.significant_update.is_none());
    }

    #[test]
    fn newly_available_price_is_significant() {
        let mut primary = seeded_event();
        primary.price_min = Some(0.0);
        let mut incoming = record("marriner", "MG9");
        incoming.price_min = Some(25.0);

        let changes = detect_changes(&primary, &incoming, &MatcherConfig::default());
        assert!(!changes.price_dropped);
        assert_eq!(
            changes.significant_update.as_deref(),
            Some("Price now available: $25.00")
        );
    }

    #[test]
    fn price_increase_is_significant() {
        let mut primary = seeded_event();
        primary.price_min = Some(40.0);
        let mut incoming = record("marriner", "MG9");
        incoming.price_min = Some(52.5);

        let changes = detect_changes(&primary, &incoming, &MatcherConfig::default());
        assert!(!changes.price_dropped);
        assert_eq!(
            changes.significant_update.as_deref(),
            Some("Price increased by $12.50")
        );
    }

    #[test]
    fn small_price_movement_is_ignored() {
        let mut primary = seeded_event();
        primary.price_min = Some(40.0);
        let mut incoming = record("marriner", "MG9");
        incoming.price_min = Some(38.0);

        let changes = detect_changes(&primary, &incoming, &MatcherConfig::default());
        assert!(!changes.is_notable());
    }

    #[test]
    fn new_status_keyword_is_significant() {
        let mut primary = seeded_event();
        primary.description = Some("doors 7pm".to_string());
        let mut incoming = record("marriner", "MG9");
        incoming.description = Some("Show postponed, doors 7pm".to_string());

        let changes = detect_changes(&primary, &incoming, &MatcherConfig::default());
        let update = changes.significant_update.unwrap();
        assert!(update.contains("postponed"));
    }

    #[test]
    fn keyword_already_present_is_not_resignalled() {
        let mut primary = seeded_event();
        primary.description = Some("Show postponed".to_string());
        let mut incoming = record("marriner", "MG9");
        incoming.description = Some("Show postponed until further notice".to_string());

        let changes = detect_changes(&primary, &incoming, &MatcherConfig::default());
        assert!(!changes.is_notable());
    }

    #[test]
    fn primary_fields_win_on_conflict() {
        let mut primary = seeded_event();
        primary.description = Some("A proper description".to_string());
        primary.price_min = Some(40.0);
        let mut incoming = record("marriner", "MG9");
        incoming.description = Some("Some other description".to_string());
        incoming.price_min = Some(30.0);

        let (merged, _) = merge(&primary, &incoming, Utc::now());
        assert_eq!(merged.description.as_deref(), Some("A proper description"));
        assert_eq!(merged.price_min, Some(40.0));
    }

    #[test]
    fn empty_primary_fields_are_filled_from_incoming() {
        let primary = seeded_event();
        let mut incoming = record("marriner", "MG9");
        incoming.description = Some("Multi-award winning musical".to_string());
        incoming.price_min = Some(89.0);
        incoming.venue.suburb = Some("East Melbourne".to_string());

        let (merged, _) = merge(&primary, &incoming, Utc::now());
        assert_eq!(
            merged.description.as_deref(),
            Some("Multi-award winning musical")
        );
        assert_eq!(merged.price_min, Some(89.0));
        assert_eq!(merged.venue.suburb.as_deref(), Some("East Melbourne"));
    }

    #[test]
    fn merge_unions_provenance() {
        let primary = seeded_event();
        let mut incoming = record("marriner", "MG9");
        incoming.booking_url = Some("https://marriner.example/hamilton".to_string());

        let (merged, _) = merge(&primary, &incoming, Utc::now());
        assert!(merged.sources.contains("ticketmaster"));
        assert!(merged.sources.contains("marriner"));
        assert_eq!(merged.source_ids.get("marriner").map(String::as_str), Some("MG9"));
        assert_eq!(merged.source_ids.get("ticketmaster").map(String::as_str), Some("TM1"));
        assert_eq!(
            merged.booking_urls.get("marriner").map(String::as_str),
            Some("https://marriner.example/hamilton")
        );
        assert_eq!(
            merged.merged_from,
            vec!["ticketmaster:TM1".to_string(), "marriner:MG9".to_string()]
        );
        assert_eq!(merged.primary_source, "ticketmaster");
    }

    #[test]
    fn merging_the_same_record_twice_is_idempotent() {
        let primary = seeded_event();
        let incoming = record("marriner", "MG9");

        let now = Utc::now();
        let (once, _) = merge(&primary, &incoming, now);
        let (twice, patch) = merge(&once, &incoming, now);

        assert_eq!(twice.sources, once.sources);
        assert_eq!(twice.merged_from, once.merged_from);
        assert!(patch.add_sources.is_empty());
        assert!(patch.add_merged_from.is_empty());
    }

    #[test]
    fn subcategories_are_unioned() {
        let mut primary = seeded_event();
        primary.subcategories.insert("musical".to_string());
        let mut incoming = record("marriner", "MG9");
        incoming.subcategories.insert("broadway".to_string());
        incoming.subcategories.insert("musical".to_string());

        let (merged, patch) = merge(&primary, &incoming, Utc::now());
        assert_eq!(merged.subcategories.len(), 2);
        assert_eq!(patch.add_subcategories.len(), 1);
    }

    #[test]
    fn engagement_stats_are_never_touched() {
        let mut primary = seeded_event();
        primary.stats.favourite_count = 12;
        let incoming = record("marriner", "MG9");

        let (merged, _) = merge(&primary, &incoming, Utc::now());
        assert_eq!(merged.stats.favourite_count, 12);
    }

    #[test]
    fn refresh_leaves_lineage_alone() {
        let primary = seeded_event();
        let mut incoming = record("ticketmaster", "TM1");
        incoming.price_min = Some(30.0);

        let (updated, patch) = refresh(&primary, &incoming, Utc::now());
        assert!(updated.merged_from.is_empty());
        assert!(patch.add_sources.is_empty());
        assert_eq!(updated.sources.len(), 1);
        assert_eq!(updated.price_min, Some(30.0));
    }
}
