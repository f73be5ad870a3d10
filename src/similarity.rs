use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::catalog::CanonicalEvent;
use crate::config::MatcherConfig;
use crate::types::{Category, NormalizedRecord};

/// Words carrying no identity information in event titles.
const TITLE_STOPWORDS: [&str; 12] = [
    "the", "a", "an", "and", "of", "at", "in", "on", "to", "for", "with", "presents",
];

/// Confidence score for a candidate pair, plus the dominant signal(s) that
/// produced it (e.g. `"title+date"`). Ephemeral; consumed within one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub confidence: f64,
    pub reason: String,
}

/// The fields the scorer reads, projected out of either record shape so the
/// scorer stays total over partially-populated inputs.
#[derive(Debug, Clone)]
pub struct RecordView<'a> {
    pub title: &'a str,
    pub start_date: NaiveDate,
    pub venue_name: &'a str,
    pub category: Option<Category>,
}

impl<'a> From<&'a NormalizedRecord> for RecordView<'a> {
    fn from(record: &'a NormalizedRecord) -> Self {
        Self {
            title: &record.title,
            start_date: record.start_date,
            venue_name: &record.venue.name,
            category: record.category,
        }
    }
}

impl<'a> From<&'a CanonicalEvent> for RecordView<'a> {
    fn from(event: &'a CanonicalEvent) -> Self {
        Self {
            title: &event.title,
            start_date: event.start_date,
            venue_name: &event.venue.name,
            category: event.category,
        }
    }
}

/// Score a pair of records. Pure and symmetric: `score(a, b) == score(b, a)`.
///
/// Weighted sum of four signals, each normalized to [0, 1] before weighting.
/// A pair at or above `config.threshold` is treated as the same real-world
/// event by the resolver.
pub fn score(a: &RecordView, b: &RecordView, config: &MatcherConfig) -> MatchScore {
    let title = title_similarity(a.title, b.title);
    let date = date_proximity(a.start_date, b.start_date, config.date_window_days);
    let venue = venue_similarity(a.venue_name, b.venue_name);
    let category = category_agreement(a.category, b.category);

    let confidence = (title * config.title_weight
        + date * config.date_weight
        + venue * config.venue_weight
        + category * config.category_weight)
        .clamp(0.0, 1.0);

    MatchScore {
        confidence,
        reason: dominant_signals(&[
            ("title", title),
            ("date", date),
            ("venue", venue),
            ("category", category),
        ]),
    }
}

/// Token-set overlap (Jaccard) after lowercasing, punctuation stripping and
/// stop-word removal, with a normalized edit-distance fallback so
/// near-identical short titles still score highly.
fn title_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_text(a);
    let norm_b = normalize_text(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a == norm_b {
        return 1.0;
    }

    let tokens_a = title_tokens(&norm_a);
    let tokens_b = title_tokens(&norm_b);
    let jaccard = if tokens_a.is_empty() || tokens_b.is_empty() {
        0.0
    } else {
        let intersection = tokens_a.intersection(&tokens_b).count() as f64;
        let union = tokens_a.union(&tokens_b).count() as f64;
        intersection / union
    };

    let edit = strsim::normalized_levenshtein(&norm_a, &norm_b);
    jaccard.max(edit)
}

/// 1.0 on the same calendar date, decaying linearly to 0 over the window.
fn date_proximity(a: NaiveDate, b: NaiveDate, window_days: i64) -> f64 {
    let diff = (a - b).num_days().abs();
    if diff == 0 {
        return 1.0;
    }
    if window_days <= 0 || diff >= window_days {
        return 0.0;
    }
    1.0 - diff as f64 / window_days as f64
}

/// Exact match scores 1.0; substring containment gets most of the credit
/// ("Forum" vs "Forum Melbourne"); otherwise Jaro-Winkler on the normalized
/// names. Missing names are scored neutrally rather than as a mismatch.
fn venue_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_text(a);
    let norm_b = normalize_text(b);
    match (norm_a.is_empty(), norm_b.is_empty()) {
        (true, true) => return 0.5,
        (true, false) | (false, true) => return 0.4,
        _ => {}
    }
    if norm_a == norm_b {
        return 1.0;
    }
    if norm_a.contains(&norm_b) || norm_b.contains(&norm_a) {
        return 0.9;
    }
    strsim::jaro_winkler(&norm_a, &norm_b)
}

/// 1.0 when categories agree, 0.5 when either side is unset, 0.0 when they
/// actively conflict.
fn category_agreement(a: Option<Category>, b: Option<Category>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => 0.5,
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn title_tokens(normalized: &str) -> BTreeSet<&str> {
    normalized
        .split_whitespace()
        .filter(|t| !TITLE_STOPWORDS.contains(t))
        .collect()
}

/// Names of the signals that dominated the score, joined with `+`. Falls
/// back to the single strongest signal when nothing scored highly.
fn dominant_signals(signals: &[(&str, f64)]) -> String {
    let strong: Vec<&str> = signals
        .iter()
        .filter(|(_, value)| *value >= 0.8)
        .map(|(name, _)| *name)
        .collect();
    if !strong.is_empty() {
        return strong.join("+");
    }
    signals
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.to_string())
        .unwrap_or_default()
}
