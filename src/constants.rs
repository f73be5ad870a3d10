/// Tunable constants for the dedup/merge engine. The numeric values here are
/// defaults; `config.toml` can override them per deployment (see `config.rs`).

/// Minimum confidence for two records to be treated as the same event.
pub const MATCH_THRESHOLD: f64 = 0.72;

// Signal weights for the similarity scorer. Titles are weighted heaviest:
// cross-source titles are the most information-dense signal, while dates and
// venues alone collide often (several unrelated events on the same night at
// the same large venue).
pub const TITLE_WEIGHT: f64 = 0.45;
pub const DATE_WEIGHT: f64 = 0.30;
pub const VENUE_WEIGHT: f64 = 0.20;
pub const CATEGORY_WEIGHT: f64 = 0.05;

/// Date proximity decays linearly to zero over this many days.
pub const DATE_WINDOW_DAYS: i64 = 2;

/// Minimum price movement (in dollars) worth notifying about.
pub const PRICE_CHANGE_THRESHOLD: f64 = 5.0;

/// Description keywords that signal a significant listing change when they
/// appear in an incoming description but not in the stored one.
pub const SIGNIFICANT_KEYWORDS: [&str; 8] = [
    "cancelled",
    "postponed",
    "rescheduled",
    "sold out",
    "extra show",
    "additional show",
    "new date",
    "date change",
];

/// Consecutive per-record storage failures tolerated before the batch is
/// treated as a fatal storage outage and aborted.
pub const MAX_CONSECUTIVE_STORAGE_FAILURES: usize = 5;
