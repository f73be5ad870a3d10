use uuid::Uuid;

use crate::catalog::CanonicalEvent;
use crate::config::MatcherConfig;
use crate::similarity::{score, RecordView};
use crate::types::NormalizedRecord;

/// Two confidences within this distance are treated as tied.
const CONFIDENCE_EPSILON: f64 = 1e-9;

/// The winning candidate for an incoming record.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub id: Uuid,
    pub confidence: f64,
    pub reason: String,
}

/// Score `record` against every candidate and pick the best match at or
/// above the threshold, if any.
///
/// Ties on confidence break deterministically: a candidate already sharing a
/// source with the record wins over one that does not, and otherwise the
/// earliest-created event wins (candidates arrive in first-seen order, and a
/// tied later candidate never displaces an earlier one). Repeated runs with
/// identical input therefore always merge into the same event.
pub fn resolve(
    record: &NormalizedRecord,
    candidates: &[&CanonicalEvent],
    config: &MatcherConfig,
) -> Option<MatchOutcome> {
    let incoming = RecordView::from(record);
    let mut best: Option<(MatchOutcome, bool)> = None;

    for candidate in candidates {
        let Some(id) = candidate.id else {
            continue;
        };
        let result = score(&incoming, &RecordView::from(*candidate), config);
        if result.confidence < config.threshold {
            continue;
        }
        let shares_source = candidate.sources.contains(&record.source);
        let outcome = MatchOutcome {
            id,
            confidence: result.confidence,
            reason: result.reason,
        };
        best = match best {
            None => Some((outcome, shares_source)),
            Some((current, current_shares)) => {
                if outcome.confidence > current.confidence + CONFIDENCE_EPSILON {
                    Some((outcome, shares_source))
                } else if (outcome.confidence - current.confidence).abs() <= CONFIDENCE_EPSILON
                    && shares_source
                    && !current_shares
                {
                    Some((outcome, shares_source))
                } else {
                    Some((current, current_shares))
                }
            }
        };
    }

    best.map(|(outcome, _)| outcome)
}
