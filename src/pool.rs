use std::collections::HashMap;
use uuid::Uuid;

use crate::catalog::CanonicalEvent;
use crate::types::NormalizedRecord;

/// Batch-scoped comparison pool: the catalog snapshot taken at batch start
/// plus every canonical event created or updated earlier in the same batch.
///
/// Loading the snapshot once and appending pending inserts is what keeps the
/// engine at O(n·k) instead of rescanning the catalog per record. Events are
/// held in first-seen order so tie-breaking in the resolver is deterministic
/// across runs with identical input.
pub struct BatchPool {
    events: Vec<CanonicalEvent>,
    by_id: HashMap<Uuid, usize>,
    by_key: HashMap<(String, String), Uuid>,
}

impl BatchPool {
    /// Build the pool from a full catalog snapshot.
    pub fn new(mut snapshot: Vec<CanonicalEvent>) -> Self {
        snapshot.sort_by(|a, b| a.scraped_at.cmp(&b.scraped_at).then(a.id.cmp(&b.id)));
        let mut pool = Self {
            events: Vec::with_capacity(snapshot.len()),
            by_id: HashMap::with_capacity(snapshot.len()),
            by_key: HashMap::new(),
        };
        for event in snapshot {
            pool.push(event);
        }
        pool
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Exact `(source, sourceId)` lookup backing the fast path.
    pub fn find_by_source_id(&self, source: &str, source_id: &str) -> Option<&CanonicalEvent> {
        let id = self
            .by_key
            .get(&(source.to_string(), source_id.to_string()))?;
        self.get(*id)
    }

    pub fn get(&self, id: Uuid) -> Option<&CanonicalEvent> {
        self.by_id.get(&id).map(|&idx| &self.events[idx])
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Candidates worth scoring for this record, cheapest filter first: only
    /// events inside the date window can clear the confidence threshold, so
    /// everything else is skipped without scoring.
    pub fn candidates_for(&self, record: &NormalizedRecord, window_days: i64) -> Vec<&CanonicalEvent> {
        self.events
            .iter()
            .filter(|event| (event.start_date - record.start_date).num_days().abs() <= window_days)
            .collect()
    }

    /// Add a batch-pending event so later records in the same batch can match
    /// against it.
    pub fn push(&mut self, event: CanonicalEvent) {
        let idx = self.events.len();
        if let Some(id) = event.id {
            self.by_id.insert(id, idx);
            for (source, sid) in &event.source_ids {
                self.by_key.insert((source.clone(), sid.clone()), id);
            }
        }
        self.events.push(event);
    }

    /// Replace an event after a merge or fast-path update, re-indexing any
    /// provenance keys the merge added.
    pub fn apply(&mut self, id: Uuid, updated: CanonicalEvent) {
        if let Some(&idx) = self.by_id.get(&id) {
            for (source, sid) in &updated.source_ids {
                self.by_key.insert((source.clone(), sid.clone()), id);
            }
            self.events[idx] = updated;
        }
    }
}
