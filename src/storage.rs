use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{CanonicalEvent, EventPatch};
use crate::error::{CatalogError, Result};

/// Persistence contract required by the batch orchestrator: one full
/// snapshot per batch, exact-key lookup, insert with a distinguishable
/// duplicate-key failure, and field-level patch updates.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Full catalog snapshot, taken once at batch start.
    async fn fetch_all(&self) -> Result<Vec<CanonicalEvent>>;

    /// Exact `(source, sourceId)` lookup. May be served from memory.
    async fn find_by_source_id(&self, source: &str, source_id: &str)
        -> Result<Option<CanonicalEvent>>;

    /// Insert a new canonical event, assigning its id. Must fail with
    /// `CatalogError::DuplicateKey` when the record's `(source, sourceId)`
    /// already exists.
    async fn insert(&self, event: &mut CanonicalEvent) -> Result<()>;

    /// Apply a field-level patch: `$set` for scalars, `$addToSet` for the
    /// collection fields. Never a whole-record overwrite.
    async fn update(&self, id: Uuid, patch: &EventPatch) -> Result<()>;
}

fn has_source_key(event: &CanonicalEvent, source: &str, source_id: &str) -> bool {
    event
        .source_ids
        .get(source)
        .map_or(false, |sid| sid == source_id)
}

/// In-memory storage for development and testing.
pub struct InMemoryStorage {
    events: Arc<Mutex<HashMap<Uuid, CanonicalEvent>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn fetch_all(&self) -> Result<Vec<CanonicalEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.values().cloned().collect())
    }

    async fn find_by_source_id(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<CanonicalEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events
            .values()
            .find(|e| has_source_key(e, source, source_id))
            .cloned())
    }

    async fn insert(&self, event: &mut CanonicalEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        for (source, sid) in &event.source_ids {
            if events.values().any(|e| has_source_key(e, source, sid)) {
                return Err(CatalogError::DuplicateKey {
                    source_name: source.clone(),
                    source_id: sid.clone(),
                });
            }
        }
        let id = Uuid::new_v4();
        event.id = Some(id);
        events.insert(id, event.clone());
        debug!("Inserted event: {} with id {}", event.title, id);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: &EventPatch) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(&id).ok_or_else(|| CatalogError::Storage {
            message: format!("Cannot update unknown event {}", id),
        })?;
        patch.apply_to(event);
        debug!("Updated event: {} with id {}", event.title, id);
        Ok(())
    }
}

/// File-backed storage: the whole catalog serialized as one JSON document,
/// rewritten after every mutation. Fine at catalog scale (thousands of
/// events); a real deployment would put a database behind the same trait.
pub struct JsonFileStorage {
    path: PathBuf,
    events: Mutex<HashMap<Uuid, CanonicalEvent>>,
}

impl JsonFileStorage {
    /// Open (or create) a catalog file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let events = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let list: Vec<CanonicalEvent> = serde_json::from_str(&content)?;
            list.into_iter()
                .filter_map(|e| e.id.map(|id| (id, e)))
                .collect()
        } else {
            HashMap::new()
        };
        debug!("Opened catalog file {:?} with {} events", path, events.len());
        Ok(Self {
            path,
            events: Mutex::new(events),
        })
    }

    fn persist(&self, events: &HashMap<Uuid, CanonicalEvent>) -> Result<()> {
        let mut list: Vec<&CanonicalEvent> = events.values().collect();
        list.sort_by(|a, b| a.scraped_at.cmp(&b.scraped_at).then(a.id.cmp(&b.id)));
        let content = serde_json::to_string_pretty(&list)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn fetch_all(&self) -> Result<Vec<CanonicalEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.values().cloned().collect())
    }

    async fn find_by_source_id(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<CanonicalEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events
            .values()
            .find(|e| has_source_key(e, source, source_id))
            .cloned())
    }

    async fn insert(&self, event: &mut CanonicalEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        for (source, sid) in &event.source_ids {
            if events.values().any(|e| has_source_key(e, source, sid)) {
                return Err(CatalogError::DuplicateKey {
                    source_name: source.clone(),
                    source_id: sid.clone(),
                });
            }
        }
        let id = Uuid::new_v4();
        event.id = Some(id);
        events.insert(id, event.clone());
        self.persist(&events)?;
        debug!("Inserted event: {} with id {}", event.title, id);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: &EventPatch) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(&id).ok_or_else(|| CatalogError::Storage {
            message: format!("Cannot update unknown event {}", id),
        })?;
        patch.apply_to(event);
        self.persist(&events)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NormalizedRecord, VenueInfo};
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeSet;

    fn sample_event(source: &str, source_id: &str) -> CanonicalEvent {
        let record = NormalizedRecord {
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
        };
        CanonicalEvent::from_record(&record, Utc::now())
    }

    #[tokio::test]
    async fn insert_assigns_id_and_rejects_duplicates() {
        let storage = InMemoryStorage::new();
        let mut event = sample_event("ticketmaster", "TM1");
        storage.insert(&mut event).await.unwrap();
        assert!(event.id.is_some());

        let mut dup = sample_event("ticketmaster", "TM1");
        let err = storage.insert(&mut dup).await.unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn update_applies_patch_without_touching_stats() {
        let storage = InMemoryStorage::new();
        let mut event = sample_event("ticketmaster", "TM1");
        storage.insert(&mut event).await.unwrap();
        let id = event.id.unwrap();

        let patch = EventPatch {
            description: Some("doors 7pm".to_string()),
            ..Default::default()
        };
        storage.update(id, &patch).await.unwrap();

        let stored = storage
            .find_by_source_id("ticketmaster", "TM1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.description.as_deref(), Some("doors 7pm"));
        assert_eq!(stored.stats.view_count, 0);
    }

    #[tokio::test]
    async fn json_file_storage_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut event = sample_event("ticketmaster", "TM1");
        {
            let storage = JsonFileStorage::open(&path).unwrap();
            storage.insert(&mut event).await.unwrap();
        }

        let reopened = JsonFileStorage::open(&path).unwrap();
        let all = reopened.fetch_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, event.id);
        assert_eq!(all[0].title, "Hamilton");
    }

    #[tokio::test]
    async fn find_by_source_id_sees_merged_provenance() {
        let storage = InMemoryStorage::new();
        let mut event = sample_event("ticketmaster", "TM1");
        storage.insert(&mut event).await.unwrap();

        let patch = EventPatch {
            set_source_ids: [("marriner".to_string(), "MG9".to_string())].into(),
            ..Default::default()
        };
        storage.update(event.id.unwrap(), &patch).await.unwrap();

        assert!(storage
            .find_by_source_id("marriner", "MG9")
            .await
            .unwrap()
            .is_some());
    }
}
