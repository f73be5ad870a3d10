use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::MatcherConfig;
use crate::constants::MAX_CONSECUTIVE_STORAGE_FAILURES;
use crate::error::{CatalogError, Result};
use crate::merge::{detect_changes, merge, refresh, DetectedChanges};
use crate::notify::ChangeNotifier;
use crate::pool::BatchPool;
use crate::resolver::resolve;
use crate::storage::Storage;
use crate::types::NormalizedRecord;
use crate::catalog::CanonicalEvent;

/// Aggregate outcome of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub inserted: usize,
    pub updated: usize,
    pub merged: usize,
    pub skipped: usize,
    pub notifications: usize,
}

impl std::fmt::Display for BatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} merged, {} skipped, {} notifications",
            self.inserted, self.updated, self.merged, self.skipped, self.notifications
        )
    }
}

/// Drives one scrape batch through the dedup/merge state machine:
/// fast path, pool match, merge or insert, notify, account.
///
/// Strictly sequential within a batch: each record's candidate pool depends
/// on mutations made by the records before it. Concurrent batches are not
/// safe against each other; the surrounding system serializes them.
pub struct BatchProcessor {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn ChangeNotifier>,
    config: MatcherConfig,
}

impl BatchProcessor {
    pub fn new(storage: Arc<dyn Storage>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self::with_config(storage, notifier, MatcherConfig::default())
    }

    pub fn with_config(
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn ChangeNotifier>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            storage,
            notifier,
            config,
        }
    }

    /// Process a full batch of normalized records from one scraper run.
    ///
    /// Per-record failures are isolated: a bad record is logged, counted as
    /// skipped, and the batch moves on. Only a snapshot failure or a run of
    /// consecutive storage failures aborts the batch; partial counts are
    /// logged before the error propagates.
    #[instrument(skip(self, records), fields(source = %source_name, batch_size = records.len()))]
    pub async fn process_batch(
        &self,
        records: Vec<NormalizedRecord>,
        source_name: &str,
    ) -> Result<BatchStats> {
        let started = std::time::Instant::now();
        counter!("catalog_batch_runs_total", "source" => source_name.to_string()).increment(1);

        let snapshot = self.storage.fetch_all().await?;
        info!(
            existing = snapshot.len(),
            incoming = records.len(),
            "Starting batch"
        );
        let mut pool = BatchPool::new(snapshot);

        let mut stats = BatchStats::default();
        let mut consecutive_failures = 0usize;

        for mut record in records {
            if record.source.is_empty() {
                record.source = source_name.to_string();
            }

            match self.process_record(&record, &mut pool, &mut stats).await {
                Ok(()) => {
                    consecutive_failures = 0;
                }
                Err(CatalogError::DuplicateKey {
                    source_name,
                    source_id,
                }) => {
                    // The fast path should have caught this; recoverable.
                    warn!(%source_name, %source_id, "Duplicate key on insert, skipping record");
                    stats.skipped += 1;
                    consecutive_failures = 0;
                }
                Err(e) => {
                    warn!(
                        title = %record.title,
                        source = %record.source,
                        error = %e,
                        "Failed to process record, skipping"
                    );
                    stats.skipped += 1;
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_STORAGE_FAILURES {
                        info!(partial = %stats, "Aborting batch after repeated storage failures");
                        return Err(CatalogError::Storage {
                            message: format!(
                                "{} consecutive storage failures, batch aborted",
                                consecutive_failures
                            ),
                        });
                    }
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        histogram!("catalog_batch_duration_seconds", "source" => source_name.to_string())
            .record(elapsed);
        counter!("catalog_records_inserted_total", "source" => source_name.to_string())
            .increment(stats.inserted as u64);
        counter!("catalog_records_updated_total", "source" => source_name.to_string())
            .increment(stats.updated as u64);
        counter!("catalog_records_merged_total", "source" => source_name.to_string())
            .increment(stats.merged as u64);
        counter!("catalog_records_skipped_total", "source" => source_name.to_string())
            .increment(stats.skipped as u64);

        info!(result = %stats, "Batch complete");
        Ok(stats)
    }

    async fn process_record(
        &self,
        record: &NormalizedRecord,
        pool: &mut BatchPool,
        stats: &mut BatchStats,
    ) -> Result<()> {
        let now = Utc::now();

        // Fast path: this source already contributed this exact record.
        let existing = pool
            .find_by_source_id(&record.source, &record.source_id)
            .cloned();
        if let Some(existing) = existing {
            let id = existing
                .id
                .ok_or_else(|| CatalogError::Storage {
                    message: format!("Pooled event for {} has no id", record.lineage_key()),
                })?;
            let changes = detect_changes(&existing, record, &self.config);
            let (updated, patch) = refresh(&existing, record, now);
            self.storage.update(id, &patch).await?;
            pool.apply(id, updated.clone());
            stats.updated += 1;
            debug!(title = %record.title, "Fast-path update");
            self.notify_if_changed(&updated, &changes, stats).await;
            return Ok(());
        }

        // Pool match: fuzzy resolution against snapshot + batch-pending events.
        let outcome = {
            let candidates = pool.candidates_for(record, self.config.date_window_days);
            resolve(record, &candidates, &self.config)
        };

        if let Some(outcome) = outcome {
            match pool.get(outcome.id).cloned() {
                Some(primary) => {
                    info!(
                        title = %record.title,
                        matched = %primary.title,
                        confidence = outcome.confidence,
                        reason = %outcome.reason,
                        "Cross-source duplicate"
                    );
                    let changes = detect_changes(&primary, record, &self.config);
                    let (updated, patch) = merge(&primary, record, now);
                    self.storage.update(outcome.id, &patch).await?;
                    pool.apply(outcome.id, updated.clone());
                    stats.merged += 1;
                    self.notify_if_changed(&updated, &changes, stats).await;
                    return Ok(());
                }
                None => {
                    // Resolver and pool disagree; fall through to insert
                    // rather than fail the batch.
                    warn!(
                        id = %outcome.id,
                        title = %record.title,
                        "Match result references an event missing from the pool, treating as no match"
                    );
                }
            }
        }

        // No match anywhere: a genuinely new event.
        let mut event = CanonicalEvent::from_record(record, now);
        self.storage.insert(&mut event).await?;
        debug!(title = %event.title, "Inserted new event");
        pool.push(event.clone());
        stats.inserted += 1;

        // New-event notifications feed interest matching downstream; there is
        // no favourited audience yet, so failures are only logged.
        if let Err(e) = self.notifier.on_new_event(&event).await {
            warn!(title = %event.title, error = %e, "New-event notification failed");
        }
        Ok(())
    }

    /// Emit the change trigger after the merge is durably applied. Delivery
    /// is best-effort; a failure is logged and the merge stands.
    async fn notify_if_changed(
        &self,
        event: &CanonicalEvent,
        changes: &DetectedChanges,
        stats: &mut BatchStats,
    ) {
        if !changes.is_notable() {
            return;
        }
        match self.notifier.on_significant_change(event, changes).await {
            Ok(()) => {
                stats.notifications += 1;
                counter!("catalog_notifications_total").increment(1);
            }
            Err(e) => {
                warn!(title = %event.title, error = %e, "Change notification failed");
            }
        }
    }
}
