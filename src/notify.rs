use async_trait::async_trait;
use tracing::info;

use crate::catalog::CanonicalEvent;
use crate::error::Result;
use crate::merge::DetectedChanges;

/// Interface the orchestrator calls when a merge or update reveals a change
/// worth telling people about. Audience selection and delivery belong to the
/// notification/digest collaborator; this engine only emits the trigger, and
/// only best-effort: a failed emit never rolls back an applied merge.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Invoked at most once per merged/updated record per batch run.
    async fn on_significant_change(
        &self,
        event: &CanonicalEvent,
        changes: &DetectedChanges,
    ) -> Result<()>;

    /// Invoked for freshly inserted events so downstream interest-matching
    /// can pick them up. No favourited audience exists yet for these.
    async fn on_new_event(&self, event: &CanonicalEvent) -> Result<()>;
}

/// Default emitter: writes the trigger to the log and nothing else. Useful
/// in development and as the fallback when no delivery channel is wired up.
pub struct LogNotifier;

#[async_trait]
impl ChangeNotifier for LogNotifier {
    async fn on_significant_change(
        &self,
        event: &CanonicalEvent,
        changes: &DetectedChanges,
    ) -> Result<()> {
        info!(
            title = %event.title,
            price_dropped = changes.price_dropped,
            price_drop = ?changes.price_drop,
            significant_update = ?changes.significant_update,
            "Significant change detected"
        );
        Ok(())
    }

    async fn on_new_event(&self, event: &CanonicalEvent) -> Result<()> {
        info!(title = %event.title, source = %event.primary_source, "New event entered the catalog");
        Ok(())
    }
}
