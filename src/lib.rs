// Daybook - Core Library
// Client-side synchronization and aggregation layer for the Daybook
// capture app: timeline bucketing, optimistic mutations, enrichment
// watching, and relatedness ranking. Rendering, auth, and settings
// live in the surrounding application.

pub mod data_gateway;
pub mod enrichment_client;
pub mod env_config;
pub mod error;
pub mod item_store;
pub mod memory_gateway;
pub mod models;
pub mod mutation_coordinator;
pub mod processing_watcher;
pub mod relatedness;
pub mod supabase_gateway;
pub mod tags;
pub mod timeline_builder;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use futures_util::future::try_join3;
use uuid::Uuid;

use data_gateway::{DataGateway, FetchWindow};
use enrichment_client::EnrichmentClient;
use env_config::EnvConfig;
use error::Result;
use item_store::ItemStore;
use models::Day;
use mutation_coordinator::MutationCoordinator;
use processing_watcher::{ProcessingWatcher, WatcherConfig};
use relatedness::{rank_related, RelatedCandidate, RelatedMatch, DEFAULT_RELATED_LIMIT};
use supabase_gateway::SupabaseGateway;
use timeline_builder::{build_timeline, TimelineConfig};

/// Initialize logging for embedding applications that have no logger
/// of their own. Call once at startup.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Client core shared by every view of one signed-in owner. Owner id,
/// timezone, and "now" are always passed in; the core never reads
/// ambient identity or wall-clock state on its own.
pub struct DaybookCore {
    owner_id: Uuid,
    gateway: Arc<dyn DataGateway>,
    enrichment: Option<Arc<EnrichmentClient>>,
    store: Arc<ItemStore>,
    coordinator: MutationCoordinator,
    watcher_config: WatcherConfig,
}

impl DaybookCore {
    /// Connect against the configured Supabase project.
    pub async fn connect(owner_id: Uuid, config: &EnvConfig) -> anyhow::Result<Self> {
        let conn_str = config
            .supabase_connection_string
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SUPABASE_CONNECTION_STRING not configured"))?;

        log::info!("Connecting Daybook core for owner {}", owner_id);
        let gateway: Arc<dyn DataGateway> = Arc::new(SupabaseGateway::connect(conn_str).await?);

        let enrichment = match (
            config.enrichment_base_url.clone(),
            config.enrichment_bearer_token.clone(),
        ) {
            (Some(url), Some(token)) => Some(Arc::new(EnrichmentClient::new(url, token))),
            _ => {
                log::warn!("Enrichment service not configured; reprocess is unavailable");
                None
            }
        };

        let mut watcher_config = WatcherConfig::default();
        if let Some(ms) = config.poll_interval_ms {
            watcher_config.poll_interval = Duration::from_millis(ms);
        }

        Ok(Self::with_gateway(
            owner_id,
            gateway,
            enrichment,
            watcher_config,
        ))
    }

    /// Wire the core over any gateway. Used by tests and offline demos
    /// with a MemoryGateway.
    pub fn with_gateway(
        owner_id: Uuid,
        gateway: Arc<dyn DataGateway>,
        enrichment: Option<Arc<EnrichmentClient>>,
        watcher_config: WatcherConfig,
    ) -> Self {
        let store = Arc::new(ItemStore::new());
        let coordinator = MutationCoordinator::new(gateway.clone(), store.clone());
        Self {
            owner_id,
            gateway,
            enrichment,
            store,
            coordinator,
            watcher_config,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// All state changes go through here.
    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.store
    }

    /// One full aggregation pass: fetch the three item lists for the
    /// window, replace the working set, and build a fresh Day list.
    /// On a fetch failure the working set is left at its
    /// last-known-good state and the error surfaces to the caller.
    pub async fn refresh_timeline(
        &self,
        now: DateTime<Utc>,
        tz: FixedOffset,
        config: &TimelineConfig,
    ) -> Result<Vec<Day>> {
        let window = FetchWindow::around(now, config.days_back, config.days_forward, tz);

        let (tasks, notes, recordings) = try_join3(
            self.gateway.list_tasks(self.owner_id, window),
            self.gateway.list_notes(self.owner_id, window),
            self.gateway.list_recordings(self.owner_id, window),
        )
        .await?;

        self.store
            .replace_all(tasks.clone(), notes.clone(), recordings.clone());
        log::debug!(
            "refresh: {} tasks, {} notes, {} recordings",
            tasks.len(),
            notes.len(),
            recordings.len()
        );
        Ok(build_timeline(&tasks, &notes, &recordings, now, tz, config))
    }

    /// Rebuild the Day list from the current working set without
    /// touching the network. Used right after an optimistic mutation.
    pub fn local_timeline(
        &self,
        now: DateTime<Utc>,
        tz: FixedOffset,
        config: &TimelineConfig,
    ) -> Vec<Day> {
        let (tasks, notes, recordings) = self.store.snapshot();
        build_timeline(&tasks, &notes, &recordings, now, tz, config)
    }

    /// A watcher for one recording's enrichment progress. The caller
    /// owns it: drop it (or call stop) on view teardown or when the
    /// watched id changes.
    pub fn watch_recording(&self, recording_id: Uuid) -> ProcessingWatcher {
        ProcessingWatcher::new(
            self.gateway.clone(),
            self.enrichment.clone(),
            self.owner_id,
            recording_id,
            self.watcher_config.clone(),
        )
    }

    /// Top related notes/tasks for a detail view, ranked by keyword
    /// overlap against the source item's text.
    pub fn related_items(&self, source_id: Uuid, source_text: &str) -> Vec<RelatedMatch> {
        let pool: Vec<RelatedCandidate> = self
            .store
            .related_pool()
            .into_iter()
            .map(|(id, text, _)| RelatedCandidate { id, text })
            .collect();
        rank_related(source_id, source_text, &pool, DEFAULT_RELATED_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_gateway::MemoryGateway;
    use crate::models::{Note, Task};

    fn core_with_memory() -> (Arc<MemoryGateway>, DaybookCore, Uuid) {
        let gateway = Arc::new(MemoryGateway::new());
        let owner = Uuid::new_v4();
        let core = DaybookCore::with_gateway(
            owner,
            gateway.clone(),
            None,
            WatcherConfig::default(),
        );
        (gateway, core, owner)
    }

    #[tokio::test]
    async fn test_refresh_builds_days_and_fills_store() {
        let (gateway, core, owner) = core_with_memory();
        let now = Utc::now();
        gateway.seed_task(Task::new(owner, "today task", now));
        gateway.seed_note(Note::new(owner, "today note", now));

        let days = core
            .refresh_timeline(now, FixedOffset::east_opt(0).unwrap(), &TimelineConfig::default())
            .await
            .unwrap();

        let config = TimelineConfig::default();
        assert_eq!(
            days.len() as u32,
            config.days_back + 1 + config.days_forward
        );
        let today = days.iter().find(|d| d.label == "Today").unwrap();
        assert_eq!(today.items.len(), 2);

        let (tasks, notes, _) = core.store().snapshot();
        assert_eq!(tasks.len(), 1);
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_known_good() {
        let (gateway, core, owner) = core_with_memory();
        let now = Utc::now();
        gateway.seed_task(Task::new(owner, "persisted", now));

        let tz = FixedOffset::east_opt(0).unwrap();
        core.refresh_timeline(now, tz, &TimelineConfig::default())
            .await
            .unwrap();

        gateway.set_fail_reads(true);
        let err = core
            .refresh_timeline(now, tz, &TimelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, error::CoreError::TransientFetch(_)));

        // Working set still holds the previous fetch
        let (tasks, _, _) = core.store().snapshot();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "persisted");
    }

    #[tokio::test]
    async fn test_local_timeline_reflects_optimistic_mutations() {
        let (gateway, core, owner) = core_with_memory();
        let now = Utc::now();
        let tz = FixedOffset::east_opt(0).unwrap();
        gateway.seed_task(Task::new(owner, "flip me", now));

        core.refresh_timeline(now, tz, &TimelineConfig::default())
            .await
            .unwrap();
        let (tasks, _, _) = core.store().snapshot();
        core.coordinator()
            .complete_task(owner, tasks[0].id, now)
            .await
            .unwrap();

        let days = core.local_timeline(now, tz, &TimelineConfig::default());
        let today = days.iter().find(|d| d.label == "Today").unwrap();
        assert_eq!(today.stats.completed_tasks, 1);
    }

    #[tokio::test]
    async fn test_related_items_use_working_set() {
        let (gateway, core, owner) = core_with_memory();
        let now = Utc::now();
        let tz = FixedOffset::east_opt(0).unwrap();

        let source = Note::new(owner, "Meet Alex about marketing budget", now);
        gateway.seed_note(source.clone());
        gateway.seed_note(Note::new(owner, "Budget review with Alex next week", now));
        gateway.seed_note(Note::new(owner, "Completely unrelated", now));

        core.refresh_timeline(now, tz, &TimelineConfig::default())
            .await
            .unwrap();

        let related = core.related_items(source.id, &source.text);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].score, 2);
        assert!(related.iter().all(|m| m.id != source.id));
    }
}
