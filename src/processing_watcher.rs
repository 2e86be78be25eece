//! Processing Watcher - poll-driven tracker for recording enrichment
//!
//! One watcher per open recording view. While the recording is
//! unprocessed it polls the row and its derived children on a short
//! fixed interval; the instant a poll observes the processed flag it
//! stops the interval and fires a small bounded set of delayed
//! catch-up polls to collect child rows that lag the parent flag.
//! Every timer is scoped to the watcher and dies with it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::data_gateway::DataGateway;
use crate::enrichment_client::EnrichmentClient;
use crate::error::{CoreError, Result};
use crate::models::{Note, ProcessingState, Recording, Task};

/// Timing knobs for one watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Fast poll cadence while the recording is unprocessed
    pub poll_interval: Duration,
    /// Delayed one-shot polls fired once after the processed flip.
    /// Best-effort compensation for eventually-consistent child rows,
    /// not a correctness guarantee.
    pub catchup_delays: Vec<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            catchup_delays: vec![
                Duration::from_millis(500),
                Duration::from_millis(1500),
                Duration::from_millis(3000),
            ],
        }
    }
}

/// Latest observed enrichment output for the watched recording
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSnapshot {
    pub recording: Option<Recording>,
    pub tasks: Vec<Task>,
    pub notes: Vec<Note>,
}

impl EnrichmentSnapshot {
    pub fn state(&self) -> ProcessingState {
        self.recording
            .as_ref()
            .map(ProcessingState::of)
            .unwrap_or(ProcessingState::Unprocessed)
    }
}

/// Status surface for a stall affordance in the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub state: ProcessingState,
    pub watching: bool,
    pub polls_issued: u64,
    pub started_at: Option<DateTime<Utc>>,
}

pub type SnapshotCallback = Arc<dyn Fn(EnrichmentSnapshot) + Send + Sync>;

pub struct ProcessingWatcher {
    gateway: Arc<dyn DataGateway>,
    enrichment: Option<Arc<EnrichmentClient>>,
    owner_id: Uuid,
    recording_id: Uuid,
    config: WatcherConfig,
    snapshot: Arc<RwLock<EnrichmentSnapshot>>,
    on_update: Arc<RwLock<Option<SnapshotCallback>>>,
    running: Arc<AtomicBool>,
    polls_issued: Arc<AtomicU64>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ProcessingWatcher {
    pub fn new(
        gateway: Arc<dyn DataGateway>,
        enrichment: Option<Arc<EnrichmentClient>>,
        owner_id: Uuid,
        recording_id: Uuid,
        config: WatcherConfig,
    ) -> Self {
        Self {
            gateway,
            enrichment,
            owner_id,
            recording_id,
            config,
            snapshot: Arc::new(RwLock::new(EnrichmentSnapshot::default())),
            on_update: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            polls_issued: Arc::new(AtomicU64::new(0)),
            started_at: RwLock::new(None),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recording_id(&self) -> Uuid {
        self.recording_id
    }

    /// Set the callback fired after every poll that changed or
    /// refreshed the snapshot.
    pub fn on_update(&self, callback: SnapshotCallback) {
        *self.on_update.write() = Some(callback);
    }

    pub fn snapshot(&self) -> EnrichmentSnapshot {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> ProcessingState {
        self.snapshot.read().state()
    }

    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            state: self.state(),
            watching: self.running.load(Ordering::SeqCst),
            polls_issued: self.polls_issued.load(Ordering::SeqCst),
            started_at: *self.started_at.read(),
        }
    }

    /// Start the poll loop. `now` stamps the status surface only; the
    /// timers themselves are tokio sleeps.
    pub fn start(&self, now: DateTime<Utc>) {
        if self.running.load(Ordering::SeqCst) {
            log::debug!("watcher for {} already running", self.recording_id);
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        *self.started_at.write() = Some(now);
        log::info!("watching recording {}", self.recording_id);

        let gateway = self.gateway.clone();
        let owner_id = self.owner_id;
        let recording_id = self.recording_id;
        let config = self.config.clone();
        let snapshot = self.snapshot.clone();
        let on_update = self.on_update.clone();
        let running = self.running.clone();
        let polls_issued = self.polls_issued.clone();
        let handles = self.handles.clone();

        let loop_handle = tokio::spawn(Self::run_loop(
            gateway,
            owner_id,
            recording_id,
            config,
            snapshot,
            on_update,
            running,
            polls_issued,
            handles.clone(),
        ));
        handles.lock().push(loop_handle);
    }

    /// Cancel every timer owned by this watcher. Deterministic: after
    /// this returns no further poll will be issued.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        log::debug!("watcher for {} stopped", self.recording_id);
    }

    /// Reset to Unprocessed and re-arm the fast interval without
    /// contacting the enrichment service. Used after local state
    /// already indicates a rerun is underway.
    pub fn rearm(&self, now: DateTime<Utc>) {
        self.stop();
        {
            let mut snap = self.snapshot.write();
            if let Some(ref mut recording) = snap.recording {
                recording.is_processed = false;
            }
        }
        self.start(now);
    }

    /// Ask the enrichment service to redo its work, force the state
    /// back to Unprocessed, and re-arm watching.
    pub async fn reprocess(&self, now: DateTime<Utc>) -> Result<()> {
        let client = self
            .enrichment
            .clone()
            .ok_or_else(|| CoreError::Enrichment("no enrichment client configured".to_string()))?;

        let audio_reference = match self.snapshot.read().recording {
            Some(ref r) => r.audio_url.clone(),
            None => {
                return Err(CoreError::Enrichment(format!(
                    "recording {} not yet observed",
                    self.recording_id
                )))
            }
        };

        client
            .request_reprocess(self.recording_id, &audio_reference)
            .await?;
        self.rearm(now);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        gateway: Arc<dyn DataGateway>,
        owner_id: Uuid,
        recording_id: Uuid,
        config: WatcherConfig,
        snapshot: Arc<RwLock<EnrichmentSnapshot>>,
        on_update: Arc<RwLock<Option<SnapshotCallback>>>,
        running: Arc<AtomicBool>,
        polls_issued: Arc<AtomicU64>,
        handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    ) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }

            let processed = Self::poll_once(
                &gateway,
                owner_id,
                recording_id,
                &snapshot,
                &on_update,
                &polls_issued,
            )
            .await;

            if processed {
                log::info!(
                    "recording {} processed, scheduling {} catch-up polls",
                    recording_id,
                    config.catchup_delays.len()
                );
                // The fast interval ends here and never resumes; only
                // the fixed catch-up one-shots remain
                for delay in config.catchup_delays.iter().copied() {
                    let gateway = gateway.clone();
                    let snapshot = snapshot.clone();
                    let on_update = on_update.clone();
                    let running = running.clone();
                    let polls_issued = polls_issued.clone();

                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if running.load(Ordering::SeqCst) {
                            Self::poll_once(
                                &gateway,
                                owner_id,
                                recording_id,
                                &snapshot,
                                &on_update,
                                &polls_issued,
                            )
                            .await;
                        }
                    });
                    handles.lock().push(handle);
                }
                return;
            }

            tokio::time::sleep(config.poll_interval).await;
        }
    }

    /// One poll: fetch the recording row and its derived children,
    /// merge into the snapshot, notify. Returns whether the merged
    /// recording is processed. Transient fetch errors keep the
    /// last-known-good snapshot.
    async fn poll_once(
        gateway: &Arc<dyn DataGateway>,
        owner_id: Uuid,
        recording_id: Uuid,
        snapshot: &Arc<RwLock<EnrichmentSnapshot>>,
        on_update: &Arc<RwLock<Option<SnapshotCallback>>>,
        polls_issued: &Arc<AtomicU64>,
    ) -> bool {
        polls_issued.fetch_add(1, Ordering::SeqCst);

        let recording = match gateway.get_recording(owner_id, recording_id).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("poll of recording {} failed: {}", recording_id, e);
                return snapshot.read().state() == ProcessingState::Processed;
            }
        };
        let tasks = gateway
            .tasks_for_recording(owner_id, recording_id)
            .await
            .unwrap_or_default();
        let notes = gateway
            .notes_for_recording(owner_id, recording_id)
            .await
            .unwrap_or_default();

        let merged = {
            let mut snap = snapshot.write();
            if recording.is_some() {
                snap.recording = recording;
            }
            merge_by_id(&mut snap.tasks, tasks, |t| t.id);
            merge_by_id(&mut snap.notes, notes, |n| n.id);
            snap.clone()
        };

        if let Some(ref cb) = *on_update.read() {
            cb(merged.clone());
        }
        merged.state() == ProcessingState::Processed
    }
}

impl Drop for ProcessingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Merge freshly fetched rows into the accumulated list, de-duplicated
/// by id. Existing entries are refreshed in place; rows a later poll
/// no longer returns are kept (eventual consistency can hide them
/// transiently).
fn merge_by_id<T, F: Fn(&T) -> Uuid>(existing: &mut Vec<T>, fetched: Vec<T>, id_of: F) {
    for row in fetched {
        let id = id_of(&row);
        match existing.iter_mut().find(|e| id_of(e) == id) {
            Some(slot) => *slot = row,
            None => existing.push(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_gateway::MemoryGateway;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (Arc<MemoryGateway>, Uuid, Recording) {
        let gateway = Arc::new(MemoryGateway::new());
        let owner = Uuid::new_v4();
        let recording = Recording::new(owner, "audio/r.m4a", 42, Utc::now());
        gateway.seed_recording(recording.clone());
        (gateway, owner, recording)
    }

    fn watcher(
        gateway: Arc<MemoryGateway>,
        owner: Uuid,
        recording_id: Uuid,
    ) -> ProcessingWatcher {
        ProcessingWatcher::new(
            gateway,
            None,
            owner,
            recording_id,
            WatcherConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_unprocessed() {
        let (gateway, owner, recording) = setup();
        let w = watcher(gateway, owner, recording.id);
        w.start(Utc::now());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(w.state(), ProcessingState::Unprocessed);
        w.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flip_stops_interval_and_fires_bounded_catchups() {
        let (gateway, owner, mut recording) = setup();
        let w = watcher(gateway.clone(), owner, recording.id);
        w.start(Utc::now());

        // Let the fast interval run a few times
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(w.state(), ProcessingState::Unprocessed);

        // Server finishes enrichment
        recording.is_processed = true;
        recording.transcript = Some("hello world".to_string());
        gateway.seed_recording(recording.clone());

        // Next tick observes the flip, then only the three catch-up
        // one-shots may fire
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(w.state(), ProcessingState::Processed);
        let after_catchups = w.status().polls_issued;

        // The fast interval must never resume
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(w.status().polls_issued, after_catchups);
        w.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_children_are_deduplicated_across_polls() {
        let (gateway, owner, mut recording) = setup();

        let mut child = Task::new(owner, "mined task", Utc::now());
        child.source_recording_id = Some(recording.id);
        gateway.seed_task(child.clone());

        recording.is_processed = true;
        gateway.seed_recording(recording.clone());

        let w = watcher(gateway.clone(), owner, recording.id);
        w.start(Utc::now());

        // Interval poll plus all catch-up polls see the same child
        tokio::time::sleep(Duration::from_secs(10)).await;
        let snap = w.snapshot();
        assert_eq!(snap.tasks.len(), 1);
        assert_eq!(snap.tasks[0].id, child.id);
        w.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_catchup_collects_lagging_children() {
        let (gateway, owner, mut recording) = setup();
        recording.is_processed = true;
        gateway.seed_recording(recording.clone());

        let w = watcher(gateway.clone(), owner, recording.id);
        w.start(Utc::now());

        // First poll sees the flip with no children yet
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(w.snapshot().tasks.is_empty());

        // Child row lands late, inside the catch-up window
        let mut child = Task::new(owner, "late child", Utc::now());
        child.source_recording_id = Some(recording.id);
        gateway.seed_task(child.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(w.snapshot().tasks.len(), 1);
        w.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_all_timers() {
        let (gateway, owner, recording) = setup();
        let w = watcher(gateway, owner, recording.id);
        w.start(Utc::now());

        tokio::time::sleep(Duration::from_secs(3)).await;
        w.stop();
        let at_stop = w.status().polls_issued;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(w.status().polls_issued, at_stop);
        assert!(!w.status().watching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_resumes_fast_interval() {
        let (gateway, owner, mut recording) = setup();
        recording.is_processed = true;
        gateway.seed_recording(recording.clone());

        let w = watcher(gateway.clone(), owner, recording.id);
        w.start(Utc::now());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(w.state(), ProcessingState::Processed);

        // User asks for a rerun: state snaps back and polling resumes
        recording.is_processed = false;
        gateway.seed_recording(recording.clone());
        w.rearm(Utc::now());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(w.state(), ProcessingState::Unprocessed);
        assert!(w.status().watching);

        let before = w.status().polls_issued;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(w.status().polls_issued > before);
        w.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_keep_last_known_good() {
        let (gateway, owner, mut recording) = setup();
        recording.transcript = Some("partial".to_string());
        gateway.seed_recording(recording.clone());

        let w = watcher(gateway.clone(), owner, recording.id);
        w.start(Utc::now());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(w.snapshot().recording.is_some());

        gateway.set_fail_reads(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        let snap = w.snapshot();
        assert_eq!(
            snap.recording.as_ref().and_then(|r| r.transcript.as_deref()),
            Some("partial")
        );
        w.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_callback_fires() {
        let (gateway, owner, recording) = setup();
        let w = watcher(gateway, owner, recording.id);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cb = calls.clone();
        w.on_update(Arc::new(move |_snap| {
            calls_cb.fetch_add(1, Ordering::SeqCst);
        }));

        w.start(Utc::now());
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
        w.stop();
    }
}
