// Daybook - Data Gateway
// Owner-scoped CRUD seam over the remote item store
//
// The core consumes this trait; transport lives behind it. Reads fail
// with TransientFetch, writes with MutationRejected, and updates or
// deletes of a row the store no longer has with StaleReference. No
// operation is transactional across item kinds.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Note, NotePatch, Recording, RecordingPatch, Task, TaskPatch};

/// Half-open creation-time window for list fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering whole local days around "now": local midnight
    /// `days_back` days ago up to local midnight after `days_forward`
    /// days. Matches the timeline builder's day range so nothing the
    /// builder would bucket is missing from the fetch.
    pub fn around(
        now: DateTime<Utc>,
        days_back: u32,
        days_forward: u32,
        tz: FixedOffset,
    ) -> Self {
        let local_midnight = now
            .with_timezone(&tz)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_local_timezone(tz)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);
        Self {
            start: local_midnight - Duration::days(days_back as i64),
            end: local_midnight + Duration::days(days_forward as i64 + 1),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Remote store operations, one set per item kind. List fetches are
/// owner-scoped, creation-time-windowed, and sorted newest first.
/// Fetch-by-id returns `Ok(None)` for rows the store no longer has.
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn list_tasks(&self, owner_id: Uuid, window: FetchWindow) -> Result<Vec<Task>>;
    async fn list_notes(&self, owner_id: Uuid, window: FetchWindow) -> Result<Vec<Note>>;
    async fn list_recordings(&self, owner_id: Uuid, window: FetchWindow)
        -> Result<Vec<Recording>>;

    async fn get_task(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Task>>;
    async fn get_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>>;
    async fn get_recording(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Recording>>;

    async fn insert_task(&self, task: &Task) -> Result<()>;
    async fn insert_note(&self, note: &Note) -> Result<()>;
    async fn insert_recording(&self, recording: &Recording) -> Result<()>;

    async fn update_task(&self, owner_id: Uuid, id: Uuid, patch: &TaskPatch) -> Result<()>;
    async fn update_note(&self, owner_id: Uuid, id: Uuid, patch: &NotePatch) -> Result<()>;
    async fn update_recording(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &RecordingPatch,
    ) -> Result<()>;

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<()>;
    /// Notes prefer archive over hard delete.
    async fn archive_note(&self, owner_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn delete_recording(&self, owner_id: Uuid, id: Uuid) -> Result<()>;

    /// Derived rows the enrichment service mined from a recording.
    /// Polled by the processing watcher.
    async fn tasks_for_recording(&self, owner_id: Uuid, recording_id: Uuid)
        -> Result<Vec<Task>>;
    async fn notes_for_recording(&self, owner_id: Uuid, recording_id: Uuid)
        -> Result<Vec<Note>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_around_covers_builder_range() {
        let now: DateTime<Utc> = "2024-01-10T12:00:00Z".parse().unwrap();
        let tz = FixedOffset::east_opt(0).unwrap();
        let window = FetchWindow::around(now, 2, 1, tz);

        assert!(window.contains("2024-01-08T00:00:00Z".parse().unwrap()));
        assert!(window.contains("2024-01-11T23:59:59Z".parse().unwrap()));
        assert!(!window.contains("2024-01-07T23:59:59Z".parse().unwrap()));
        assert!(!window.contains("2024-01-12T00:00:00Z".parse().unwrap()));
    }

    #[test]
    fn test_window_around_respects_timezone() {
        // 01:00 UTC on Jan 10 is still Jan 9 at UTC-5, so the local
        // window starts a day earlier in UTC terms
        let now: DateTime<Utc> = "2024-01-10T01:00:00Z".parse().unwrap();
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let window = FetchWindow::around(now, 0, 0, tz);

        assert_eq!(window.start, "2024-01-09T05:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(window.end, "2024-01-10T05:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
