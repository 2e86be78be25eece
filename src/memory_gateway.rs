// Daybook - Memory Gateway
// In-memory DataGateway used by tests and offline demos. Supports
// failure injection so the coordinator's rollback paths and the
// watcher's transient-error handling can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::data_gateway::{DataGateway, FetchWindow};
use crate::error::{CoreError, Result};
use crate::models::{Note, NotePatch, Recording, RecordingPatch, Task, TaskPatch};

#[derive(Default)]
pub struct MemoryGateway {
    tasks: RwLock<HashMap<Uuid, Task>>,
    notes: RwLock<HashMap<Uuid, Note>>,
    recordings: RwLock<HashMap<Uuid, Recording>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail with TransientFetch until cleared.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with MutationRejected until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a row directly, bypassing failure injection. Used by tests
    /// and by enrichment simulations.
    pub fn seed_task(&self, task: Task) {
        self.tasks.write().insert(task.id, task);
    }

    pub fn seed_note(&self, note: Note) {
        self.notes.write().insert(note.id, note);
    }

    pub fn seed_recording(&self, recording: Recording) {
        self.recordings.write().insert(recording.id, recording);
    }

    /// Server-side view of a task, for assertions.
    pub fn stored_task(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    pub fn stored_note(&self, id: Uuid) -> Option<Note> {
        self.notes.read().get(&id).cloned()
    }

    pub fn stored_recording(&self, id: Uuid) -> Option<Recording> {
        self.recordings.read().get(&id).cloned()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(CoreError::TransientFetch("injected read failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(CoreError::MutationRejected(
                "injected write failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn windowed<T: Clone>(
    rows: &HashMap<Uuid, T>,
    owner_id: Uuid,
    window: FetchWindow,
    owner_of: impl Fn(&T) -> Uuid,
    created_of: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut out: Vec<T> = rows
        .values()
        .filter(|r| owner_of(r) == owner_id && window.contains(created_of(r)))
        .cloned()
        .collect();
    out.sort_by(|a, b| created_of(b).cmp(&created_of(a)));
    out
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn list_tasks(&self, owner_id: Uuid, window: FetchWindow) -> Result<Vec<Task>> {
        self.check_read()?;
        Ok(windowed(&*self.tasks.read(), owner_id, window, |t| t.owner_id, |t| t.created_at))
    }

    async fn list_notes(&self, owner_id: Uuid, window: FetchWindow) -> Result<Vec<Note>> {
        self.check_read()?;
        let mut notes =
            windowed(&*self.notes.read(), owner_id, window, |n| n.owner_id, |n| n.created_at);
        // Archived notes leave the timeline on the next pass
        notes.retain(|n| !n.is_archived);
        Ok(notes)
    }

    async fn list_recordings(
        &self,
        owner_id: Uuid,
        window: FetchWindow,
    ) -> Result<Vec<Recording>> {
        self.check_read()?;
        Ok(windowed(
            &*self.recordings.read(),
            owner_id,
            window,
            |r| r.owner_id,
            |r| r.created_at,
        ))
    }

    async fn get_task(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Task>> {
        self.check_read()?;
        Ok(self
            .tasks
            .read()
            .get(&id)
            .filter(|t| t.owner_id == owner_id)
            .cloned())
    }

    async fn get_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>> {
        self.check_read()?;
        Ok(self
            .notes
            .read()
            .get(&id)
            .filter(|n| n.owner_id == owner_id)
            .cloned())
    }

    async fn get_recording(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Recording>> {
        self.check_read()?;
        Ok(self
            .recordings
            .read()
            .get(&id)
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        self.check_write()?;
        self.tasks.write().insert(task.id, task.clone());
        Ok(())
    }

    async fn insert_note(&self, note: &Note) -> Result<()> {
        self.check_write()?;
        self.notes.write().insert(note.id, note.clone());
        Ok(())
    }

    async fn insert_recording(&self, recording: &Recording) -> Result<()> {
        self.check_write()?;
        self.recordings.write().insert(recording.id, recording.clone());
        Ok(())
    }

    async fn update_task(&self, owner_id: Uuid, id: Uuid, patch: &TaskPatch) -> Result<()> {
        self.check_write()?;
        let mut tasks = self.tasks.write();
        match tasks.get_mut(&id).filter(|t| t.owner_id == owner_id) {
            Some(task) => {
                patch.apply(task);
                Ok(())
            }
            None => Err(CoreError::StaleReference(id)),
        }
    }

    async fn update_note(&self, owner_id: Uuid, id: Uuid, patch: &NotePatch) -> Result<()> {
        self.check_write()?;
        let mut notes = self.notes.write();
        match notes.get_mut(&id).filter(|n| n.owner_id == owner_id) {
            Some(note) => {
                patch.apply(note);
                Ok(())
            }
            None => Err(CoreError::StaleReference(id)),
        }
    }

    async fn update_recording(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &RecordingPatch,
    ) -> Result<()> {
        self.check_write()?;
        let mut recordings = self.recordings.write();
        match recordings.get_mut(&id).filter(|r| r.owner_id == owner_id) {
            Some(recording) => {
                patch.apply(recording);
                Ok(())
            }
            None => Err(CoreError::StaleReference(id)),
        }
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        self.check_write()?;
        let mut tasks = self.tasks.write();
        let owned = tasks.get(&id).map_or(false, |t| t.owner_id == owner_id);
        if !owned {
            return Err(CoreError::StaleReference(id));
        }
        tasks.remove(&id);
        Ok(())
    }

    async fn archive_note(&self, owner_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.check_write()?;
        let mut notes = self.notes.write();
        match notes.get_mut(&id).filter(|n| n.owner_id == owner_id) {
            Some(note) => {
                note.is_archived = true;
                note.updated_at = at;
                Ok(())
            }
            None => Err(CoreError::StaleReference(id)),
        }
    }

    async fn delete_recording(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        self.check_write()?;
        let mut recordings = self.recordings.write();
        let owned = recordings.get(&id).map_or(false, |r| r.owner_id == owner_id);
        if !owned {
            return Err(CoreError::StaleReference(id));
        }
        recordings.remove(&id);
        Ok(())
    }

    async fn tasks_for_recording(
        &self,
        owner_id: Uuid,
        recording_id: Uuid,
    ) -> Result<Vec<Task>> {
        self.check_read()?;
        let mut out: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| t.owner_id == owner_id && t.source_recording_id == Some(recording_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn notes_for_recording(
        &self,
        owner_id: Uuid,
        recording_id: Uuid,
    ) -> Result<Vec<Note>> {
        self.check_read()?;
        let mut out: Vec<Note> = self
            .notes
            .read()
            .values()
            .filter(|n| n.owner_id == owner_id && n.source_recording_id == Some(recording_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn window_around(now: DateTime<Utc>) -> FetchWindow {
        FetchWindow::around(now, 7, 7, FixedOffset::east_opt(0).unwrap())
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped_and_windowed() {
        let gw = MemoryGateway::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();

        gw.seed_task(Task::new(owner, "mine", now));
        gw.seed_task(Task::new(other, "theirs", now));
        gw.seed_task(Task::new(owner, "ancient", now - Duration::days(30)));

        let tasks = gw.list_tasks(owner, window_around(now)).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "mine");
    }

    #[tokio::test]
    async fn test_update_missing_row_is_stale_reference() {
        let gw = MemoryGateway::new();
        let err = gw
            .update_task(Uuid::new_v4(), Uuid::new_v4(), &TaskPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StaleReference(_)));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let gw = MemoryGateway::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        gw.set_fail_reads(true);
        assert!(matches!(
            gw.list_tasks(owner, window_around(now)).await,
            Err(CoreError::TransientFetch(_))
        ));
        gw.set_fail_reads(false);

        gw.set_fail_writes(true);
        let task = Task::new(owner, "x", now);
        assert!(matches!(
            gw.insert_task(&task).await,
            Err(CoreError::MutationRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_children_filtered_by_source_recording() {
        let gw = MemoryGateway::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let rec = Recording::new(owner, "a.m4a", 30, now);

        let mut child = Task::new(owner, "mined", now);
        child.source_recording_id = Some(rec.id);
        let loose = Task::new(owner, "typed by hand", now);
        gw.seed_recording(rec.clone());
        gw.seed_task(child.clone());
        gw.seed_task(loose);

        let children = gw.tasks_for_recording(owner, rec.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
    }
}
