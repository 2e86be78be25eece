// Daybook - Mutation Coordinator
// Optimistic item mutation with rollback, and the single-slot
// "undo last completion" cache
//
// Every state change follows the same shape: capture the pre-mutation
// snapshot, apply the new state to the local store immediately, write
// through the gateway, and on rejection restore the snapshot before
// surfacing the error. Rollback is diff-based: a field is restored
// only while the local value still carries this mutation's optimistic
// state, so a late rollback cannot clobber a newer mutation that
// already moved the field again. Writes themselves stay unconditional
// last-write-wins by id; two rapid mutations on one item are not
// serialized against each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::data_gateway::DataGateway;
use crate::error::{CoreError, Result};
use crate::item_store::ItemStore;
use crate::models::{Note, NotePatch, Recording, Task, TaskPatch, TaskStatus};
use crate::tags::extract_tags;

/// Pre-completion snapshot retained for "undo last completion".
/// Overwritten by the next completion, consumed at most once. Soft
/// expiry (a display-duration window) is the presentation layer's
/// job; `completed_at` is the timestamp it needs for that.
#[derive(Debug, Clone)]
pub struct CompletionUndo {
    pub snapshot: Task,
    pub completed_at: DateTime<Utc>,
}

pub struct MutationCoordinator {
    gateway: Arc<dyn DataGateway>,
    store: Arc<ItemStore>,
    undo_slot: Mutex<Option<CompletionUndo>>,
}

impl MutationCoordinator {
    pub fn new(gateway: Arc<dyn DataGateway>, store: Arc<ItemStore>) -> Self {
        Self {
            gateway,
            store,
            undo_slot: Mutex::new(None),
        }
    }

    /// Peek the undo slot without consuming it.
    pub fn last_completion(&self) -> Option<CompletionUndo> {
        self.undo_slot.lock().clone()
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Flip a task between pending and completed.
    pub async fn toggle_task_status(
        &self,
        owner_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let task = match self.store.task(id) {
            Some(t) => t,
            None => {
                log::warn!("toggle on unknown task {}", id);
                return Ok(());
            }
        };
        if task.is_completed() {
            self.uncomplete_task(owner_id, id).await
        } else {
            self.complete_task(owner_id, id, now).await
        }
    }

    /// Mark a task completed: status flips and completedAt is set to
    /// "now". The pre-completion snapshot lands in the undo slot.
    pub async fn complete_task(
        &self,
        owner_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = match self.store.task(id) {
            Some(t) => t,
            None => {
                log::warn!("complete on unknown task {}", id);
                return Ok(());
            }
        };

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            completed_at: Some(Some(now)),
            ..Default::default()
        };
        let optimistic = self.apply_task_patch_locally(&snapshot, &patch);

        *self.undo_slot.lock() = Some(CompletionUndo {
            snapshot: snapshot.clone(),
            completed_at: now,
        });

        match self.gateway.update_task(owner_id, id, &patch).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => {
                log::debug!("task {} gone remotely, will drop on next pass", id);
                Ok(())
            }
            Err(e) => {
                self.rollback_task(&snapshot, &optimistic);
                // A failed completion is not a completion: don't let
                // undo restore a state that is already current
                let mut slot = self.undo_slot.lock();
                if slot.as_ref().map(|u| u.snapshot.id) == Some(id) {
                    *slot = None;
                }
                Err(e)
            }
        }
    }

    /// Un-complete a task: status returns to pending and completedAt
    /// is cleared back to null, not merely falsy.
    pub async fn uncomplete_task(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let snapshot = match self.store.task(id) {
            Some(t) => t,
            None => {
                log::warn!("uncomplete on unknown task {}", id);
                return Ok(());
            }
        };

        let patch = TaskPatch {
            status: Some(TaskStatus::Pending),
            completed_at: Some(None),
            ..Default::default()
        };
        let optimistic = self.apply_task_patch_locally(&snapshot, &patch);

        match self.gateway.update_task(owner_id, id, &patch).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => Ok(()),
            Err(e) => {
                self.rollback_task(&snapshot, &optimistic);
                Err(e)
            }
        }
    }

    /// Consume the undo slot and restore the pre-completion status and
    /// completedAt, locally and remotely. Returns false when the slot
    /// is empty. The slot is never read again after consumption.
    pub async fn undo_last_completion(&self, owner_id: Uuid) -> Result<bool> {
        let undo = match self.undo_slot.lock().take() {
            Some(u) => u,
            None => return Ok(false),
        };
        let id = undo.snapshot.id;

        let current = match self.store.task(id) {
            Some(t) => t,
            None => {
                log::warn!("undo on unknown task {}", id);
                return Ok(false);
            }
        };

        // Only the fields the completion touched are restored, so a
        // text edit made after completing survives the undo
        let patch = TaskPatch {
            status: Some(undo.snapshot.status),
            completed_at: Some(undo.snapshot.completed_at),
            ..Default::default()
        };
        let optimistic = self.apply_task_patch_locally(&current, &patch);

        match self.gateway.update_task(owner_id, id, &patch).await {
            Ok(()) => Ok(true),
            Err(CoreError::StaleReference(_)) => Ok(true),
            Err(e) => {
                self.rollback_task(&current, &optimistic);
                Err(e)
            }
        }
    }

    /// Replace a task's text (and its parsed tags).
    pub async fn edit_task_text(&self, owner_id: Uuid, id: Uuid, text: &str) -> Result<()> {
        let snapshot = match self.store.task(id) {
            Some(t) => t,
            None => return Ok(()),
        };

        let patch = TaskPatch {
            text: Some(text.to_string()),
            tags: Some(extract_tags(text)),
            ..Default::default()
        };
        let optimistic = self.apply_task_patch_locally(&snapshot, &patch);

        match self.gateway.update_task(owner_id, id, &patch).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => Ok(()),
            Err(e) => {
                self.rollback_task(&snapshot, &optimistic);
                Err(e)
            }
        }
    }

    /// Create a task, visible immediately.
    pub async fn insert_task(
        &self,
        owner_id: Uuid,
        text: &str,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut task = Task::new(owner_id, text, now);
        task.due_date = due_date;
        self.store.upsert_task(task.clone());

        match self.gateway.insert_task(&task).await {
            Ok(()) => Ok(task),
            Err(e) => {
                // Remove the optimistic row unless something already
                // replaced it
                if self.store.task(task.id).as_ref() == Some(&task) {
                    self.store.remove_task(task.id);
                }
                Err(e)
            }
        }
    }

    /// Hard-delete a task.
    pub async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let snapshot = match self.store.remove_task(id) {
            Some(t) => t,
            None => return Ok(()),
        };

        match self.gateway.delete_task(owner_id, id).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => Ok(()),
            Err(e) => {
                if self.store.task(id).is_none() {
                    self.store.upsert_task(snapshot);
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Create a note, visible immediately.
    pub async fn insert_note(
        &self,
        owner_id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Note> {
        let note = Note::new(owner_id, text, now);
        self.store.upsert_note(note.clone());

        match self.gateway.insert_note(&note).await {
            Ok(()) => Ok(note),
            Err(e) => {
                if self.store.note(note.id).as_ref() == Some(&note) {
                    self.store.remove_note(note.id);
                }
                Err(e)
            }
        }
    }

    /// Archive a note. Notes are never hard-deleted from this client.
    pub async fn archive_note(&self, owner_id: Uuid, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let snapshot = match self.store.note(id) {
            Some(n) => n,
            None => return Ok(()),
        };

        let patch = NotePatch {
            is_archived: Some(true),
            updated_at: Some(now),
            ..Default::default()
        };
        let optimistic = self.apply_note_patch_locally(&snapshot, &patch);

        match self.gateway.archive_note(owner_id, id, now).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => Ok(()),
            Err(e) => {
                self.rollback_note(&snapshot, &optimistic);
                Err(e)
            }
        }
    }

    /// Replace a note's text (and its parsed tags).
    pub async fn edit_note_text(
        &self,
        owner_id: Uuid,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let snapshot = match self.store.note(id) {
            Some(n) => n,
            None => return Ok(()),
        };

        let patch = NotePatch {
            text: Some(text.to_string()),
            tags: Some(extract_tags(text)),
            updated_at: Some(now),
            ..Default::default()
        };
        let optimistic = self.apply_note_patch_locally(&snapshot, &patch);

        match self.gateway.update_note(owner_id, id, &patch).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => Ok(()),
            Err(e) => {
                self.rollback_note(&snapshot, &optimistic);
                Err(e)
            }
        }
    }

    // =========================================================================
    // Recordings
    // =========================================================================

    /// Register a freshly captured recording. Enrichment has not run
    /// yet, so it starts unprocessed.
    pub async fn insert_recording(
        &self,
        owner_id: Uuid,
        audio_url: &str,
        duration_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Recording> {
        let recording = Recording::new(owner_id, audio_url, duration_seconds, now);
        self.store.upsert_recording(recording.clone());

        match self.gateway.insert_recording(&recording).await {
            Ok(()) => Ok(recording),
            Err(e) => {
                if self.store.recording(recording.id).as_ref() == Some(&recording) {
                    self.store.remove_recording(recording.id);
                }
                Err(e)
            }
        }
    }

    /// Hard-delete a recording. Derived rows keep their back-reference
    /// but are not cascaded by the client.
    pub async fn delete_recording(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let snapshot = match self.store.remove_recording(id) {
            Some(r) => r,
            None => return Ok(()),
        };

        match self.gateway.delete_recording(owner_id, id).await {
            Ok(()) => Ok(()),
            Err(CoreError::StaleReference(_)) => Ok(()),
            Err(e) => {
                if self.store.recording(id).is_none() {
                    self.store.upsert_recording(snapshot);
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Rollback helpers
    // =========================================================================

    fn apply_task_patch_locally(&self, snapshot: &Task, patch: &TaskPatch) -> Task {
        self.store.with_task_mut(snapshot.id, |task| patch.apply(task));
        let mut optimistic = snapshot.clone();
        patch.apply(&mut optimistic);
        optimistic
    }

    fn apply_note_patch_locally(&self, snapshot: &Note, patch: &NotePatch) -> Note {
        self.store.with_note_mut(snapshot.id, |note| patch.apply(note));
        let mut optimistic = snapshot.clone();
        patch.apply(&mut optimistic);
        optimistic
    }

    /// Restore snapshot fields, but only where the current value still
    /// equals what this mutation wrote.
    fn rollback_task(&self, snapshot: &Task, optimistic: &Task) {
        self.store.with_task_mut(snapshot.id, |current| {
            if current.text == optimistic.text {
                current.text = snapshot.text.clone();
            }
            if current.status == optimistic.status {
                current.status = snapshot.status;
            }
            if current.due_date == optimistic.due_date {
                current.due_date = snapshot.due_date;
            }
            if current.completed_at == optimistic.completed_at {
                current.completed_at = snapshot.completed_at;
            }
            if current.tags == optimistic.tags {
                current.tags = snapshot.tags.clone();
            }
        });
    }

    fn rollback_note(&self, snapshot: &Note, optimistic: &Note) {
        self.store.with_note_mut(snapshot.id, |current| {
            if current.text == optimistic.text {
                current.text = snapshot.text.clone();
            }
            if current.is_archived == optimistic.is_archived {
                current.is_archived = snapshot.is_archived;
            }
            if current.tags == optimistic.tags {
                current.tags = snapshot.tags.clone();
            }
            if current.updated_at == optimistic.updated_at {
                current.updated_at = snapshot.updated_at;
            }
        });
    }
}
