// Daybook - Item Store
// In-memory view of the fetched items, shared between the refresh
// pass and the mutation coordinator

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::{Note, Recording, Task};

/// The local working set. Replaced wholesale by each aggregation pass
/// and mutated optimistically by the coordinator in between.
#[derive(Default)]
pub struct ItemStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    notes: RwLock<HashMap<Uuid, Note>>,
    recordings: RwLock<HashMap<Uuid, Recording>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole working set with a fresh fetch snapshot.
    pub fn replace_all(&self, tasks: Vec<Task>, notes: Vec<Note>, recordings: Vec<Recording>) {
        *self.tasks.write() = tasks.into_iter().map(|t| (t.id, t)).collect();
        *self.notes.write() = notes.into_iter().map(|n| (n.id, n)).collect();
        *self.recordings.write() = recordings.into_iter().map(|r| (r.id, r)).collect();
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    pub fn note(&self, id: Uuid) -> Option<Note> {
        self.notes.read().get(&id).cloned()
    }

    pub fn recording(&self, id: Uuid) -> Option<Recording> {
        self.recordings.read().get(&id).cloned()
    }

    pub fn upsert_task(&self, task: Task) {
        self.tasks.write().insert(task.id, task);
    }

    pub fn upsert_note(&self, note: Note) {
        self.notes.write().insert(note.id, note);
    }

    pub fn upsert_recording(&self, recording: Recording) {
        self.recordings.write().insert(recording.id, recording);
    }

    pub fn remove_task(&self, id: Uuid) -> Option<Task> {
        self.tasks.write().remove(&id)
    }

    pub fn remove_note(&self, id: Uuid) -> Option<Note> {
        self.notes.write().remove(&id)
    }

    pub fn remove_recording(&self, id: Uuid) -> Option<Recording> {
        self.recordings.write().remove(&id)
    }

    /// Mutate a task in place; returns false if it is not in the set.
    pub fn with_task_mut<F: FnOnce(&mut Task)>(&self, id: Uuid, f: F) -> bool {
        match self.tasks.write().get_mut(&id) {
            Some(task) => {
                f(task);
                true
            }
            None => false,
        }
    }

    pub fn with_note_mut<F: FnOnce(&mut Note)>(&self, id: Uuid, f: F) -> bool {
        match self.notes.write().get_mut(&id) {
            Some(note) => {
                f(note);
                true
            }
            None => false,
        }
    }

    /// Current working set, cloned. Tasks/notes/recordings in no
    /// particular order; the timeline builder sorts per day.
    pub fn snapshot(&self) -> (Vec<Task>, Vec<Note>, Vec<Recording>) {
        (
            self.tasks.read().values().cloned().collect(),
            self.notes.read().values().cloned().collect(),
            self.recordings.read().values().cloned().collect(),
        )
    }

    /// Non-archived notes and pending/completed tasks sorted newest
    /// first: the relatedness candidate pool.
    pub fn related_pool(&self) -> Vec<(Uuid, String, chrono::DateTime<chrono::Utc>)> {
        let mut pool: Vec<(Uuid, String, chrono::DateTime<chrono::Utc>)> = Vec::new();
        for note in self.notes.read().values() {
            if !note.is_archived {
                pool.push((note.id, note.text.clone(), note.created_at));
            }
        }
        for task in self.tasks.read().values() {
            pool.push((task.id, task.text.clone(), task.created_at));
        }
        pool.sort_by(|a, b| b.2.cmp(&a.2));
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_replace_all_is_wholesale() {
        let store = ItemStore::new();
        let owner = Uuid::new_v4();
        let stale = Task::new(owner, "stale", Utc::now());
        store.upsert_task(stale.clone());

        let fresh = Task::new(owner, "fresh", Utc::now());
        store.replace_all(vec![fresh.clone()], vec![], vec![]);

        assert!(store.task(stale.id).is_none());
        assert_eq!(store.task(fresh.id).unwrap().text, "fresh");
    }

    #[test]
    fn test_related_pool_skips_archived_notes() {
        let store = ItemStore::new();
        let owner = Uuid::new_v4();
        let mut archived = Note::new(owner, "old news", Utc::now());
        archived.is_archived = true;
        let live = Note::new(owner, "live note", Utc::now());
        store.replace_all(vec![], vec![archived.clone(), live.clone()], vec![]);

        let pool = store.related_pool();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].0, live.id);
    }

    #[test]
    fn test_related_pool_sorted_by_recency() {
        let store = ItemStore::new();
        let owner = Uuid::new_v4();
        let older = Task::new(owner, "older", "2024-01-01T00:00:00Z".parse().unwrap());
        let newer = Task::new(owner, "newer", "2024-01-02T00:00:00Z".parse().unwrap());
        store.replace_all(vec![older.clone(), newer.clone()], vec![], vec![]);

        let pool = store.related_pool();
        assert_eq!(pool[0].0, newer.id);
        assert_eq!(pool[1].0, older.id);
    }
}
