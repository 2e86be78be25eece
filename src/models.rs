// Daybook - Item Models
// Tasks, notes, and recordings, plus the Day buckets they roll up into

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tags::extract_tags;

/// Item kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Task,
    Note,
    Recording,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Note => "note",
            Self::Recording => "recording",
        }
    }
}

/// Task completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

/// Task record
///
/// Invariant: `completed_at` is non-null iff `status` is Completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: String,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    /// Back-reference to the recording this task was mined from, if any.
    /// Never an ownership link.
    pub source_recording_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task from user-entered text. Tags are parsed
    /// out of the text.
    pub fn new(owner_id: Uuid, text: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            text: text.to_string(),
            status: TaskStatus::Pending,
            due_date: None,
            completed_at: None,
            tags: extract_tags(text),
            source_recording_id: None,
            created_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Note record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: String,
    pub is_archived: bool,
    pub tags: Vec<String>,
    pub source_recording_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(owner_id: Uuid, text: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            text: text.to_string(),
            is_archived: false,
            tags: extract_tags(text),
            source_recording_id: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Voice recording record. Transcript, summary, and extracted fields
/// are populated by the enrichment service after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub audio_url: String,
    pub duration_seconds: i64,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub extracted_people: Vec<String>,
    /// Server-controlled flag: set once enrichment has completed.
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

impl Recording {
    pub fn new(
        owner_id: Uuid,
        audio_url: &str,
        duration_seconds: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            audio_url: audio_url.to_string(),
            duration_seconds,
            transcript: None,
            summary: None,
            tags: Vec::new(),
            extracted_people: Vec::new(),
            is_processed: false,
            created_at,
        }
    }

    /// Best display text for scoring and previews: summary first,
    /// then transcript.
    pub fn display_text(&self) -> &str {
        self.summary
            .as_deref()
            .or(self.transcript.as_deref())
            .unwrap_or("")
    }
}

/// Derived enrichment status of a recording, never persisted
/// client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Unprocessed,
    Processed,
}

impl ProcessingState {
    pub fn of(recording: &Recording) -> Self {
        if recording.is_processed {
            Self::Processed
        } else {
            Self::Unprocessed
        }
    }
}

/// Any item that can appear on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimelineItem {
    Task(Task),
    Note(Note),
    Recording(Recording),
}

impl TimelineItem {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Task(t) => t.id,
            Self::Note(n) => n.id,
            Self::Recording(r) => r.id,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match self {
            Self::Task(t) => t.owner_id,
            Self::Note(n) => n.owner_id,
            Self::Recording(r) => r.owner_id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Task(_) => ItemKind::Task,
            Self::Note(_) => ItemKind::Note,
            Self::Recording(_) => ItemKind::Recording,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Task(t) => t.created_at,
            Self::Note(n) => n.created_at,
            Self::Recording(r) => r.created_at,
        }
    }

    pub fn source_recording_id(&self) -> Option<Uuid> {
        match self {
            Self::Task(t) => t.source_recording_id,
            Self::Note(n) => n.source_recording_id,
            Self::Recording(_) => None,
        }
    }

    /// Free text used for relatedness scoring and previews.
    pub fn text(&self) -> &str {
        match self {
            Self::Task(t) => &t.text,
            Self::Note(n) => &n.text,
            Self::Recording(r) => r.display_text(),
        }
    }
}

/// Per-day rollup counts shown alongside a Day header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    pub tasks: usize,
    pub completed_tasks: usize,
    pub notes: usize,
    pub recordings: usize,
    pub recorded_seconds: i64,
}

/// Items that share an hour of the "today" Day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourBucket {
    /// Hour of day, 0-23, in the aggregation timezone
    pub hour: u32,
    pub items: Vec<TimelineItem>,
}

/// One date-keyed partition of the timeline. Produced fresh on every
/// aggregation pass; never patched incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Day {
    pub date_key: NaiveDate,
    pub label: String,
    pub items: Vec<TimelineItem>,
    /// Populated only for the Day containing "now"
    pub hours: Option<Vec<HourBucket>>,
    pub stats: DayStats,
}

impl Day {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Partial updates
// =============================================================================

/// Partial update for a task. `None` leaves a column alone; the nested
/// `Option` distinguishes clearing a nullable column from skipping it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    /// Apply this patch to an in-memory task.
    pub fn apply(&self, task: &mut Task) {
        if let Some(ref text) = self.text {
            task.text = text.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(ref tags) = self.tags {
            task.tags = tags.clone();
        }
    }
}

/// Partial update for a note
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    pub text: Option<String>,
    pub is_archived: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NotePatch {
    pub fn apply(&self, note: &mut Note) {
        if let Some(ref text) = self.text {
            note.text = text.clone();
        }
        if let Some(is_archived) = self.is_archived {
            note.is_archived = is_archived;
        }
        if let Some(ref tags) = self.tags {
            note.tags = tags.clone();
        }
        if let Some(updated_at) = self.updated_at {
            note.updated_at = updated_at;
        }
    }
}

/// Partial update for a recording. Mostly written by the enrichment
/// service; the client uses it to clear `is_processed` on reprocess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingPatch {
    pub transcript: Option<Option<String>>,
    pub summary: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub extracted_people: Option<Vec<String>>,
    pub is_processed: Option<bool>,
}

impl RecordingPatch {
    pub fn apply(&self, recording: &mut Recording) {
        if let Some(ref transcript) = self.transcript {
            recording.transcript = transcript.clone();
        }
        if let Some(ref summary) = self.summary {
            recording.summary = summary.clone();
        }
        if let Some(ref tags) = self.tags {
            recording.tags = tags.clone();
        }
        if let Some(ref people) = self.extracted_people {
            recording.extracted_people = people.clone();
        }
        if let Some(is_processed) = self.is_processed {
            recording.is_processed = is_processed;
        }
    }
}
