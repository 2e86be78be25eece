//! Supabase gateway: the production DataGateway over Postgres.
//!
//! Owner scoping, time windows, and sorting happen server-side; the
//! enrichment pipeline writes derived rows into the same tables with
//! `source_recording_id` set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::data_gateway::{DataGateway, FetchWindow};
use crate::error::{CoreError, Result};
use crate::models::{Note, NotePatch, Recording, RecordingPatch, Task, TaskPatch, TaskStatus};

pub struct SupabaseGateway {
    pool: PgPool,
}

impl SupabaseGateway {
    /// Connect to Supabase Postgres and ensure the schema exists.
    pub async fn connect(conn_str: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(conn_str)
            .await
            .map_err(|e| CoreError::Config(format!("failed to connect to Supabase: {}", e)))?;

        let gateway = Self { pool };
        gateway.run_migrations().await?;
        log::info!("Connected to Supabase Postgres");
        Ok(gateway)
    }

    /// Wrap an existing pool (used by integration tests).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id UUID PRIMARY KEY,
                owner_id UUID NOT NULL,
                text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                due_date TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                tags TEXT[] NOT NULL DEFAULT '{}',
                source_recording_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Config(format!("failed to create tasks table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id UUID PRIMARY KEY,
                owner_id UUID NOT NULL,
                text TEXT NOT NULL,
                is_archived BOOLEAN NOT NULL DEFAULT FALSE,
                tags TEXT[] NOT NULL DEFAULT '{}',
                source_recording_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Config(format!("failed to create notes table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recordings (
                id UUID PRIMARY KEY,
                owner_id UUID NOT NULL,
                audio_url TEXT NOT NULL,
                duration_seconds BIGINT NOT NULL DEFAULT 0,
                transcript TEXT,
                summary TEXT,
                tags TEXT[] NOT NULL DEFAULT '{}',
                extracted_people TEXT[] NOT NULL DEFAULT '{}',
                is_processed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Config(format!("failed to create recordings table: {}", e)))?;

        // Indexes for the windowed list fetches and child lookups
        let _ = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_owner_created ON tasks(owner_id, created_at)",
        )
        .execute(&self.pool)
        .await;
        let _ = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notes_owner_created ON notes(owner_id, created_at)",
        )
        .execute(&self.pool)
        .await;
        let _ = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_recordings_owner_created ON recordings(owner_id, created_at)",
        )
        .execute(&self.pool)
        .await;
        let _ = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_source ON tasks(source_recording_id)",
        )
        .execute(&self.pool)
        .await;
        let _ = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notes_source ON notes(source_recording_id)",
        )
        .execute(&self.pool)
        .await;

        log::info!("Supabase schema migrations completed");
        Ok(())
    }
}

fn task_from_row(row: &PgRow) -> Task {
    let status: String = row.get("status");
    Task {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        text: row.get("text"),
        status: TaskStatus::parse(&status),
        due_date: row.get("due_date"),
        completed_at: row.get("completed_at"),
        tags: row.get("tags"),
        source_recording_id: row.get("source_recording_id"),
        created_at: row.get("created_at"),
    }
}

fn note_from_row(row: &PgRow) -> Note {
    Note {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        text: row.get("text"),
        is_archived: row.get("is_archived"),
        tags: row.get("tags"),
        source_recording_id: row.get("source_recording_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn recording_from_row(row: &PgRow) -> Recording {
    Recording {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        audio_url: row.get("audio_url"),
        duration_seconds: row.get("duration_seconds"),
        transcript: row.get("transcript"),
        summary: row.get("summary"),
        tags: row.get("tags"),
        extracted_people: row.get("extracted_people"),
        is_processed: row.get("is_processed"),
        created_at: row.get("created_at"),
    }
}

fn fetch_err(what: &str, e: sqlx::Error) -> CoreError {
    CoreError::TransientFetch(format!("failed to fetch {}: {}", what, e))
}

fn write_err(what: &str, e: sqlx::Error) -> CoreError {
    CoreError::MutationRejected(format!("failed to write {}: {}", what, e))
}

#[async_trait]
impl DataGateway for SupabaseGateway {
    async fn list_tasks(&self, owner_id: Uuid, window: FetchWindow) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, text, status, due_date, completed_at, tags,
                   source_recording_id, created_at
            FROM tasks
            WHERE owner_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at DESC
        "#,
        )
        .bind(owner_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| fetch_err("tasks", e))?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    async fn list_notes(&self, owner_id: Uuid, window: FetchWindow) -> Result<Vec<Note>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, text, is_archived, tags, source_recording_id,
                   created_at, updated_at
            FROM notes
            WHERE owner_id = $1 AND created_at >= $2 AND created_at < $3
              AND is_archived = FALSE
            ORDER BY created_at DESC
        "#,
        )
        .bind(owner_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| fetch_err("notes", e))?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn list_recordings(
        &self,
        owner_id: Uuid,
        window: FetchWindow,
    ) -> Result<Vec<Recording>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, audio_url, duration_seconds, transcript, summary,
                   tags, extracted_people, is_processed, created_at
            FROM recordings
            WHERE owner_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at DESC
        "#,
        )
        .bind(owner_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| fetch_err("recordings", e))?;

        Ok(rows.iter().map(recording_from_row).collect())
    }

    async fn get_task(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, text, status, due_date, completed_at, tags,
                   source_recording_id, created_at
            FROM tasks WHERE owner_id = $1 AND id = $2
        "#,
        )
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| fetch_err("task", e))?;

        Ok(row.as_ref().map(task_from_row))
    }

    async fn get_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, text, is_archived, tags, source_recording_id,
                   created_at, updated_at
            FROM notes WHERE owner_id = $1 AND id = $2
        "#,
        )
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| fetch_err("note", e))?;

        Ok(row.as_ref().map(note_from_row))
    }

    async fn get_recording(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Recording>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, audio_url, duration_seconds, transcript, summary,
                   tags, extracted_people, is_processed, created_at
            FROM recordings WHERE owner_id = $1 AND id = $2
        "#,
        )
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| fetch_err("recording", e))?;

        Ok(row.as_ref().map(recording_from_row))
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, owner_id, text, status, due_date, completed_at,
                               tags, source_recording_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
        )
        .bind(task.id)
        .bind(task.owner_id)
        .bind(&task.text)
        .bind(task.status.as_str())
        .bind(task.due_date)
        .bind(task.completed_at)
        .bind(&task.tags)
        .bind(task.source_recording_id)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("task", e))?;

        Ok(())
    }

    async fn insert_note(&self, note: &Note) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, owner_id, text, is_archived, tags,
                               source_recording_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
        )
        .bind(note.id)
        .bind(note.owner_id)
        .bind(&note.text)
        .bind(note.is_archived)
        .bind(&note.tags)
        .bind(note.source_recording_id)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("note", e))?;

        Ok(())
    }

    async fn insert_recording(&self, recording: &Recording) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recordings (id, owner_id, audio_url, duration_seconds,
                                    transcript, summary, tags, extracted_people,
                                    is_processed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
        )
        .bind(recording.id)
        .bind(recording.owner_id)
        .bind(&recording.audio_url)
        .bind(recording.duration_seconds)
        .bind(&recording.transcript)
        .bind(&recording.summary)
        .bind(&recording.tags)
        .bind(&recording.extracted_people)
        .bind(recording.is_processed)
        .bind(recording.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("recording", e))?;

        Ok(())
    }

    async fn update_task(&self, owner_id: Uuid, id: Uuid, patch: &TaskPatch) -> Result<()> {
        // CASE-per-column keeps the patch semantics (skip vs clear) in
        // a single last-write-wins statement
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                text = CASE WHEN $3 THEN $4 ELSE text END,
                status = CASE WHEN $5 THEN $6 ELSE status END,
                due_date = CASE WHEN $7 THEN $8 ELSE due_date END,
                completed_at = CASE WHEN $9 THEN $10 ELSE completed_at END,
                tags = CASE WHEN $11 THEN $12 ELSE tags END
            WHERE owner_id = $1 AND id = $2
        "#,
        )
        .bind(owner_id)
        .bind(id)
        .bind(patch.text.is_some())
        .bind(&patch.text)
        .bind(patch.status.is_some())
        .bind(patch.status.map(|s| s.as_str().to_string()))
        .bind(patch.due_date.is_some())
        .bind(patch.due_date.flatten())
        .bind(patch.completed_at.is_some())
        .bind(patch.completed_at.flatten())
        .bind(patch.tags.is_some())
        .bind(&patch.tags)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("task", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleReference(id));
        }
        Ok(())
    }

    async fn update_note(&self, owner_id: Uuid, id: Uuid, patch: &NotePatch) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET
                text = CASE WHEN $3 THEN $4 ELSE text END,
                is_archived = CASE WHEN $5 THEN $6 ELSE is_archived END,
                tags = CASE WHEN $7 THEN $8 ELSE tags END,
                updated_at = CASE WHEN $9 THEN $10 ELSE updated_at END
            WHERE owner_id = $1 AND id = $2
        "#,
        )
        .bind(owner_id)
        .bind(id)
        .bind(patch.text.is_some())
        .bind(&patch.text)
        .bind(patch.is_archived.is_some())
        .bind(patch.is_archived)
        .bind(patch.tags.is_some())
        .bind(&patch.tags)
        .bind(patch.updated_at.is_some())
        .bind(patch.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("note", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleReference(id));
        }
        Ok(())
    }

    async fn update_recording(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: &RecordingPatch,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE recordings SET
                transcript = CASE WHEN $3 THEN $4 ELSE transcript END,
                summary = CASE WHEN $5 THEN $6 ELSE summary END,
                tags = CASE WHEN $7 THEN $8 ELSE tags END,
                extracted_people = CASE WHEN $9 THEN $10 ELSE extracted_people END,
                is_processed = CASE WHEN $11 THEN $12 ELSE is_processed END
            WHERE owner_id = $1 AND id = $2
        "#,
        )
        .bind(owner_id)
        .bind(id)
        .bind(patch.transcript.is_some())
        .bind(patch.transcript.clone().flatten())
        .bind(patch.summary.is_some())
        .bind(patch.summary.clone().flatten())
        .bind(patch.tags.is_some())
        .bind(&patch.tags)
        .bind(patch.extracted_people.is_some())
        .bind(&patch.extracted_people)
        .bind(patch.is_processed.is_some())
        .bind(patch.is_processed)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("recording", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleReference(id));
        }
        Ok(())
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_err("task", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleReference(id));
        }
        Ok(())
    }

    async fn archive_note(&self, owner_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE notes SET is_archived = TRUE, updated_at = $3 WHERE owner_id = $1 AND id = $2",
        )
        .bind(owner_id)
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err("note", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleReference(id));
        }
        Ok(())
    }

    async fn delete_recording(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM recordings WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_err("recording", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StaleReference(id));
        }
        Ok(())
    }

    async fn tasks_for_recording(
        &self,
        owner_id: Uuid,
        recording_id: Uuid,
    ) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, text, status, due_date, completed_at, tags,
                   source_recording_id, created_at
            FROM tasks
            WHERE owner_id = $1 AND source_recording_id = $2
            ORDER BY created_at DESC
        "#,
        )
        .bind(owner_id)
        .bind(recording_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| fetch_err("derived tasks", e))?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    async fn notes_for_recording(
        &self,
        owner_id: Uuid,
        recording_id: Uuid,
    ) -> Result<Vec<Note>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, text, is_archived, tags, source_recording_id,
                   created_at, updated_at
            FROM notes
            WHERE owner_id = $1 AND source_recording_id = $2
            ORDER BY created_at DESC
        "#,
        )
        .bind(owner_id)
        .bind(recording_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| fetch_err("derived notes", e))?;

        Ok(rows.iter().map(note_from_row).collect())
    }
}
