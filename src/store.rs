//! Local lecture library. The store owns every persisted `Lecture` record;
//! callers construct one `LectureStore` and pass it around.

use crate::db::{self, Pool};
use crate::model::{Lecture, LectureStatus};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Repository over the local SQLite database. The connection is opened
/// lazily on first use; concurrent first callers share one in-flight
/// initialization, so schema setup runs exactly once.
#[derive(Debug)]
pub struct LectureStore {
    database_url: String,
    pool: OnceCell<Pool>,
}

impl LectureStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&Pool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = db::init_pool(&self.database_url).await?;
                db::run_migrations(&pool).await?;
                Ok::<_, anyhow::Error>(pool)
            })
            .await
            .context("failed to open lecture database")
    }

    /// Upsert keyed by `id`. Replaces every field of an existing record
    /// except `created_at`, which keeps its first-write value. Rejects
    /// records whose quiz indices are out of range and status changes that
    /// would move a terminal record back to `processing`.
    #[instrument(skip_all, fields(id = %lecture.id))]
    pub async fn save_lecture(&self, lecture: &Lecture) -> Result<()> {
        if let Some(quiz) = &lecture.quiz {
            for (i, item) in quiz.iter().enumerate() {
                if item.correct_answer >= item.options.len() {
                    bail!(
                        "quiz item {} of lecture {} has correct_answer {} but only {} options",
                        i,
                        lecture.id,
                        item.correct_answer,
                        item.options.len()
                    );
                }
            }
        }

        let pool = self.pool().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT status FROM lectures WHERE id = ?")
                .bind(&lecture.id)
                .fetch_optional(pool)
                .await?;
        if let Some(prior) = existing.as_deref().and_then(LectureStatus::parse) {
            if prior.is_terminal() && lecture.status == LectureStatus::Processing {
                bail!(
                    "lecture {} is already {} and cannot return to processing",
                    lecture.id,
                    prior
                );
            }
        }

        let flashcards = lecture
            .flashcards
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode flashcards")?;
        let quiz = lecture
            .quiz
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode quiz")?;

        sqlx::query(
            "INSERT INTO lectures (id, title, status, transcript, notes, flashcards, quiz, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 status = excluded.status,
                 transcript = excluded.transcript,
                 notes = excluded.notes,
                 flashcards = excluded.flashcards,
                 quiz = excluded.quiz,
                 error = excluded.error",
        )
        .bind(&lecture.id)
        .bind(&lecture.title)
        .bind(lecture.status.as_str())
        .bind(&lecture.transcript)
        .bind(&lecture.notes)
        .bind(flashcards)
        .bind(quiz)
        .bind(&lecture.error)
        .bind(lecture.created_at.to_rfc3339())
        .execute(pool)
        .await?;
        debug!("lecture saved");
        Ok(())
    }

    #[instrument(skip_all, fields(id = %id))]
    pub async fn get_lecture(&self, id: &str) -> Result<Option<Lecture>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT * FROM lectures WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(|r| lecture_from_row(&r)).transpose()
    }

    /// All lectures, newest first.
    #[instrument(skip_all)]
    pub async fn get_all_lectures(&self) -> Result<Vec<Lecture>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT * FROM lectures ORDER BY created_at DESC, id")
            .fetch_all(pool)
            .await?;
        rows.iter().map(lecture_from_row).collect()
    }

    /// Removing an absent id is not an error.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn delete_lecture(&self, id: &str) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM lectures WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Case-insensitive substring match on title over the full current set.
    #[instrument(skip_all)]
    pub async fn search_lectures(&self, term: &str) -> Result<Vec<Lecture>> {
        let needle = term.to_lowercase();
        let all = self.get_all_lectures().await?;
        Ok(all
            .into_iter()
            .filter(|l| l.title.to_lowercase().contains(&needle))
            .collect())
    }

    #[instrument(skip_all, fields(status = %status))]
    pub async fn lectures_by_status(&self, status: LectureStatus) -> Result<Vec<Lecture>> {
        let pool = self.pool().await?;
        let rows =
            sqlx::query("SELECT * FROM lectures WHERE status = ? ORDER BY created_at DESC, id")
                .bind(status.as_str())
                .fetch_all(pool)
                .await?;
        rows.iter().map(lecture_from_row).collect()
    }

    #[instrument(skip_all)]
    pub async fn clear_all(&self) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM lectures").execute(pool).await?;
        Ok(())
    }

    /// Serialize the full collection, newest first, as pretty-printed JSON.
    pub async fn export_to_json(&self) -> Result<String> {
        let lectures = self.get_all_lectures().await?;
        serde_json::to_string_pretty(&lectures).context("failed to serialize lectures")
    }

    /// Parse a JSON array of lectures and upsert each in turn. Malformed
    /// JSON rejects the entire import before anything is written; a store
    /// failure mid-way stops the import and reports how many records made
    /// it in. Returns the number imported.
    #[instrument(skip_all)]
    pub async fn import_from_json(&self, json: &str) -> Result<usize> {
        let lectures: Vec<Lecture> =
            serde_json::from_str(json).context("import is not a valid lecture JSON array")?;
        let mut applied = 0usize;
        for lecture in &lectures {
            self.save_lecture(lecture)
                .await
                .with_context(|| format!("import stopped after {applied} records"))?;
            applied += 1;
        }
        debug!(applied, "import finished");
        Ok(applied)
    }
}

fn lecture_from_row(row: &SqliteRow) -> Result<Lecture> {
    let status_raw: String = row.get("status");
    let status = LectureStatus::parse(&status_raw)
        .with_context(|| format!("unknown lecture status '{status_raw}' in store"))?;

    let flashcards = row
        .get::<Option<String>, _>("flashcards")
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .context("corrupt flashcards column")?;
    let quiz = row
        .get::<Option<String>, _>("quiz")
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .context("corrupt quiz column")?;

    let created_raw: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .context("corrupt created_at column")?
        .with_timezone(&Utc);

    Ok(Lecture {
        id: row.get("id"),
        title: row.get("title"),
        status,
        transcript: row.get("transcript"),
        notes: row.get("notes"),
        flashcards,
        quiz,
        created_at,
        error: row.get("error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Flashcard, QuizItem};
    use chrono::Duration;

    fn store() -> LectureStore {
        LectureStore::new("sqlite::memory:")
    }

    fn lecture(id: &str, title: &str, age_mins: i64) -> Lecture {
        Lecture {
            id: id.into(),
            title: title.into(),
            status: LectureStatus::Completed,
            transcript: Some("hello class".into()),
            notes: Some("# Notes\n\n- point".into()),
            flashcards: Some(vec![Flashcard {
                question: "Q?".into(),
                answer: "A.".into(),
                difficulty: Some("easy".into()),
            }]),
            quiz: Some(vec![QuizItem {
                question: "Pick one".into(),
                options: vec!["a".into(), "b".into(), "c".into()],
                correct_answer: 1,
                explanation: None,
            }]),
            created_at: Utc::now() - Duration::minutes(age_mins),
            error: None,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = store();
        let original = lecture("lec-1", "Intro to Algorithms", 0);
        store.save_lecture(&original).await.unwrap();

        let loaded = store.get_lecture("lec-1").await.unwrap().unwrap();
        assert_eq!(loaded, original);

        assert!(store.get_lecture("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_all_returns_newest_first() {
        let store = store();
        store.save_lecture(&lecture("old", "Oldest", 30)).await.unwrap();
        store.save_lecture(&lecture("mid", "Middle", 20)).await.unwrap();
        store.save_lecture(&lecture("new", "Newest", 10)).await.unwrap();

        let all = store.get_all_lectures().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn upsert_replaces_fields_but_not_created_at() {
        let store = store();
        let first = lecture("lec-1", "Draft title", 5);
        store.save_lecture(&first).await.unwrap();

        let mut replacement = lecture("lec-1", "Final title", 0);
        replacement.transcript = None;
        replacement.notes = Some("rewritten".into());
        store.save_lecture(&replacement).await.unwrap();

        let loaded = store.get_lecture("lec-1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Final title");
        assert_eq!(loaded.notes.as_deref(), Some("rewritten"));
        // Replacement is total: fields absent in the new record are gone.
        assert!(loaded.transcript.is_none());
        // First-write timestamp survives the upsert.
        assert_eq!(loaded.created_at, first.created_at);

        assert_eq!(store.get_all_lectures().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_status_never_reverts() {
        let store = store();
        store.save_lecture(&lecture("lec-1", "Done", 0)).await.unwrap();

        let mut revert = lecture("lec-1", "Done", 0);
        revert.status = LectureStatus::Processing;
        let err = store.save_lecture(&revert).await.unwrap_err();
        assert!(err.to_string().contains("cannot return to processing"));

        // Replacement between terminal states stays legal.
        let mut failed = lecture("lec-1", "Done", 0);
        failed.status = LectureStatus::Failed;
        failed.error = Some("reprocessed and failed".into());
        store.save_lecture(&failed).await.unwrap();
    }

    #[tokio::test]
    async fn quiz_index_invariant_enforced_on_save() {
        let store = store();
        let mut bad = lecture("lec-1", "Broken quiz", 0);
        bad.quiz = Some(vec![QuizItem {
            question: "?".into(),
            options: vec!["only".into()],
            correct_answer: 3,
            explanation: None,
        }]);
        let err = store.save_lecture(&bad).await.unwrap_err();
        assert!(err.to_string().contains("correct_answer"));
        assert!(store.get_lecture("lec-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        store.save_lecture(&lecture("lec-1", "Bye", 0)).await.unwrap();
        store.delete_lecture("lec-1").await.unwrap();
        assert!(store.get_lecture("lec-1").await.unwrap().is_none());
        // Absent id is fine.
        store.delete_lecture("lec-1").await.unwrap();
    }

    #[tokio::test]
    async fn search_matches_title_case_insensitively() {
        let store = store();
        store
            .save_lecture(&lecture("lec-1", "Intro to Algorithms", 10))
            .await
            .unwrap();
        store
            .save_lecture(&lecture("lec-2", "Organic Chemistry", 5))
            .await
            .unwrap();

        let hits = store.search_lectures("algo").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "lec-1");

        assert!(store.search_lectures("zzz").await.unwrap().is_empty());
        assert_eq!(store.search_lectures("o").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_lookup_uses_status_column() {
        let store = store();
        let mut processing = lecture("lec-1", "Still going", 0);
        processing.status = LectureStatus::Processing;
        store.save_lecture(&processing).await.unwrap();
        store.save_lecture(&lecture("lec-2", "Done", 0)).await.unwrap();

        let done = store
            .lectures_by_status(LectureStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "lec-2");
    }

    #[tokio::test]
    async fn export_import_round_trips() {
        let store = store();
        store.save_lecture(&lecture("lec-1", "One", 20)).await.unwrap();
        store.save_lecture(&lecture("lec-2", "Two", 10)).await.unwrap();
        store.save_lecture(&lecture("lec-3", "Three", 0)).await.unwrap();

        let exported = store.export_to_json().await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.get_all_lectures().await.unwrap().is_empty());

        let count = store.import_from_json(&exported).await.unwrap();
        assert_eq!(count, 3);

        let restored = store.get_all_lectures().await.unwrap();
        assert_eq!(restored.len(), 3);
        let ids: Vec<&str> = restored.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["lec-3", "lec-2", "lec-1"]);
        assert_eq!(restored[2].title, "One");
        assert_eq!(restored[2].flashcards.as_ref().unwrap().len(), 1);
        assert_eq!(restored[2].quiz.as_ref().unwrap()[0].correct_answer, 1);
    }

    #[tokio::test]
    async fn malformed_import_writes_nothing() {
        let store = store();
        let err = store.import_from_json("{\"not\": \"an array\"}").await;
        assert!(err.is_err());
        assert!(store.get_all_lectures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_with_bad_record_reports_progress() {
        let store = store();
        let good = lecture("lec-1", "Fine", 10);
        let mut bad = lecture("lec-2", "Broken", 0);
        bad.quiz = Some(vec![QuizItem {
            question: "?".into(),
            options: vec![],
            correct_answer: 0,
            explanation: None,
        }]);
        let json = serde_json::to_string(&vec![good, bad]).unwrap();

        let err = store.import_from_json(&json).await.unwrap_err();
        assert!(format!("{err:#}").contains("after 1 records"));
        // Best-effort: the first record stays.
        assert!(store.get_lecture("lec-1").await.unwrap().is_some());
        assert!(store.get_lecture("lec-2").await.unwrap().is_none());
    }
}
