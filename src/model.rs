use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Processing state of a lecture. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LectureStatus {
    Processing,
    Completed,
    Failed,
}

impl LectureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LectureStatus::Processing => "processing",
            LectureStatus::Completed => "completed",
            LectureStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(LectureStatus::Processing),
            "completed" => Some(LectureStatus::Completed),
            "failed" => Some(LectureStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LectureStatus::Processing)
    }
}

impl fmt::Display for LectureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

/// A single multiple-choice question. `correct_answer` indexes into `options`
/// and must be in range whenever the item is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Persisted study pack for one uploaded lecture. Owned exclusively by the
/// local store; mutation is full replacement keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lecture {
    pub id: String,
    pub title: String,
    pub status: LectureStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flashcards: Option<Vec<Flashcard>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizItem>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A file selected for upload. The content stays on disk until the upload
/// phase reads it; only metadata is carried around before that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

impl MediaFile {
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid file name: {}", path.display()))?
            .to_string();
        let content_type = content_type_for(&path).to_string();
        Ok(Self {
            path,
            file_name,
            content_type,
            size: meta.len(),
        })
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "mov" => "video/quicktime",
        Some(ext) if ext == "avi" => "video/x-msvideo",
        Some(ext) if ext == "webm" => "video/webm",
        Some(ext) if ext == "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// In-memory draft of an upload. Never persisted; dropped once the backend
/// returns a terminal result and the `Lecture` record takes over.
#[derive(Debug, Clone)]
pub struct LectureDraft {
    pub title: String,
    pub video: MediaFile,
    pub slides: Option<MediaFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            LectureStatus::Processing,
            LectureStatus::Completed,
            LectureStatus::Failed,
        ] {
            assert_eq!(LectureStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LectureStatus::parse("queued"), None);
    }

    #[test]
    fn only_processing_is_non_terminal() {
        assert!(!LectureStatus::Processing.is_terminal());
        assert!(LectureStatus::Completed.is_terminal());
        assert!(LectureStatus::Failed.is_terminal());
    }

    #[test]
    fn lecture_serializes_created_at_as_camel_case() {
        let lecture = Lecture {
            id: "abc".into(),
            title: "Intro".into(),
            status: LectureStatus::Completed,
            transcript: None,
            notes: None,
            flashcards: None,
            quiz: None,
            created_at: Utc::now(),
            error: None,
        };
        let json = serde_json::to_value(&lecture).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("created_at").is_none());
        // Empty optionals are omitted from the export format.
        assert!(json.get("transcript").is_none());
    }

    #[test]
    fn content_type_derived_from_extension() {
        assert_eq!(content_type_for(Path::new("a/lecture.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("slides.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(
            content_type_for(Path::new("notes.txt")),
            "application/octet-stream"
        );
    }
}
