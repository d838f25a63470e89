//! Client core for the lecture processing service: upload orchestration
//! with bounded retries plus a local, offline-capable lecture library.

pub mod api;
pub mod config;
pub mod db;
pub mod model;
pub mod store;
pub mod upload;
pub mod validate;

pub use model::{Flashcard, Lecture, LectureDraft, LectureStatus, MediaFile, QuizItem};
pub use store::LectureStore;
pub use upload::{upload_lecture, UploadError, UploadStage};
