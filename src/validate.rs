//! Pre-flight checks on an upload draft. Pure over its inputs; no network
//! or store access happens before these pass.

use crate::model::MediaFile;
use thiserror::Error;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_VIDEO_BYTES: u64 = 500 * 1024 * 1024;
pub const MAX_SLIDES_BYTES: u64 = 100 * 1024 * 1024;

const ALLOWED_VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/webm",
];

/// Advisory violations; `Display` strings are the user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a lecture title")]
    TitleMissing,
    #[error("Lecture title must be 200 characters or less")]
    TitleTooLong,
    #[error("Please upload a video file")]
    VideoMissing,
    #[error("Video must be in MP4, MOV, AVI, or WebM format")]
    VideoFormat,
    #[error("Video file is too large. Maximum size is 500MB")]
    VideoTooLarge,
    #[error("Slides must be a PDF file")]
    SlidesFormat,
    #[error("PDF file is too large. Maximum size is 100MB")]
    SlidesTooLarge,
}

/// Collects every violation instead of stopping at the first, with one
/// exception: without a video file the remaining file checks are meaningless,
/// so a missing video ends the scan immediately.
pub fn validate(
    title: &str,
    video: Option<&MediaFile>,
    slides: Option<&MediaFile>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if title.trim().is_empty() {
        errors.push(ValidationError::TitleMissing);
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        errors.push(ValidationError::TitleTooLong);
    }

    let Some(video) = video else {
        errors.push(ValidationError::VideoMissing);
        return errors;
    };

    if !ALLOWED_VIDEO_TYPES.contains(&video.content_type.as_str()) {
        errors.push(ValidationError::VideoFormat);
    }
    if video.size > MAX_VIDEO_BYTES {
        errors.push(ValidationError::VideoTooLarge);
    }

    if let Some(slides) = slides {
        if slides.content_type != "application/pdf" {
            errors.push(ValidationError::SlidesFormat);
        }
        if slides.size > MAX_SLIDES_BYTES {
            errors.push(ValidationError::SlidesTooLarge);
        }
    }

    errors
}
