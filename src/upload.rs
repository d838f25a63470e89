//! Upload/poll orchestration: wake the backend, submit the draft with
//! bounded retries, poll the job to a terminal status, persist the result.
//! Phases run strictly in order and no state ever reverses.

use crate::api::{ApiError, JobResponse, ProcessingBackend};
use crate::config::UploadTuning;
use crate::model::{Lecture, LectureDraft};
use crate::store::LectureStore;
use chrono::Utc;
use std::fmt;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Idle,
    Waking,
    Uploading,
    Processing,
    Complete,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Idle => "idle",
            UploadStage::Waking => "waking",
            UploadStage::Uploading => "uploading",
            UploadStage::Processing => "processing",
            UploadStage::Complete => "complete",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not reach the processing server after {attempts} attempts")]
    CannotConnect { attempts: u32 },
    /// 4xx from the upload endpoint; the server's message, verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("upload failed after {attempts} attempts, please try again")]
    UploadFailed { attempts: u32 },
    #[error("processing timed out after {attempts} checks, check your library later")]
    ProcessingTimeout { attempts: u32 },
    #[error("backend response did not include a lecture id")]
    MissingLectureId,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Drive one upload from draft to stored `Lecture`. The progress callback is
/// advisory: it receives the current stage and, where meaningful, a fraction
/// in `0.0..=1.0` scaled within that stage. Nothing is persisted unless the
/// backend reports a terminal status; a backend-reported failure IS terminal
/// and is stored with its error message.
#[instrument(skip_all, fields(title = %draft.title))]
pub async fn upload_lecture<F>(
    backend: &dyn ProcessingBackend,
    store: &LectureStore,
    tuning: &UploadTuning,
    draft: LectureDraft,
    progress: F,
) -> Result<Lecture, UploadError>
where
    F: Fn(UploadStage, Option<f32>),
{
    wake(backend, tuning, &progress).await?;
    let response = submit(backend, tuning, &draft, &progress).await?;
    let final_response = await_result(backend, tuning, response, &progress).await?;

    let lecture = build_lecture(draft.title, final_response)?;
    store.save_lecture(&lecture).await?;
    progress(UploadStage::Complete, Some(1.0));
    info!(id = %lecture.id, status = %lecture.status, "lecture stored");
    Ok(lecture)
}

/// Probe the liveness endpoint until the backend answers. Each attempt is
/// bounded by `wake_timeout`; a short settle delay follows the first success
/// because a cold backend can report ready slightly before it is.
async fn wake<F>(
    backend: &dyn ProcessingBackend,
    tuning: &UploadTuning,
    progress: &F,
) -> Result<(), UploadError>
where
    F: Fn(UploadStage, Option<f32>),
{
    progress(UploadStage::Waking, None);
    for attempt in 1..=tuning.wake_retries {
        match timeout(tuning.wake_timeout(), backend.health()).await {
            Ok(Ok(())) => {
                debug!(attempt, "backend reachable");
                sleep(tuning.settle_delay()).await;
                return Ok(());
            }
            Ok(Err(err)) => warn!(%err, attempt, "wake probe failed"),
            Err(_) => warn!(attempt, "wake probe timed out"),
        }
        if attempt < tuning.wake_retries {
            sleep(tuning.wake_backoff()).await;
        }
    }
    Err(UploadError::CannotConnect {
        attempts: tuning.wake_retries,
    })
}

/// Post the multipart payload. Transport failures and 5xx are retried with a
/// fixed backoff; a 4xx is a client error and ends the attempt immediately.
async fn submit<F>(
    backend: &dyn ProcessingBackend,
    tuning: &UploadTuning,
    draft: &LectureDraft,
    progress: &F,
) -> Result<JobResponse, UploadError>
where
    F: Fn(UploadStage, Option<f32>),
{
    for attempt in 1..=tuning.upload_retries {
        progress(
            UploadStage::Uploading,
            Some((attempt - 1) as f32 / tuning.upload_retries as f32),
        );
        match backend.upload(draft).await {
            Ok(response) => {
                debug!(attempt, "upload accepted");
                return Ok(response);
            }
            Err(ApiError::Rejected { status, detail }) => {
                warn!(status, %detail, "upload rejected by server");
                return Err(UploadError::Rejected(detail));
            }
            Err(err) if err.is_retryable() => {
                warn!(%err, attempt, "upload attempt failed");
            }
            Err(err) => return Err(UploadError::Store(anyhow::Error::new(err))),
        }
        if attempt < tuning.upload_retries {
            sleep(tuning.upload_backoff()).await;
        }
    }
    Err(UploadError::UploadFailed {
        attempts: tuning.upload_retries,
    })
}

/// Poll the status endpoint until the job reaches a terminal state. A poll
/// that errors is tolerated and retried on the same interval; only running
/// out of the attempt budget is fatal. Skipped entirely when the upload
/// response already carried a terminal status.
async fn await_result<F>(
    backend: &dyn ProcessingBackend,
    tuning: &UploadTuning,
    response: JobResponse,
    progress: &F,
) -> Result<JobResponse, UploadError>
where
    F: Fn(UploadStage, Option<f32>),
{
    let response = response.into_final();
    if response.status.is_terminal() {
        return Ok(response);
    }

    let lecture_id = response
        .lecture_id
        .clone()
        .ok_or(UploadError::MissingLectureId)?;
    debug!(%lecture_id, "job still processing, polling for result");

    for attempt in 1..=tuning.max_poll_attempts {
        sleep(tuning.poll_interval()).await;
        progress(
            UploadStage::Processing,
            Some(attempt as f32 / tuning.max_poll_attempts as f32),
        );
        match backend.status(&lecture_id).await {
            Ok(poll) => {
                let mut poll = poll.into_final();
                if poll.status.is_terminal() {
                    if poll.lecture_id.is_none() {
                        poll.lecture_id = Some(lecture_id);
                    }
                    return Ok(poll);
                }
                debug!(attempt, "still processing");
            }
            Err(err) => warn!(%err, attempt, "status poll failed, will retry"),
        }
    }
    Err(UploadError::ProcessingTimeout {
        attempts: tuning.max_poll_attempts,
    })
}

fn build_lecture(title: String, response: JobResponse) -> Result<Lecture, UploadError> {
    let id = response.lecture_id.ok_or(UploadError::MissingLectureId)?;
    Ok(Lecture {
        id,
        title,
        status: response.status,
        transcript: response.transcript,
        notes: response.notes,
        flashcards: response.flashcards,
        quiz: response.quiz,
        created_at: Utc::now(),
        error: response.error,
    })
}
