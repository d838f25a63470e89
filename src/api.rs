//! HTTP contract with the processing backend. The orchestrator talks to the
//! `ProcessingBackend` trait so tests can script responses without a server.

use crate::model::{Flashcard, LectureDraft, LectureStatus, MediaFile, QuizItem};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 4xx. The detail is the server's own message and is surfaced verbatim.
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    /// 5xx, worth retrying.
    #[error("server error {status}")]
    Server { status: u16 },
    /// Connection/read failure, worth retrying.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Local read of the upload payload failed.
    #[error("failed to read {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Server { .. } | ApiError::Transport(_))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Response shape shared by the upload and status endpoints. The status
/// endpoint may wrap the final payload one level deeper under `result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    #[serde(default)]
    pub lecture_id: Option<String>,
    pub status: LectureStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub flashcards: Option<Vec<Flashcard>>,
    #[serde(default)]
    pub quiz: Option<Vec<QuizItem>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<Box<JobResponse>>,
}

impl JobResponse {
    /// Prefer the nested `result` payload when the response wraps one,
    /// keeping the outer `lecture_id` if the inner envelope omits it.
    pub fn into_final(self) -> JobResponse {
        match self.result {
            Some(inner) => {
                let mut inner = *inner;
                if inner.lecture_id.is_none() {
                    inner.lecture_id = self.lecture_id;
                }
                inner
            }
            None => self,
        }
    }
}

#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    /// Liveness probe; any 2xx means reachable.
    async fn health(&self) -> Result<(), ApiError>;

    /// Submit the draft as a multipart payload.
    async fn upload(&self, draft: &LectureDraft) -> Result<JobResponse, ApiError>;

    /// Check on a running job.
    async fn status(&self, lecture_id: &str) -> Result<JobResponse, ApiError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("lectern/0.1")
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    pub fn from_base_url(base_url: &str) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;
        Ok(Self::new(url))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn file_part(file: &MediaFile) -> Result<Part, ApiError> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| ApiError::File {
                path: file.path.clone(),
                source,
            })?;
        Ok(Part::bytes(bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?)
    }
}

async fn read_job_response(res: Response) -> Result<JobResponse, ApiError> {
    let status = res.status();
    if status.is_client_error() {
        let body = res.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.detail)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body
                }
            });
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            detail,
        });
    }
    if !status.is_success() {
        return Err(ApiError::Server {
            status: status.as_u16(),
        });
    }
    Ok(res.json().await?)
}

#[async_trait]
impl ProcessingBackend for ApiClient {
    async fn health(&self) -> Result<(), ApiError> {
        let url = self.endpoint("health")?;
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ApiError::Server {
                status: status.as_u16(),
            });
        }
        Err(ApiError::Rejected {
            status: status.as_u16(),
            detail: status.to_string(),
        })
    }

    async fn upload(&self, draft: &LectureDraft) -> Result<JobResponse, ApiError> {
        let url = self.endpoint("api/upload")?;
        // Multipart forms are single-use, so each retry rebuilds one.
        let mut form = Form::new()
            .text("title", draft.title.clone())
            .part("video", Self::file_part(&draft.video).await?);
        if let Some(slides) = &draft.slides {
            form = form.part("slides", Self::file_part(slides).await?);
        }

        debug!(url = %url, video = %draft.video.file_name, "posting upload");
        let res = self.http.post(url).multipart(form).send().await?;
        read_job_response(res).await
    }

    async fn status(&self, lecture_id: &str) -> Result<JobResponse, ApiError> {
        let url = self.endpoint(&format!("api/status/{lecture_id}"))?;
        let res = self.http.get(url).send().await?;
        read_job_response(res).await
    }
}
