//! Text recognition for pages that have no usable text layer.
//!
//! Recognition is delegated to a remote service. The Azure Read API is
//! asynchronous: we submit an image, get back an operation ID, and poll that
//! operation until it finishes. [`OcrClient`] owns that loop, and talks to the
//! service through a [`ReadBackend`], so the loop can be tested against a
//! scripted backend and a paused clock.

use std::{fmt, sync::Arc, time::Duration};

use crate::{config::OcrEngineType, config::OcrOpts, error::ExtractError, prelude::*};

pub mod azure;
pub mod textract;

/// Interface to anything that can turn an image into text.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text in a single image, returning lines in reading
    /// order separated by `\n`.
    async fn recognize(&self, image: &[u8]) -> Result<String, ExtractError>;
}

/// Build the OCR engine selected by our options.
///
/// Missing Azure credentials are not fatal: documents with a text layer
/// don't need OCR at all, so we only fail the pages that do.
pub async fn ocr_engine_for_opts(opts: &OcrOpts) -> Result<Arc<dyn OcrEngine>> {
    match opts.ocr_engine {
        OcrEngineType::Azure => {
            match (&opts.azure_vision_endpoint, &opts.azure_vision_key) {
                (Some(endpoint), Some(key)) => {
                    let poll = opts.poll_settings();
                    let backend =
                        azure::AzureReadBackend::new(endpoint, key, poll.request_timeout)?;
                    Ok(Arc::new(OcrClient::new(backend, poll)))
                }
                _ => {
                    warn!(
                        "AZURE_VISION_ENDPOINT or AZURE_VISION_KEY is not set; pages without a text layer will fail"
                    );
                    Ok(Arc::new(UnconfiguredOcrEngine {
                        reason: "Azure Vision credentials are not configured".to_owned(),
                    }))
                }
            }
        }
        OcrEngineType::Textract => Ok(Arc::new(textract::TextractOcrEngine::new().await?)),
    }
}

/// The status of a remote recognition job, as reported by the service.
///
/// `TimedOut` is never sent by the service. We assign it ourselves when we
/// give up polling.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    /// Should we keep polling?
    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::NotStarted | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::NotStarted => "notStarted",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timedOut",
        };
        f.write_str(name)
    }
}

/// One status check of a remote job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadStatus {
    /// Current status.
    pub status: JobStatus,
    /// Recognized lines, in the order the service returned them. Only
    /// meaningful once `status` is [`JobStatus::Succeeded`].
    pub lines: Vec<String>,
}

/// The two remote calls that make up an asynchronous read operation.
#[async_trait]
pub trait ReadBackend: Send + Sync + 'static {
    /// Submit an image and return the remote operation ID.
    async fn submit(&self, image: &[u8]) -> Result<String, ExtractError>;

    /// Fetch the current status of an operation.
    async fn fetch(&self, operation_id: &str) -> Result<ReadStatus, ExtractError>;
}

/// A single submitted image. Dropped as soon as its page is resolved.
#[derive(Clone, Debug)]
pub struct RecognitionJob {
    pub operation_id: String,
    pub status: JobStatus,
}

/// How long to wait for a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between status checks.
    pub interval: Duration,
    /// Maximum number of status checks before giving up.
    pub max_attempts: u32,
    /// Longest we wait for any single submit or status request.
    pub request_timeout: Duration,
}

impl PollSettings {
    /// Derive the attempt ceiling from an overall timeout.
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = (timeout.as_millis() / interval_ms).max(1);
        Self {
            interval,
            max_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            request_timeout: timeout.max(interval),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Submit-poll-collect client for asynchronous recognition services.
pub struct OcrClient<B> {
    backend: B,
    poll: PollSettings,
}

impl<B: ReadBackend> OcrClient<B> {
    /// Create a new client.
    pub fn new(backend: B, poll: PollSettings) -> Self {
        Self { backend, poll }
    }

    /// Submit an image. Submission errors are never retried.
    async fn submit(&self, image: &[u8]) -> Result<RecognitionJob, ExtractError> {
        let timeout = self.poll.request_timeout;
        let operation_id = tokio::time::timeout(timeout, self.backend.submit(image))
            .await
            .map_err(|_| {
                ExtractError::SubmissionFailure(format!("no response within {timeout:?}"))
            })??;
        debug!(%operation_id, "Submitted image for recognition");
        Ok(RecognitionJob {
            operation_id,
            status: JobStatus::NotStarted,
        })
    }

    /// Poll until the job leaves the pending states, or we run out of
    /// attempts. This is the only place extraction sleeps.
    async fn wait(&self, job: &mut RecognitionJob) -> Result<Vec<String>, ExtractError> {
        let max_attempts = self.poll.max_attempts;
        for attempt in 1..=max_attempts {
            let fetch = self.backend.fetch(&job.operation_id);
            let Ok(read) = tokio::time::timeout(self.poll.request_timeout, fetch).await
            else {
                warn!(attempt, "Recognition status request stalled");
                job.status = JobStatus::TimedOut;
                return Err(ExtractError::RecognitionTimeout { attempts: attempt });
            };
            let read = read?;
            job.status = read.status;
            trace!(attempt, status = %job.status, "Recognition status");
            if !job.status.is_pending() {
                return Self::collect(job, read.lines);
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }
        job.status = JobStatus::TimedOut;
        Err(ExtractError::RecognitionTimeout {
            attempts: max_attempts,
        })
    }

    /// Turn a finished job into lines, or an error.
    fn collect(
        job: &RecognitionJob,
        lines: Vec<String>,
    ) -> Result<Vec<String>, ExtractError> {
        match job.status {
            JobStatus::Succeeded => Ok(lines),
            other => Err(ExtractError::RecognitionFailed(format!(
                "operation {} finished with status {}",
                job.operation_id, other
            ))),
        }
    }
}

#[async_trait]
impl<B: ReadBackend> OcrEngine for OcrClient<B> {
    #[instrument(level = "debug", skip_all, fields(image_bytes = image.len()))]
    async fn recognize(&self, image: &[u8]) -> Result<String, ExtractError> {
        let mut job = self.submit(image).await?;
        let lines = self.wait(&mut job).await?;
        let text = lines.join("\n");
        debug!(lines = lines.len(), chars = text.len(), "Recognized text");
        Ok(text.trim().to_owned())
    }
}

/// An engine that fails every page, used when no credentials were supplied.
pub struct UnconfiguredOcrEngine {
    reason: String,
}

#[async_trait]
impl OcrEngine for UnconfiguredOcrEngine {
    async fn recognize(&self, _image: &[u8]) -> Result<String, ExtractError> {
        Err(ExtractError::SubmissionFailure(self.reason.clone()))
    }
}
