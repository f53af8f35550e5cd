//! Azure Computer Vision "Read" API (v3.2).
//!
//! Submitting an image returns `202 Accepted` with an `Operation-Location`
//! header. The last path segment of that URL is the operation ID, which we
//! poll via `analyzeResults/{id}`.

use std::time::Duration;

use reqwest::{StatusCode, header};

use crate::{error::ExtractError, prelude::*};

use super::{JobStatus, ReadBackend, ReadStatus};

/// Path of the submission endpoint, relative to the resource endpoint.
const ANALYZE_PATH: &str = "vision/v3.2/read/analyze";

/// Path prefix of the status endpoint, relative to the resource endpoint.
const RESULTS_PATH: &str = "vision/v3.2/read/analyzeResults";

/// Header carrying our subscription key.
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Talks to an Azure Computer Vision resource.
pub struct AzureReadBackend {
    http: reqwest::Client,
    endpoint: String,
    key: String,
}

impl AzureReadBackend {
    /// Create a new backend for the given resource endpoint and key. Each
    /// HTTP request gives up after `request_timeout`.
    pub fn new(endpoint: &str, key: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            key: key.to_owned(),
        })
    }
}

#[async_trait]
impl ReadBackend for AzureReadBackend {
    #[instrument(level = "debug", skip_all)]
    async fn submit(&self, image: &[u8]) -> Result<String, ExtractError> {
        let url = format!("{}/{}", self.endpoint, ANALYZE_PATH);
        let response = self
            .http
            .post(&url)
            .header(KEY_HEADER, &self.key)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|err| ExtractError::SubmissionFailure(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED && !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::SubmissionFailure(format!(
                "Azure Vision returned {status}: {body}"
            )));
        }

        let location = response
            .headers()
            .get("Operation-Location")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ExtractError::SubmissionFailure(
                    "Azure Vision response has no Operation-Location header".to_owned(),
                )
            })?;
        operation_id_from_location(location).ok_or_else(|| {
            ExtractError::SubmissionFailure(format!(
                "cannot find operation ID in {location:?}"
            ))
        })
    }

    #[instrument(level = "trace", skip_all, fields(operation_id = %operation_id))]
    async fn fetch(&self, operation_id: &str) -> Result<ReadStatus, ExtractError> {
        let url = format!("{}/{}/{}", self.endpoint, RESULTS_PATH, operation_id);
        let response = self
            .http
            .get(&url)
            .header(KEY_HEADER, &self.key)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| {
                ExtractError::RecognitionFailed(format!("cannot fetch status: {err}"))
            })?;
        let result = response.json::<ReadOperationResult>().await.map_err(|err| {
            ExtractError::RecognitionFailed(format!("cannot parse status: {err}"))
        })?;
        Ok(result.into_read_status())
    }
}

/// Extract the operation ID from an `Operation-Location` URL.
fn operation_id_from_location(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next()?;
    let id = path.trim_end_matches('/').rsplit('/').next()?;
    if id.is_empty() || id.contains(':') {
        None
    } else {
        Some(id.to_owned())
    }
}

/// Body of an `analyzeResults` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadOperationResult {
    status: JobStatus,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    read_results: Vec<PageReadResult>,
}

/// One image "page". Single images always have exactly one.
#[derive(Debug, Deserialize)]
struct PageReadResult {
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    text: String,
}

impl ReadOperationResult {
    fn into_read_status(self) -> ReadStatus {
        let lines = self
            .analyze_result
            .map(|result| {
                result
                    .read_results
                    .into_iter()
                    .flat_map(|page| page.lines)
                    .map(|line| line.text)
                    .collect()
            })
            .unwrap_or_default();
        ReadStatus {
            status: self.status,
            lines,
        }
    }
}
