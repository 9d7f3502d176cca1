use std::io::Read;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::{ReportError, ReportResult};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: u32 = 150;

/// Client for the Qualtrics v3 response-export API.
///
/// The export is a three-step flow: start an export job, poll its progress
/// until complete, then download the resulting ZIP (one CSV inside).
pub struct QualtricsClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ExportStartResponse {
    result: ExportStartResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportStartResult {
    progress_id: String,
}

#[derive(Debug, Deserialize)]
struct ExportProgressResponse {
    result: ExportProgressResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportProgressResult {
    status: String,
    file_id: Option<String>,
}

impl QualtricsClient {
    pub fn new(base_url: &str, api_key: &str) -> ReportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ReportError::Fetch(format!("failed to build HTTP client: {e}")))?;

        // Accept the datacenter host with or without a scheme.
        let host = base_url
            .trim_end_matches('/')
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        Ok(Self {
            http,
            api_base: format!("https://{host}/API/v3"),
            api_key: api_key.to_string(),
        })
    }

    /// Runs the full export flow and returns the raw CSV text.
    pub async fn export_responses(&self, survey_id: &str) -> ReportResult<String> {
        let export_url = format!("{}/surveys/{survey_id}/export-responses", self.api_base);

        tracing::info!(survey_id, "starting response export");
        let start: ExportStartResponse = self
            .post_json(&export_url, &json!({"format": "csv", "useLabels": true}))
            .await?;

        let progress_url = format!("{export_url}/{}", start.result.progress_id);
        let file_id = self.await_export(&progress_url).await?;

        tracing::info!(survey_id, "export complete, downloading file");
        let file_url = format!("{export_url}/{file_id}/file");
        let bytes = self.download(&file_url).await?;

        unzip_first_entry(&bytes)
    }

    async fn await_export(&self, progress_url: &str) -> ReportResult<String> {
        for _ in 0..MAX_POLLS {
            let progress: ExportProgressResponse = self.get_json(progress_url).await?;
            match check_progress(progress.result)? {
                PollVerdict::Ready(file_id) => return Ok(file_id),
                PollVerdict::Wait => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        Err(polls_exhausted(MAX_POLLS))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> ReportResult<T> {
        let response = self
            .http
            .post(url)
            .header("X-API-TOKEN", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ReportError::Fetch(format!("request to {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| ReportError::Fetch(format!("survey platform rejected request: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| ReportError::Fetch(format!("unexpected export response shape: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ReportResult<T> {
        let response = self
            .http
            .get(url)
            .header("X-API-TOKEN", &self.api_key)
            .send()
            .await
            .map_err(|e| ReportError::Fetch(format!("request to {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| ReportError::Fetch(format!("survey platform rejected request: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| ReportError::Fetch(format!("unexpected export response shape: {e}")))
    }

    async fn download(&self, url: &str) -> ReportResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .header("X-API-TOKEN", &self.api_key)
            .send()
            .await
            .map_err(|e| ReportError::Fetch(format!("download from {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| ReportError::Fetch(format!("survey platform rejected download: {e}")))?;

        Ok(response
            .bytes()
            .await
            .map_err(|e| ReportError::Fetch(format!("failed to read export body: {e}")))?
            .to_vec())
    }
}

#[derive(Debug)]
enum PollVerdict {
    Ready(String),
    Wait,
}

/// Decides what one progress poll means: done (with a file id), keep
/// waiting, or a terminal export failure.
fn check_progress(result: ExportProgressResult) -> ReportResult<PollVerdict> {
    match result.status.as_str() {
        "complete" => result.file_id.map(PollVerdict::Ready).ok_or_else(|| {
            ReportError::Fetch("export completed without a file id".to_string())
        }),
        "failed" => Err(ReportError::Fetch(
            "survey platform reported the export as failed".to_string(),
        )),
        _ => Ok(PollVerdict::Wait),
    }
}

fn polls_exhausted(max_polls: u32) -> ReportError {
    ReportError::Fetch(format!("export did not complete within {max_polls} polls"))
}

/// Extracts the single CSV from the export ZIP.
fn unzip_first_entry(bytes: &[u8]) -> ReportResult<String> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| ReportError::Fetch(format!("export was not a valid ZIP archive: {e}")))?;

    if archive.is_empty() {
        return Err(ReportError::Fetch("export ZIP was empty".to_string()));
    }

    let mut entry = archive
        .by_index(0)
        .map_err(|e| ReportError::Fetch(format!("failed to open export ZIP entry: {e}")))?;

    let mut csv_text = String::new();
    entry
        .read_to_string(&mut csv_text)
        .map_err(|e| ReportError::Fetch(format!("failed to read export CSV entry: {e}")))?;

    Ok(csv_text)
}
