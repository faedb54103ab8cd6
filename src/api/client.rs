//! HTTP client for the lab submissions API.

use crate::api::types::{ErrorBody, RemoteSubmission, SubmissionDetail, UploadResponse};
use crate::error::{AppError, DownloadErrorKind};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info, warn};

const CLIENT_USER_AGENT: &str = "LabResultsUploader/0.3";

/// Scheme the API expects in the `Authorization` header.
pub const AUTH_SCHEME: &str = "Token";

pub fn build_http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(CLIENT_USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

pub(crate) fn authorize(
    request: RequestBuilder,
    token: &SecretString,
) -> Result<RequestBuilder, AppError> {
    let mut value = HeaderValue::from_str(&format!("{} {}", AUTH_SCHEME, token.expose_secret()))
        .map_err(|_| AppError::Internal("Stored token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(request.header(AUTHORIZATION, value))
}

/// Reads the `detail` field of an error body, falling back to the status
/// text when the body is missing or not JSON.
pub(crate) async fn error_detail(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let detail = match response.json::<ErrorBody>().await {
        Ok(ErrorBody { detail: Some(d) }) if !d.trim().is_empty() => d,
        _ => fallback,
    };
    (status, detail)
}

/// A file body with the `Content-Disposition` header it came with.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub content_disposition: Option<String>,
}

#[derive(Clone)]
pub struct LabApiClient {
    http: Client,
    base_url: String,
}

impl LabApiClient {
    /// `base_url` must already have its trailing slash removed.
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends all files as one multipart request. The result holds one entry
    /// per file, in the order sent; `None` means the server gave no id for it.
    pub async fn upload_batch(
        &self,
        token: &SecretString,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<Option<String>>, AppError> {
        let count = files.len();
        let mut form = Form::new();
        for (name, bytes) in files {
            let part = Part::bytes(bytes)
                .file_name(name)
                .mime_str("application/pdf")
                .map_err(|e| AppError::Internal(format!("Invalid multipart part: {}", e)))?;
            form = form.part("files", part);
        }

        info!("Uploading batch of {} files", count);
        let request = authorize(self.http.post(self.url("/api/upload/")), token)?;
        let response = request.multipart(form).send().await?;

        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            warn!("Upload rejected with {}: {}", status, detail);
            return Err(AppError::Server {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed = match response.json::<UploadResponse>().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Upload response was not readable: {}", e);
                UploadResponse::default()
            }
        };

        let mut ids = parsed.submission_ids.into_iter();
        Ok((0..count)
            .map(|_| ids.next().flatten().filter(|id| !id.trim().is_empty()))
            .collect())
    }

    pub async fn list_submissions(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteSubmission>, AppError> {
        let request = authorize(self.http.get(self.url("/api/submissions/")), token)?;
        let response = request.send().await?;
        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            return Err(AppError::Server {
                status: status.as_u16(),
                detail,
            });
        }
        let list: Vec<RemoteSubmission> = response.json().await?;
        debug!("Fetched {} submissions", list.len());
        Ok(list)
    }

    pub async fn submission_detail(
        &self,
        token: &SecretString,
        id: &str,
    ) -> Result<SubmissionDetail, AppError> {
        let path = format!("/api/submissions/{}/", urlencoding::encode(id));
        let request = authorize(self.http.get(self.url(&path)), token)?;
        let response = request.send().await?;
        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            return Err(AppError::Server {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn download(
        &self,
        token: &SecretString,
        id: &str,
    ) -> Result<DownloadedFile, AppError> {
        let path = format!("/submission/{}/download/", urlencoding::encode(id));
        debug!("Downloading submission {}", id);
        let request = authorize(self.http.get(self.url(&path)), token)?;
        let response = request.send().await?;

        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            let kind = DownloadErrorKind::from_status(status.as_u16());
            warn!("Download of {} failed with {}: {}", id, status, detail);
            return Err(AppError::Download { kind, detail });
        }

        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        debug!("Received {} bytes for {}", bytes.len(), id);
        Ok(DownloadedFile {
            bytes,
            content_disposition,
        })
    }
}
