mod auth;
mod client;
mod types;

pub use auth::AuthClient;
pub use client::{build_http_client, DownloadedFile, LabApiClient};
pub use types::{AnalyteResult, RemoteSubmission, SubmissionDetail, SubmissionStatus};
