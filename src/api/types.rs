use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use tracing::warn;

/// Server-side processing state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    /// Parses a status string case-insensitively. Empty means the server lost
    /// track of the file and counts as failed; anything unrecognised is
    /// treated as still processing.
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = raw.map(str::trim).unwrap_or_default();
        match raw.to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "PROCESSING" => Self::Processing,
            "COMPLETED" => Self::Completed,
            "FAILED" | "" => Self::Failed,
            other => {
                warn!("Unrecognised processing status {:?}, treating as PROCESSING", other);
                Self::Processing
            }
        }
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<SubmissionStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(SubmissionStatus::parse(raw.as_deref()))
}

fn failed_status() -> SubmissionStatus {
    SubmissionStatus::Failed
}

/// Entry of `GET /api/submissions/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteSubmission {
    pub id: String,
    #[serde(default = "failed_status", deserialize_with = "deserialize_status")]
    pub processing_status: SubmissionStatus,
    #[serde(default, alias = "processing_detail")]
    pub processing_details: Option<String>,
    #[serde(default)]
    pub test_type_name: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub test_date: Option<String>,
    #[serde(default)]
    pub submission_date: Option<String>,
}

/// One extracted analyte line of a processed report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyteResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub analyte_name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub is_abnormal: Option<bool>,
}

/// Response of `GET /api/submissions/{id}/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmissionDetail {
    pub id: String,
    #[serde(default)]
    pub test_type_name: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub test_date: Option<String>,
    #[serde(default)]
    pub submission_date: Option<String>,
    #[serde(default = "failed_status", deserialize_with = "deserialize_status")]
    pub processing_status: SubmissionStatus,
    #[serde(default)]
    pub processing_details: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub results: Vec<AnalyteResult>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadResponse {
    #[serde(default)]
    pub submission_ids: Vec<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

/// Login response. Unknown keys are field errors.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub non_field_errors: Vec<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PasswordResetErrors {
    #[serde(default)]
    pub email: Vec<String>,
}
