use crate::content::LabResultsContent;
use thiserror::Error;

/// Problems caught before anything is sent over the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("only PDF files are allowed")]
    PdfOnly,

    #[error("no files selected")]
    NoFilesSelected,

    #[error("file data missing for {0}")]
    FileMissing(String),

    #[error("download already in progress for {0}")]
    DownloadInProgress(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("{0}")]
    Field(String),
}

/// Classification of a failed download response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadErrorKind {
    NotFound,
    Forbidden,
    ServerError,
}

impl DownloadErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            403 => Self::Forbidden,
            _ => Self::ServerError,
        }
    }
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("authentication required")]
    AuthRequired,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server responded with {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("download failed ({kind:?}): {detail}")]
    Download {
        kind: DownloadErrorKind,
        detail: String,
    },

    #[error("{failed} of {total} files failed to upload")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("result discarded after shutdown")]
    Disposed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        // Drop the URL so query strings never end up on screen.
        AppError::Network(e.without_url().to_string())
    }
}

impl AppError {
    /// Localized text for display. Never contains the session token.
    pub fn user_message(&self, content: &LabResultsContent) -> String {
        match self {
            AppError::Validation(v) => match v {
                ValidationError::PdfOnly => content.pdf_only_error.clone(),
                ValidationError::NoFilesSelected => format!(
                    "{} {}",
                    content.upload_error_message, content.no_files_selected_error
                ),
                ValidationError::FileMissing(name) => {
                    format!("{} ({})", content.file_missing_error, name)
                }
                ValidationError::DownloadInProgress(_) => content.downloading_message.clone(),
                ValidationError::InvalidDate(_) => content.invalid_date_format.clone(),
                ValidationError::Field(msg) => msg.clone(),
            },
            AppError::AuthRequired => content.authentication_required.clone(),
            AppError::LoginRejected(msg) if !msg.trim().is_empty() => msg.clone(),
            AppError::LoginRejected(_) => content.invalid_credentials_error.clone(),
            AppError::Network(detail) => format!("{}: {}", content.network_error, detail),
            AppError::Server { detail, .. } => {
                format!("{}: {}", content.server_error_label, detail)
            }
            AppError::Download { kind, detail } => {
                let reason = match kind {
                    DownloadErrorKind::NotFound => content.download_not_found_error.clone(),
                    DownloadErrorKind::Forbidden => content.download_forbidden_error.clone(),
                    DownloadErrorKind::ServerError => {
                        format!("{}: {}", content.server_error_label, detail)
                    }
                };
                format!("{} ({})", content.download_error, reason)
            }
            AppError::PartialBatchFailure { .. } => format!(
                "{} {}",
                content.upload_error_message, content.upload_partial_failure_message
            ),
            AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Disposed
            | AppError::Internal(_) => content.internal_error.clone(),
        }
    }
}
