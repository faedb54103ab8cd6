use crate::api::SubmissionStatus;
use std::path::{Path, PathBuf};

/// Where a tracked file is in its life, from selection to server processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    Selected,
    Uploading,
    UploadFailed,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    /// True for the phases in which the server has assigned an id.
    pub fn has_remote_id(self) -> bool {
        matches!(
            self,
            UploadStatus::Pending
                | UploadStatus::Processing
                | UploadStatus::Completed
                | UploadStatus::Failed
        )
    }

    /// Finished items that "clear completed/failed" removes.
    pub fn is_clearable(self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Failed | UploadStatus::UploadFailed
        )
    }

    /// Work is outstanding either locally or on the server.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            UploadStatus::Uploading | UploadStatus::Pending | UploadStatus::Processing
        )
    }
}

impl From<SubmissionStatus> for UploadStatus {
    fn from(status: SubmissionStatus) -> Self {
        match status {
            SubmissionStatus::Pending => UploadStatus::Pending,
            SubmissionStatus::Processing => UploadStatus::Processing,
            SubmissionStatus::Completed => UploadStatus::Completed,
            SubmissionStatus::Failed => UploadStatus::Failed,
        }
    }
}

/// A file the user picked, not yet read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub path: PathBuf,
}

impl SelectedFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Self { name, path }
    }

    pub fn is_pdf(&self) -> bool {
        self.name.to_lowercase().ends_with(".pdf")
    }
}

/// One file tracked from selection until the user removes it.
///
/// Fields are private so `remote_id` stays in step with `status`: it is set
/// exactly when the status is one of the server-side phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedUpload {
    local_id: String,
    file_name: String,
    source: Option<PathBuf>,
    status: UploadStatus,
    remote_id: Option<String>,
    error_detail: Option<String>,
}

impl TrackedUpload {
    pub(crate) fn selected(local_id: String, file: SelectedFile) -> Self {
        Self {
            local_id,
            file_name: file.name,
            source: Some(file.path),
            status: UploadStatus::Selected,
            remote_id: None,
            error_detail: None,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub(crate) fn mark_uploading(&mut self) {
        self.status = UploadStatus::Uploading;
        self.error_detail = None;
    }

    /// Puts a claimed item back in the selection; it never reached the server.
    pub(crate) fn release(&mut self) {
        debug_assert_eq!(self.status, UploadStatus::Uploading);
        self.status = UploadStatus::Selected;
        self.error_detail = None;
    }

    pub(crate) fn mark_upload_failed(&mut self, detail: String) {
        self.status = UploadStatus::UploadFailed;
        self.remote_id = None;
        self.error_detail = Some(detail);
        self.source = None;
    }

    pub(crate) fn mark_submitted(&mut self, remote_id: String) {
        self.status = UploadStatus::Pending;
        self.remote_id = Some(remote_id);
        self.error_detail = None;
        self.source = None;
    }

    /// Applies a server-side status. Only meaningful once a remote id exists.
    pub(crate) fn set_remote_status(&mut self, status: SubmissionStatus, detail: Option<String>) {
        debug_assert!(self.remote_id.is_some());
        self.status = status.into();
        self.error_detail = match status {
            SubmissionStatus::Failed => detail,
            _ => None,
        };
    }

    #[cfg(test)]
    pub(crate) fn invariant_holds(&self) -> bool {
        self.remote_id.is_some() == self.status.has_remote_id()
    }
}
