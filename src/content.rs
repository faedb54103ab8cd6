use crate::session::Locale;
use crate::upload::UploadStatus;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const PAGE: &str = "lab_results";

/// Every string shown on the lab results window. Keys missing from a locale
/// file take their value from [`LabResultsContent::fallback`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabResultsContent {
    pub page_title: String,
    pub language_label: String,
    pub refresh_list_button: String,
    pub no_documents_message: String,
    pub loading_submissions_message: String,
    pub fetch_submissions_error_message: String,
    pub view_details_action: String,
    pub download_file_action: String,
    pub downloading_message: String,
    pub download_saved_message: String,
    pub submission_fallback_name: String,

    pub upload_section_title: String,
    pub upload_form_prompt: String,
    pub select_files_button: String,
    pub selected_files_title: String,
    pub confirm_upload_button_text: String,
    pub uploading_message: String,
    pub upload_error_message: String,
    pub upload_success_message: String,
    pub upload_partial_failure_message: String,
    pub upload_status_section_title: String,
    pub clear_selected_button: String,
    pub clear_completed_failed_button: String,
    pub remove_button: String,

    pub file_status_selected: String,
    pub file_status_uploading: String,
    pub file_status_upload_failed: String,
    pub file_status_error_details: String,
    pub processing_status_pending: String,
    pub processing_status_processing: String,
    pub processing_status_completed: String,
    pub processing_status_failed: String,
    pub unknown_test_type: String,

    pub pdf_only_error: String,
    pub no_files_selected_error: String,
    pub file_missing_error: String,
    pub no_submission_id_error: String,
    pub submission_not_found_error: String,
    pub authentication_required: String,
    pub invalid_date_format: String,
    pub network_error: String,
    pub server_error_label: String,
    pub internal_error: String,
    pub download_error: String,
    pub download_not_found_error: String,
    pub download_forbidden_error: String,

    pub detail_title: String,
    pub detail_loading_message: String,
    pub detail_error_message: String,
    pub test_date_label: String,
    pub notes_label: String,
    pub analyte_column: String,
    pub value_column: String,
    pub unit_column: String,
    pub reference_range_column: String,
    pub status_column: String,
    pub status_normal: String,
    pub status_abnormal: String,
    pub status_unknown: String,
    pub back_button_text: String,

    pub login_title: String,
    pub login_label: String,
    pub password_label: String,
    pub login_button: String,
    pub logout_button: String,
    pub logged_in_as: String,
    pub invalid_credentials_error: String,
    pub forgot_password_title: String,
    pub email_label: String,
    pub reset_button: String,
    pub reset_success_message: String,
}

impl Default for LabResultsContent {
    fn default() -> Self {
        Self::fallback()
    }
}

impl LabResultsContent {
    /// Built-in English strings.
    pub fn fallback() -> Self {
        Self {
            page_title: "Lab Results".into(),
            language_label: "Language".into(),
            refresh_list_button: "Refresh List".into(),
            no_documents_message: "No documents uploaded yet.".into(),
            loading_submissions_message: "Loading lab results...".into(),
            fetch_submissions_error_message: "Failed to load lab results.".into(),
            view_details_action: "View Details".into(),
            download_file_action: "Download File".into(),
            downloading_message: "Preparing download...".into(),
            download_saved_message: "Saved to".into(),
            submission_fallback_name: "Submission".into(),

            upload_section_title: "Upload New Document".into(),
            upload_form_prompt: "Select one or more PDF files to upload.".into(),
            select_files_button: "Select PDF Files".into(),
            selected_files_title: "Selected Files:".into(),
            confirm_upload_button_text: "Confirm Upload".into(),
            uploading_message: "Uploading files...".into(),
            upload_error_message: "Upload failed:".into(),
            upload_success_message: "Upload successful!".into(),
            upload_partial_failure_message: "Some files failed.".into(),
            upload_status_section_title: "Upload Status".into(),
            clear_selected_button: "Clear Selected".into(),
            clear_completed_failed_button: "Clear Completed/Failed".into(),
            remove_button: "Remove".into(),

            file_status_selected: "Selected".into(),
            file_status_uploading: "Uploading...".into(),
            file_status_upload_failed: "Upload Failed".into(),
            file_status_error_details: "Details:".into(),
            processing_status_pending: "Pending".into(),
            processing_status_processing: "Processing".into(),
            processing_status_completed: "Completed".into(),
            processing_status_failed: "Failed".into(),
            unknown_test_type: "Unknown Type".into(),

            pdf_only_error: "Only PDF files are allowed.".into(),
            no_files_selected_error: "No files selected.".into(),
            file_missing_error: "Internal error: File data missing.".into(),
            no_submission_id_error: "Server did not return submission ID.".into(),
            submission_not_found_error: "Submission not found on server.".into(),
            authentication_required: "Authentication required. Please log in.".into(),
            invalid_date_format: "Invalid date format (YYYY-MM-DD).".into(),
            network_error: "Network error occurred".into(),
            server_error_label: "Server error".into(),
            internal_error: "An internal error occurred.".into(),
            download_error: "Failed to download file.".into(),
            download_not_found_error: "File not found on server.".into(),
            download_forbidden_error: "Permission denied.".into(),

            detail_title: "Lab Result Details".into(),
            detail_loading_message: "Loading details...".into(),
            detail_error_message: "Failed to load submission details.".into(),
            test_date_label: "Test date:".into(),
            notes_label: "Notes:".into(),
            analyte_column: "Analyte".into(),
            value_column: "Value".into(),
            unit_column: "Unit".into(),
            reference_range_column: "Reference Range".into(),
            status_column: "Status".into(),
            status_normal: "Normal".into(),
            status_abnormal: "Abnormal".into(),
            status_unknown: "Unknown".into(),
            back_button_text: "Back to Lab Results".into(),

            login_title: "Log in".into(),
            login_label: "Email or username".into(),
            password_label: "Password".into(),
            login_button: "Log in".into(),
            logout_button: "Log out".into(),
            logged_in_as: "Logged in as".into(),
            invalid_credentials_error: "Login failed. Please check your credentials.".into(),
            forgot_password_title: "Forgot your password?".into(),
            email_label: "Email".into(),
            reset_button: "Send reset link".into(),
            reset_success_message:
                "If an account with that email exists, a password reset link has been sent."
                    .into(),
        }
    }

    pub fn status_label(&self, status: UploadStatus) -> &str {
        match status {
            UploadStatus::Selected => &self.file_status_selected,
            UploadStatus::Uploading => &self.file_status_uploading,
            UploadStatus::UploadFailed => &self.file_status_upload_failed,
            UploadStatus::Pending => &self.processing_status_pending,
            UploadStatus::Processing => &self.processing_status_processing,
            UploadStatus::Completed => &self.processing_status_completed,
            UploadStatus::Failed => &self.processing_status_failed,
        }
    }
}

/// Loads the page strings for `locale`, falling back to English and then to
/// the built-in strings. Never fails.
pub fn load_content(dir: &Path, locale: Locale) -> LabResultsContent {
    match read_locale_file(dir, locale) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not load {}/{}: {}", locale, PAGE, e);
            if locale != Locale::En {
                match read_locale_file(dir, Locale::En) {
                    Ok(content) => return content,
                    Err(e) => warn!("English fallback failed: {}", e),
                }
            }
            LabResultsContent::fallback()
        }
    }
}

fn read_locale_file(dir: &Path, locale: Locale) -> Result<LabResultsContent, String> {
    let path = dir.join(locale.code()).join(format!("{}.json", PAGE));
    debug!("Loading content from {}", path.display());
    let raw = fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("{}: {}", path.display(), e))
}
