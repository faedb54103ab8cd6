use crate::api::RemoteSubmission;
use crate::content::LabResultsContent;
use crate::error::ValidationError;
use crate::session::Locale;
use crate::upload::types::{TrackedUpload, UploadStatus};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Buckets submissions by test type name, sorted by name. Missing or blank
/// names go under `unknown_label`.
pub fn group_by_test_type<'a>(
    submissions: &'a [RemoteSubmission],
    unknown_label: &str,
) -> Vec<(String, Vec<&'a RemoteSubmission>)> {
    let mut groups: BTreeMap<String, Vec<&RemoteSubmission>> = BTreeMap::new();
    for submission in submissions {
        let key = submission
            .test_type_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(unknown_label);
        groups.entry(key.to_string()).or_default().push(submission);
    }
    groups.into_iter().collect()
}

pub fn selected(items: &[TrackedUpload]) -> Vec<&TrackedUpload> {
    items.iter().filter(|i| i.status() == UploadStatus::Selected).collect()
}

pub fn in_progress(items: &[TrackedUpload]) -> Vec<&TrackedUpload> {
    items.iter().filter(|i| i.status() != UploadStatus::Selected).collect()
}

pub fn has_clearable(items: &[TrackedUpload]) -> bool {
    items.iter().any(|i| i.status().is_clearable())
}

/// The file name, or the localized `prefix` and a short id when the server
/// sent none.
pub fn display_name(submission: &RemoteSubmission, prefix: &str) -> String {
    match submission.file_name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) => name.to_string(),
        None => {
            let short: String = submission.id.chars().take(8).collect();
            format!("{} {}", prefix, short)
        }
    }
}

/// Formats a `YYYY-MM-DD` (or longer ISO) date in the locale's day order.
pub fn format_test_date(raw: &str, locale: Locale) -> Result<String, ValidationError> {
    let date_part = raw.trim().get(..10).unwrap_or(raw.trim());
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))?;
    let pattern = match locale {
        Locale::En => "%m/%d/%Y",
        Locale::Ru | Locale::Kz => "%d.%m.%Y",
    };
    Ok(date.format(pattern).to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyteFlag {
    Normal,
    Abnormal,
    Unknown,
}

impl AnalyteFlag {
    pub fn from_abnormal(is_abnormal: Option<bool>) -> Self {
        match is_abnormal {
            Some(true) => Self::Abnormal,
            Some(false) => Self::Normal,
            None => Self::Unknown,
        }
    }

    pub fn label(self, content: &LabResultsContent) -> &str {
        match self {
            Self::Normal => &content.status_normal,
            Self::Abnormal => &content.status_abnormal,
            Self::Unknown => &content.status_unknown,
        }
    }
}
