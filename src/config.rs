use crate::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// How long an upload error stays on screen.
pub const UPLOAD_ERROR_BANNER: Duration = Duration::from_secs(10);
/// How long a download error stays on screen.
pub const DOWNLOAD_ERROR_BANNER: Duration = Duration::from_secs(7);
/// How long the "upload successful" message stays on screen.
pub const UPLOAD_SUCCESS_BANNER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_base_url: String,
    /// Period of the background status refresh. `None` disables it.
    pub poll_interval: Option<Duration>,
    pub refresh_delay: Duration,
    pub request_timeout: Duration,
    pub content_dir: PathBuf,
    pub download_dir: PathBuf,
    pub session_file: PathBuf,
    pub open_after_download: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval: Some(Duration::from_secs(15)),
            refresh_delay: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(60),
            content_dir: PathBuf::from("locales"),
            download_dir: PathBuf::from("downloads"),
            session_file: PathBuf::from(".lab_session.json"),
            open_after_download: false,
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the `LAB_*` variables.
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(e) = dotenv::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = match lookup("LAB_API_BASE_URL") {
            Some(raw) => clean_base_url(&raw)?,
            None => defaults.api_base_url,
        };

        let poll_secs: u64 = parse_var(&lookup, "LAB_POLL_INTERVAL_SECS", 15)?;
        let refresh_ms: u64 = parse_var(&lookup, "LAB_REFRESH_DELAY_MS", 1500)?;
        let timeout_secs: u64 = parse_var(&lookup, "LAB_REQUEST_TIMEOUT_SECS", 60)?;
        let open_after_download = parse_var(&lookup, "LAB_OPEN_AFTER_DOWNLOAD", false)?;

        Ok(Self {
            api_base_url,
            poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
            refresh_delay: Duration::from_millis(refresh_ms),
            request_timeout: Duration::from_secs(timeout_secs),
            content_dir: lookup("LAB_CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.content_dir),
            download_dir: lookup("LAB_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            session_file: lookup("LAB_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_file),
            open_after_download,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        None => Ok(default),
    }
}

/// Validates the base URL and strips a single trailing slash.
pub fn clean_base_url(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    Url::parse(trimmed)
        .map_err(|e| AppError::Config(format!("LAB_API_BASE_URL is not a valid URL: {}", e)))?;
    Ok(trimmed.strip_suffix('/').unwrap_or(trimmed).to_string())
}
