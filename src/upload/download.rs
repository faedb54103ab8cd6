use crate::error::AppError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_FILE_NAME: &str = "download.pdf";

/// Picks the name to save a download under.
///
/// Prefers `filename*=` over `filename=` from the header. The value is
/// percent-decoded; if decoding fails the header is ignored and
/// `suggested` is used instead.
pub fn filename_from_disposition(disposition: Option<&str>, suggested: Option<&str>) -> String {
    let fallback = suggested
        .and_then(sanitize_file_name)
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    let Some(raw) = disposition.and_then(extract_filename) else {
        return fallback;
    };

    match urlencoding::decode(&raw) {
        Ok(decoded) => sanitize_file_name(&decoded).unwrap_or(fallback),
        Err(e) => {
            warn!("Could not decode filename from header, using fallback: {}", e);
            fallback
        }
    }
}

fn extract_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(header) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'value
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                extended = Some(unquote(encoded));
            }
            "filename" => plain = Some(unquote(value)),
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

/// Splits header parameters on `;`, except inside a quoted string.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in header.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&header[start..]);
    params
}

/// Removes one surrounding pair of double quotes and undoes `\x` escapes
/// inside it. Anything else is returned trimmed, quotes and all.
fn unquote(value: &str) -> String {
    let value = value.trim();
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Keeps only the final path component and rejects names that would not
/// be a plain file.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// Destination for downloaded files.
pub trait FileSaver: Send + Sync {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AppError>;
}

/// Writes into one directory and never overwrites: a clash becomes
/// `name (1).ext`, `name (2).ext`, and so on.
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn free_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        let ext = path.extension().map(|e| e.to_string_lossy().to_string());

        (1..)
            .map(|n| match &ext {
                Some(ext) => self.dir.join(format!("{} ({}).{}", stem, n, ext)),
                None => self.dir.join(format!("{} ({})", stem, n)),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::Storage(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;
        let path = self.free_path(file_name);
        debug!("Writing {} bytes to {}", bytes.len(), path.display());
        fs::write(&path, bytes)
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
        info!("Saved download to {}", path.display());
        Ok(path)
    }
}
