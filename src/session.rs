//! Client-side session state: a small persistent key-value store plus the
//! token and locale providers built on top of it.
//!
//! Tokens are handed out as `SecretString` and never appear in `Debug`
//! output or logs.

use crate::error::AppError;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const LOGIN_IDENTIFIER_KEY: &str = "loginIdentifier";
pub const LOCALE_KEY: &str = "locale";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON-file backed store. Every write is flushed to disk.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file starts empty; an unreadable
    /// one is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Session file {} is not valid JSON, starting empty: {}", path.display(), e);
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Could not read session file {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        info!("Session store opened at {}", path.display());
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AppError::Storage(format!("Failed to serialize session: {}", e)))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("Failed to create session dir: {}", e)))?;
        }
        fs::write(&self.path, json)
            .map_err(|e| AppError::Storage(format!("Failed to write session file: {}", e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Reads and writes the API token under [`AUTH_TOKEN_KEY`].
#[derive(Clone)]
pub struct TokenProvider {
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("token", &self.get().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TokenProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns the stored token; an empty value counts as logged out.
    pub fn get(&self) -> Option<SecretString> {
        self.store
            .get(AUTH_TOKEN_KEY)
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from)
    }

    pub fn set(&self, token: &SecretString) -> Result<(), AppError> {
        self.store.set(AUTH_TOKEN_KEY, token.expose_secret())
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(AUTH_TOKEN_KEY)
    }

    pub fn require(&self) -> Result<SecretString, AppError> {
        self.get().ok_or(AppError::AuthRequired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    En,
    Ru,
    Kz,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::En, Locale::Ru, Locale::Kz];

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ru => "ru",
            Locale::Kz => "kz",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Ru => "Русский",
            Locale::Kz => "Қазақша",
        }
    }

    /// Matches on the two-letter language prefix, so `en-US` resolves to `en`.
    pub fn from_code(code: &str) -> Option<Self> {
        let prefix: String = code.trim().chars().take(2).collect::<String>().to_lowercase();
        Locale::ALL.into_iter().find(|l| l.code() == prefix)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone)]
pub struct LocaleProvider {
    store: Arc<dyn KeyValueStore>,
}

impl LocaleProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Locale {
        self.store
            .get(LOCALE_KEY)
            .and_then(|code| Locale::from_code(&code))
            .unwrap_or_default()
    }

    pub fn set(&self, locale: Locale) -> Result<(), AppError> {
        self.store.set(LOCALE_KEY, locale.code())
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(LOCALE_KEY)
    }
}
