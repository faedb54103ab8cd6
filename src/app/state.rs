use crate::api::{RemoteSubmission, SubmissionDetail};
use crate::content::LabResultsContent;
use crate::session::Locale;
use crate::upload::UploadBuffer;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type SharedState = Arc<Mutex<PageState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

/// A message that disappears on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
    pub expires_at: Instant,
}

impl Banner {
    pub fn new(kind: BannerKind, message: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            kind,
            message: message.into(),
            expires_at: Instant::now() + lifetime,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailView {
    Loading(String),
    Loaded(SubmissionDetail),
    Failed { id: String, message: String },
}

/// Everything the lab results window shows. Background tasks and the UI
/// share it through [`SharedState`].
#[derive(Debug, Default)]
pub struct PageState {
    pub content: LabResultsContent,
    pub locale: Locale,
    pub buffer: UploadBuffer,
    pub submissions: Vec<RemoteSubmission>,
    pub is_loading_submissions: bool,
    pub is_uploading: bool,
    pub downloads_in_flight: HashSet<String>,
    pub fetch_error: Option<String>,
    pub upload_banner: Option<Banner>,
    pub download_banner: Option<Banner>,
    pub auth_banner: Option<Banner>,
    pub detail: Option<DetailView>,
    pub login_identifier: Option<String>,
}

impl PageState {
    pub fn new(content: LabResultsContent, locale: Locale) -> Self {
        Self {
            content,
            locale,
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Drops banners whose time is up. Returns true if any were removed.
    pub fn expire_banners(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for slot in [
            &mut self.upload_banner,
            &mut self.download_banner,
            &mut self.auth_banner,
        ] {
            if slot.as_ref().is_some_and(|b| b.is_expired(now)) {
                *slot = None;
                changed = true;
            }
        }
        changed
    }

    /// Earliest time a banner will expire, for scheduling a repaint.
    pub fn next_banner_expiry(&self) -> Option<Instant> {
        [&self.upload_banner, &self.download_banner, &self.auth_banner]
            .into_iter()
            .flatten()
            .map(|b| b.expires_at)
            .min()
    }

    pub fn is_busy(&self) -> bool {
        self.is_uploading
            || self.is_loading_submissions
            || !self.downloads_in_flight.is_empty()
            || matches!(self.detail, Some(DetailView::Loading(_)))
    }
}
